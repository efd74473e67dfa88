//! repoinsight: sequential five-phase repository analysis.
//!
//! A server runs jobs through documentation, vectors, lineage,
//! dependencies, and analysis in strict order, tracking per-file
//! progress in SQLite. A client-side tracker polls job status,
//! persists what it sees, and resumes interrupted polls on restart.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod phase;
pub mod providers;
pub mod server;
pub mod setup;
pub mod store;
pub mod tracker;
