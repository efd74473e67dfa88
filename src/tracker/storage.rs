//! Snapshot persistence for the tracker.
//!
//! One JSON file maps repository key to its last observed snapshot.
//! Corrupt files load as empty rather than wedging startup; the next
//! save overwrites them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::TrackerError;
use crate::models::ClientSnapshot;

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<HashMap<String, ClientSnapshot>, TrackerError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(TrackerError::Storage(e)),
        };
        match serde_json::from_str(&data) {
            Ok(map) => Ok(map),
            Err(e) => {
                warn!(path = %self.path.display(), "Discarding corrupt snapshot file: {}", e);
                Ok(HashMap::new())
            }
        }
    }

    /// Write-then-rename so a crash mid-save never truncates the file.
    pub fn save(&self, snapshots: &HashMap<String, ClientSnapshot>) -> Result<(), TrackerError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(TrackerError::Storage)?;
        }
        let data = serde_json::to_string_pretty(snapshots)
            .map_err(|e| TrackerError::Storage(std::io::Error::other(e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(TrackerError::Storage)?;
        std::fs::rename(&tmp, &self.path).map_err(TrackerError::Storage)?;
        Ok(())
    }
}
