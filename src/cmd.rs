//! CLI command implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;

use repoinsight::config::{ServerConfig, TrackerConfig};
use repoinsight::errors::TrackerError;
use repoinsight::models::{AnalysisConfig, ClientSnapshot};
use repoinsight::orchestrator::worker::WorkerConfig;
use repoinsight::phase::PhaseId;
use repoinsight::server;
use repoinsight::setup::SetupController;
use repoinsight::tracker::PollerManager;
use repoinsight::tracker::client::HttpStatusClient;
use repoinsight::tracker::storage::SnapshotStore;

use super::Cli;

pub async fn cmd_serve(
    port: u16,
    db_path: PathBuf,
    processor_url: String,
    github_token: Option<String>,
    concurrency: usize,
    dev: bool,
) -> Result<()> {
    let config = ServerConfig {
        port,
        db_path,
        github_token,
        processor_url,
        worker: WorkerConfig {
            concurrency,
            ..WorkerConfig::default()
        },
        dev_mode: dev,
        ..ServerConfig::default()
    };
    server::start_server(config).await
}

fn tracker_config(cli: &Cli) -> TrackerConfig {
    let mut config = TrackerConfig::default();
    if let Some(server) = &cli.server {
        config.server_url = server.clone();
    }
    config
}

fn build_tracker(cli: &Cli) -> (Arc<HttpStatusClient>, Arc<PollerManager>) {
    let config = tracker_config(cli);
    let client = Arc::new(HttpStatusClient::new(&config.server_url));
    let storage = SnapshotStore::new(&config.snapshot_path);
    let manager = PollerManager::new(client.clone(), storage, config);
    (client, manager)
}

pub async fn cmd_start(
    cli: &Cli,
    repository_key: &str,
    language: &str,
    git_ref: Option<&str>,
    no_watch: bool,
) -> Result<()> {
    let (client, manager) = build_tracker(cli);
    let setup = SetupController::new(client, manager.clone());

    let config = AnalysisConfig {
        language: language.to_string(),
        git_ref: git_ref.map(str::to_string),
    };
    let response = setup
        .submit(repository_key, &config)
        .await
        .with_context(|| format!("Failed to start analysis for {}", repository_key))?;

    println!();
    println!(
        "Started analysis of {} (job {})",
        style(repository_key).cyan(),
        response.job_id
    );
    for phase in &response.phases {
        println!("  {:<24} {}", phase.name, style(phase.status).dim());
    }
    println!();

    if no_watch {
        manager.stop_polling(repository_key).await;
        println!("Run 'repoinsight watch {}' to follow progress.", repository_key);
        return Ok(());
    }
    watch_until_done(&manager, repository_key).await
}

pub async fn cmd_watch(cli: &Cli, repository_key: &str) -> Result<()> {
    let (_, manager) = build_tracker(cli);
    manager.load_persisted().await;
    manager.start_polling(repository_key).await;
    watch_until_done(&manager, repository_key).await
}

async fn watch_until_done(manager: &Arc<PollerManager>, repository_key: &str) -> Result<()> {
    let mut last_line = String::new();
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;

        if let Some(snap) = manager.status(repository_key).await {
            let line = progress_line(&snap);
            if line != last_line {
                println!("{}", line);
                last_line = line;
            }
        }

        if !manager.is_polling(repository_key).await {
            break;
        }
    }

    match manager.status(repository_key).await {
        Some(snap) if snap.progress >= 100 => {
            println!();
            println!("{} {}", style("Done:").green().bold(), repository_key);
            print_snapshot(repository_key, &snap);
        }
        Some(_) => println!("Polling stopped before completion."),
        None => println!("No tracked state for {}.", repository_key),
    }
    Ok(())
}

pub async fn cmd_status(cli: &Cli, repository_key: Option<&str>) -> Result<()> {
    let config = tracker_config(cli);
    let snapshots = SnapshotStore::new(&config.snapshot_path)
        .load()
        .context("Failed to load tracked snapshots")?;

    if snapshots.is_empty() {
        println!("Nothing tracked yet. Run 'repoinsight start <owner/repo>'.");
        return Ok(());
    }

    match repository_key {
        Some(key) => match snapshots.get(key) {
            Some(snap) => print_snapshot(key, snap),
            None => println!("{} is not tracked.", key),
        },
        None => {
            let mut keys: Vec<_> = snapshots.keys().collect();
            keys.sort();
            println!();
            println!("{:<32} {:>8} {:>7} {:>7} {:>7}", "Repository", "Progress", "Done", "Failed", "Pending");
            for key in keys {
                let snap = &snapshots[key];
                println!(
                    "{:<32} {:>7}% {:>7} {:>7} {:>7}{}",
                    key,
                    snap.progress,
                    snap.completed,
                    snap.failed,
                    snap.pending,
                    if snap.is_polling {
                        format!("  {}", style("(polling)").dim())
                    } else {
                        String::new()
                    }
                );
            }
            println!();
        }
    }
    Ok(())
}

pub async fn cmd_clear(cli: &Cli, repository_key: &str, local_only: bool) -> Result<()> {
    let (client, manager) = build_tracker(cli);

    if !local_only {
        match client.clear(repository_key).await {
            Ok(()) => println!("Cleared server jobs for {}.", repository_key),
            Err(TrackerError::NotReadyYet) => {
                println!("Server has no jobs for {}.", repository_key)
            }
            Err(e) => return Err(e).context("Failed to clear server jobs"),
        }
    }

    manager.load_persisted().await;
    manager.clear(repository_key).await;
    println!("Cleared tracked state for {}.", repository_key);
    Ok(())
}

fn progress_line(snap: &ClientSnapshot) -> String {
    let phase_part = match &snap.phases {
        Some(phases) => {
            let current = PhaseId::ORDER
                .into_iter()
                .find(|p| phases.get(p).is_none_or(|s| s.progress < 100))
                .unwrap_or(PhaseId::Analysis);
            format!(" [{}]", current.display_name())
        }
        None => String::new(),
    };
    format!(
        "{:>3}%  {} done, {} failed, {} pending{}",
        snap.progress, snap.completed, snap.failed, snap.pending, phase_part
    )
}

fn print_snapshot(repository_key: &str, snap: &ClientSnapshot) {
    println!();
    println!("{}", style(repository_key).cyan().bold());
    println!("  Progress: {}%", snap.progress);
    println!(
        "  Files: {} total, {} done, {} failed, {} pending",
        snap.total_files, snap.completed, snap.failed, snap.pending
    );
    if let Some(phases) = &snap.phases {
        for phase in PhaseId::ORDER {
            if let Some(state) = phases.get(&phase) {
                println!(
                    "  {:<24} {:>3}%  ({}/{} done{})",
                    phase.display_name(),
                    state.progress,
                    state.completed_count,
                    state.total_items,
                    if state.failed_count > 0 {
                        format!(", {} failed", state.failed_count)
                    } else {
                        String::new()
                    }
                );
            }
        }
    }
    if let Some(completed_at) = snap.completed_at {
        println!("  Completed at: {}", completed_at.to_rfc3339());
    }
    println!();
}
