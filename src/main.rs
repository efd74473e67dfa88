use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "repoinsight")]
#[command(version, about = "Sequential five-phase repository analysis")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the analysis server (for client commands)
    #[arg(long, global = true, env = "REPOINSIGHT_SERVER")]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the analysis server
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "4820")]
        port: u16,

        /// Job database path
        #[arg(long, default_value = ".repoinsight/jobs.db")]
        db_path: PathBuf,

        /// Base URL of the downstream analysis service
        #[arg(long, default_value = "http://127.0.0.1:4821")]
        processor_url: String,

        /// GitHub token for listing private repositories
        #[arg(long, env = "GITHUB_TOKEN")]
        github_token: Option<String>,

        /// Maximum in-flight files per phase
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// Enable dev mode (permissive CORS, bind 0.0.0.0)
        #[arg(long)]
        dev: bool,
    },
    /// Start analyzing a repository and watch it to completion
    Start {
        /// Repository key (owner/repo)
        repository_key: String,

        /// Primary language of the repository
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Git ref to analyze (defaults to the default branch)
        #[arg(long)]
        git_ref: Option<String>,

        /// Submit without watching progress
        #[arg(long)]
        no_watch: bool,
    },
    /// Watch an already-running analysis
    Watch {
        /// Repository key (owner/repo)
        repository_key: String,
    },
    /// Show tracked status (all repositories, or one)
    Status {
        /// Repository key (owner/repo)
        repository_key: Option<String>,
    },
    /// Clear a repository's jobs and tracked state
    Clear {
        /// Repository key (owner/repo)
        repository_key: String,

        /// Only clear local tracked state, leave the server alone
        #[arg(long)]
        local_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match &cli.command {
        Commands::Serve {
            port,
            db_path,
            processor_url,
            github_token,
            concurrency,
            dev,
        } => {
            cmd::cmd_serve(
                *port,
                db_path.clone(),
                processor_url.clone(),
                github_token.clone(),
                *concurrency,
                *dev,
            )
            .await?;
        }
        Commands::Start {
            repository_key,
            language,
            git_ref,
            no_watch,
        } => {
            cmd::cmd_start(
                &cli,
                repository_key,
                language,
                git_ref.as_deref(),
                *no_watch,
            )
            .await?;
        }
        Commands::Watch { repository_key } => {
            cmd::cmd_watch(&cli, repository_key).await?;
        }
        Commands::Status { repository_key } => {
            cmd::cmd_status(&cli, repository_key.as_deref()).await?;
        }
        Commands::Clear {
            repository_key,
            local_only,
        } => {
            cmd::cmd_clear(&cli, repository_key, *local_only).await?;
        }
    }

    Ok(())
}
