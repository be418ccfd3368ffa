mod fetch;
mod jobs;
mod run;
mod state;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cachewarm-cli")]
#[command(about = "Keep cached remote payloads fresh")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a warming sweep now (manual trigger, never sampled)
    Run {
        /// Ignore freshness and backoff, and multiply the time budget
        #[arg(long)]
        force: bool,
        /// Time budget in milliseconds, overriding the configured one
        #[arg(long)]
        budget_ms: Option<u64>,
        /// Only run these jobs (comma-separated names)
        #[arg(long, value_delimiter = ',')]
        job: Vec<String>,
        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch a URL through the cache, serving stale data if the remote fails
    Fetch {
        url: String,
        /// Seconds a cached copy stays fresh
        #[arg(long, default_value = "300")]
        ttl: u64,
        /// Substring the response must contain to be cached
        #[arg(long)]
        expect: Option<String>,
    },
    /// Inspect the job list
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Show the scheduling state of a job
    State {
        /// Job name
        job: String,
    },
}

#[derive(Debug, Subcommand)]
enum JobsCommands {
    /// Load and validate the job list without fetching anything
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cachewarm_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            force,
            budget_ms,
            job,
            json,
        } => run::run_warm(&config, force, budget_ms, job, json).await,
        Commands::Fetch { url, ttl, expect } => {
            fetch::run_fetch(&config, &url, ttl, expect.as_deref()).await
        }
        Commands::Jobs {
            command: JobsCommands::Check,
        } => jobs::run_jobs_check(&config),
        Commands::State { job } => state::run_state(&config, &job),
    }
}
