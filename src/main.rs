//! Gold trading decision engine - main entry point
//!
//! Subcommands:
//! - run: start the scheduler loop driving every periodic job
//! - job: execute a single job once (zones, choppy, range, signal, trail)
//! - report: export a trade-history CSV

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::once::JobKind;

#[derive(Parser, Debug)]
#[command(name = "gold-engine")]
#[command(about = "Automated XAUUSD trading decision engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler loop (all jobs on their cadences)
    Run {
        /// Path to configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Execute one job once and exit
    Job {
        /// Which job to run
        #[arg(value_enum)]
        job: JobKind,

        /// Path to configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Export a trade-history CSV report
    Report {
        /// Path to configuration file; built-in defaults when omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Include deals closed on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Output CSV path; defaults under the configured report directory
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP internals
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,h2=warn");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials come from the environment; .env is optional
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Run { .. } => "run",
        Commands::Job { .. } => "job",
        Commands::Report { .. } => "report",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Run { config } => commands::run::run(config).await,
        Commands::Job { job, config } => commands::once::run(job, config).await,
        Commands::Report {
            config,
            from,
            output,
        } => commands::report::run(config, from, output).await,
    }
}
