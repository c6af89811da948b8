use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use auto_fastq_symlink::app::App;
use auto_fastq_symlink::config::{ConfigLoader, ResolvedConfig};
use auto_fastq_symlink::error::SymlinkError;
use auto_fastq_symlink::output::JsonOutput;
use auto_fastq_symlink::shutdown::Shutdown;
use auto_fastq_symlink::store::SqliteStore;

const SLEEP_SLICE: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "auto-fastq-symlink")]
#[command(about = "Keep per-project symlink trees of demultiplexed FASTQ files in sync with sequencing runs")]
#[command(version, author)]
struct Cli {
    #[arg(short, long)]
    config: Utf8PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run a single cycle, print its summary as JSON and exit.
    #[arg(long)]
    once: bool,

    /// Seconds between cycles; overrides the config file.
    #[arg(long)]
    scan_interval: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SymlinkError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SymlinkError) -> u8 {
    match error {
        SymlinkError::ConfigRead(_)
        | SymlinkError::ConfigParse(_)
        | SymlinkError::ConfigInvalid(_)
        | SymlinkError::ProjectsDefinition { .. }
        | SymlinkError::ProjectIdTranslation { .. }
        | SymlinkError::ExclusionList { .. } => 2,
        SymlinkError::Store(_) => 3,
        _ => 1,
    }
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn load_config(cli: &Cli) -> Result<ResolvedConfig, SymlinkError> {
    let mut config = ConfigLoader::resolve(&cli.config)?;
    if let Some(secs) = cli.scan_interval.filter(|secs| secs.is_finite() && *secs >= 0.0) {
        config.scan_interval = Duration::from_secs_f64(secs);
    }
    Ok(config)
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let shutdown = Shutdown::new();
    shutdown.register_signals()?;

    let config = load_config(&cli)?;
    tracing::info!(
        event_type = "config_loaded",
        config_file = %cli.config,
        num_projects = config.projects.len(),
        database_path = %config.database_path
    );
    let store = SqliteStore::open(&config.database_path)?;
    let mut app = App::new(config, store);

    loop {
        match app.run_cycle(&shutdown) {
            Ok(summary) if cli.once => {
                JsonOutput::print_summary(&summary).into_diagnostic()?;
                return Ok(());
            }
            Ok(_) => {}
            Err(err) if cli.once || err.is_configuration_integrity() => return Err(err.into()),
            Err(err) => {
                tracing::error!(event_type = "cycle_failed", error = %err);
            }
        }

        if !sleep_until_next_cycle(app.config().scan_interval, &shutdown) {
            break;
        }

        match load_config(&cli) {
            Ok(reloaded) => {
                if reloaded.database_path != app.config().database_path {
                    tracing::warn!(
                        event_type = "database_path_change_ignored",
                        database_path = %reloaded.database_path
                    );
                }
                app.set_config(reloaded);
            }
            Err(err) if err.is_configuration_integrity() => return Err(err.into()),
            Err(err) => {
                tracing::warn!(
                    event_type = "load_config_failed",
                    config_file = %cli.config,
                    error = %err
                );
            }
        }
    }

    tracing::info!(event_type = "shutdown_complete");
    Ok(())
}

/// `false` when shutdown was requested while waiting.
fn sleep_until_next_cycle(interval: Duration, shutdown: &Shutdown) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if shutdown.is_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
