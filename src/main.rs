//! Roblox Monitor - launch the Roblox client and follow its log as game events.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use roblox_monitor::config::{ConfigError, ConfigLoader, MonitorConfig};
use roblox_monitor::display;
use roblox_monitor::monitor::{EventKind, InstanceMonitor, MonitorError, MonitorEvent};
use roblox_monitor::watcher::{
    normalize, LineClassifier, LocateError, LogFileLocator, WatcherError,
};

#[derive(Parser)]
#[command(
    name = "roblox-monitor",
    about = "Launch Roblox and follow its log as game events",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print events as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    /// Do not truncate event data.
    #[arg(long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the client and print its events until it exits.
    Watch {
        /// Launch URL, e.g. roblox://experiences/start?placeId=1818.
        #[arg(long)]
        url: Option<String>,
    },
    /// Classify the lines of an existing log file.
    Classify {
        /// Log file to read.
        file: PathBuf,
    },
    /// Print the current fresh log file.
    Locate,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error("Start task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<MonitorConfig, ConfigError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load()
}

async fn watch(
    config: MonitorConfig,
    url: Option<String>,
    json: bool,
    raw: bool,
) -> Result<(), CliError> {
    let monitor = InstanceMonitor::from_config(config);
    let exited = Arc::new(Notify::new());

    monitor.on(EventKind::GameEvent, move |event| {
        display::print_event(event, json, raw);
    });
    {
        let exited = Arc::clone(&exited);
        monitor.on(EventKind::Exit, move |event| {
            display::print_event(event, json, raw);
            exited.notify_one();
        });
    }

    let starter = monitor.clone();
    let mut start = tokio::spawn(async move { starter.start(url.as_deref()).await });

    tokio::select! {
        result = &mut start => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted during start");
            if let Err(e) = monitor.quit().await {
                tracing::debug!(error = %e, "Nothing to quit");
            }
            // The start task reports the cancellation.
            if let Err(e) = start.await? {
                tracing::debug!(error = %e, "Start ended");
            }
            return Ok(());
        }
    }

    if !json {
        let log = monitor
            .log_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        display::print_started(monitor.client_pid(), &log);
    }

    tokio::select! {
        () = exited.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, quitting Roblox");
            monitor.quit().await?;
        }
    }

    monitor.cleanup();
    Ok(())
}

async fn classify(file: PathBuf, json: bool, raw: bool) -> Result<(), CliError> {
    let content = normalize(&file).await?;
    let lines: Vec<&str> = content.lines().collect();
    let classifier = LineClassifier::with_builtin_rules();

    for info in classifier.classify(&lines) {
        display::print_event(&MonitorEvent::GameEvent(info), json, raw);
    }
    Ok(())
}

async fn locate(config: MonitorConfig) -> Result<(), CliError> {
    let locator = LogFileLocator::new(config.locator.clone());
    let path = locator
        .locate(&config.client.logs_dir(), &CancellationToken::new())
        .await?;
    display::print_log_path(&path.display().to_string());
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Watch { url } => {
            let config = load_config(cli.config)?;
            tracing::info!(url = ?url, "Starting Roblox monitor");
            watch(config, url, cli.json, cli.raw).await
        }
        Commands::Classify { file } => classify(file, cli.json, cli.raw).await,
        Commands::Locate => locate(load_config(cli.config)?).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
