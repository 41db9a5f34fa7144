//! CLI entry point for the stable-watch tool.
//!
//! Watches one directory and prints a line for every file that has stopped
//! changing for the configured quiet period.
//!
//! # Usage
//!
//! ```bash
//! stable-watch [OPTIONS] <DIR>
//!
//! # Report finished uploads after two quiet seconds
//! stable-watch --threshold-ms 2000 /srv/incoming
//!
//! # Only video files, skipping dot-file temporaries, as JSON lines
//! stable-watch --ext mp4 --ext mkv --ignore-hidden --format json /srv/incoming
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use sw_core::{Config, ConfigError, LogConfig};
use sw_watcher::{StabilityEvent, StableFileWatcher, filter_from_config};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Reports files in a directory once they have stopped changing.
///
/// A file is reported after it has gone the whole threshold without a single
/// change notification and still exists at that moment.
#[derive(Parser)]
#[command(name = "stable-watch", version, about, long_about = None)]
struct Cli {
    /// Directory to watch (not recursive).
    #[arg(env = "STABLE_WATCH_DIR")]
    dir: Utf8PathBuf,

    /// JSON configuration file. Flags override its values.
    #[arg(short, long, env = "STABLE_WATCH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Quiet period in milliseconds before a file counts as stable.
    #[arg(short, long)]
    threshold_ms: Option<u64>,

    /// Only track files with this extension. Repeatable.
    #[arg(short, long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Skip dot-files.
    #[arg(long)]
    ignore_hidden: bool,

    /// Output format for stability events.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

/// Event output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One path per line.
    Text,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    fn render(self, event: &StabilityEvent) -> serde_json::Result<String> {
        match self {
            Self::Text => Ok(event.path.to_string()),
            Self::Json => serde_json::to_string(event),
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise the level
/// comes from the merged configuration, with `notify` held at `warn`.
/// Logs go to stderr so stdout carries only events.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},notify=warn", log.level)));

    // Check if colors should be disabled (config/flag or NO_COLOR env var)
    let use_ansi = log.ansi && std::env::var_os("NO_COLOR").is_none();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the optional config file and CLI flags.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded, the merged options
/// are invalid, or the watch directory does not exist.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(threshold_ms) = cli.threshold_ms {
        config.watch.stable_threshold_ms = threshold_ms;
    }
    if !cli.extensions.is_empty() {
        config.watch.extensions.clone_from(&cli.extensions);
    }
    config.watch.ignore_hidden |= cli.ignore_hidden;
    if cli.verbose {
        "debug".clone_into(&mut config.log.level);
    }
    if cli.no_color {
        config.log.ansi = false;
    }

    config.watch.validate()?;

    if !cli.dir.exists() {
        return Err(ConfigError::MissingDirectory(cli.dir.clone()).into());
    }

    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATION
// =============================================================================

/// Resolves once Ctrl-C or (on Unix) SIGTERM arrives.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl-C, shutting down");
        }
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down");
    Ok(())
}

/// Prints stability events until a shutdown signal or the end of the stream.
///
/// # Errors
///
/// Returns an error if stdout cannot be written or shutdown fails.
async fn run_watch(mut watcher: StableFileWatcher, format: OutputFormat) -> color_eyre::Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let stdout = std::io::stdout();
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            event = watcher.recv() => {
                let Some(event) = event else {
                    warn!("Event stream ended");
                    break;
                };
                let line = format.render(&event)?;
                let mut handle = stdout.lock();
                writeln!(handle, "{line}")?;
                handle.flush()?;
            }
        }
    }

    watcher.shutdown().await?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Merge config file and flags
    let config = build_config(&cli)?;

    // 4. Initialize tracing (handles --verbose and --no-color)
    init_tracing(&config.log);

    // 5. Start watching
    let filter = filter_from_config(&config.watch);
    let watcher = StableFileWatcher::from_config(&cli.dir, &config.watch, filter).await?;
    info!(
        dir = %watcher.watch_dir(),
        threshold_ms = config.watch.stable_threshold_ms,
        format = ?cli.format,
        "Watching for stable files"
    );

    run_watch(watcher, cli.format).await
}
