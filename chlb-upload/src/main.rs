//! Score upload client (chlb-upload) - Main entry point
//!
//! Uploads `scoredata.bin` to the leaderboard backend and follows the
//! server-side processing job until it completes, printing progress and
//! newly unlocked achievements.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chlb_common::config::{
    default_scoredata_path, ClientConfig, ConfigResolver, ENV_API_URL, ENV_CONFIG_FILE,
    ENV_DATA_DIR,
};
use chlb_common::events::{ChannelStatus, EventBus, TrackerEvent};
use chlb_common::LocalIdentity;
use chlb_upload::progress_view::{render_channel_status, ProgressView};
use chlb_upload::services::ScoreUploader;
use chlb_upload::{UploadProgressTracker, TrackerHandle};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for chlb-upload
#[derive(Parser, Debug)]
#[command(name = "chlb-upload")]
#[command(about = "Upload score data and follow its processing")]
#[command(version)]
struct Args {
    /// Backend base URL
    #[arg(long, global = true, env = ENV_API_URL)]
    api_url: Option<String>,

    /// Directory holding identity.toml
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    data_dir: Option<PathBuf>,

    /// Explicit TOML config file
    #[arg(long, global = true, env = ENV_CONFIG_FILE)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow processing of uploads made from any client
    Watch,
    /// Upload a score file and follow its processing
    Upload {
        /// Path to scoredata.bin (defaults to the game's data directory)
        file: Option<PathBuf>,
    },
}

/// How following the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Failed,
    /// No further updates can arrive
    Detached,
    Interrupted,
}

impl RunOutcome {
    fn exit_code(self) -> ExitCode {
        match self {
            RunOutcome::Completed | RunOutcome::Detached => ExitCode::SUCCESS,
            RunOutcome::Failed => ExitCode::FAILURE,
            RunOutcome::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = ConfigResolver::new("chlb-upload")
        .with_config_file(args.config.clone())
        .resolve(args.api_url.as_deref(), args.data_dir.as_deref())
        .context("Failed to resolve configuration")?;

    init_tracing(&config)?;

    info!("Starting chlb-upload against {}", config.api_url);

    let identity = LocalIdentity::load(&config.identity_path())
        .context("Failed to load local identity")?;
    if !identity.is_signed_in() {
        warn!(
            "No identity found at {}; live processing updates are unavailable",
            config.identity_path().display()
        );
    }

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    // Subscribe before launch so no event is missed
    let events = event_bus.subscribe();

    let handle = UploadProgressTracker::launch(&config, &identity, event_bus)
        .context("Failed to start upload progress tracker")?;

    let interrupt_tracker = handle.tracker().clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        interrupt_tracker.shutdown();
    });

    let outcome = match args.command {
        Command::Watch => watch(&handle, &identity, events).await,
        Command::Upload { file } => upload(&handle, &config, &identity, file, events).await?,
    };

    handle.shutdown().await;
    info!(?outcome, "chlb-upload finished");
    Ok(outcome.exit_code())
}

async fn watch(
    handle: &TrackerHandle,
    identity: &LocalIdentity,
    events: broadcast::Receiver<TrackerEvent>,
) -> RunOutcome {
    if identity.user_id().is_none() {
        println!("Not signed in; there is nothing to watch");
        return RunOutcome::Detached;
    }
    println!("Waiting for processing updates (Ctrl+C to stop)");
    follow_progress(handle.tracker(), events, &mut ProgressView::new()).await
}

async fn upload(
    handle: &TrackerHandle,
    config: &ClientConfig,
    identity: &LocalIdentity,
    file: Option<PathBuf>,
    events: broadcast::Receiver<TrackerEvent>,
) -> Result<RunOutcome> {
    let tracker = handle.tracker();
    let uploader = ScoreUploader::new(&config.api_url, tracker.clone())
        .context("Failed to create upload client")?;

    let file = file.or_else(default_scoredata_path);
    let cancel = tracker.cancellation_token();

    let result = tokio::select! {
        _ = cancel.cancelled() => return Ok(RunOutcome::Interrupted),
        result = uploader.upload(file.as_deref(), identity.auth_token()) => result,
    };

    if result.is_ok() && identity.user_id().is_none() {
        println!("Upload accepted; sign in to follow processing progress");
        return Ok(RunOutcome::Detached);
    }

    // A failed upload is already in the buffered events as the failed state
    Ok(follow_progress(tracker, events, &mut ProgressView::new()).await)
}

/// Print session changes until the session terminates
async fn follow_progress(
    tracker: &UploadProgressTracker,
    mut events: broadcast::Receiver<TrackerEvent>,
    view: &mut ProgressView,
) -> RunOutcome {
    let cancel = tracker.cancellation_token();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return RunOutcome::Interrupted,
            event = events.recv() => event,
        };

        let snapshot = match event {
            Ok(TrackerEvent::SessionChanged { snapshot }) => snapshot,
            Ok(TrackerEvent::ChannelStatusChanged { status, attempt, .. }) => {
                if let Some(line) = render_channel_status(status, attempt) {
                    println!("{}", line);
                }
                if status == ChannelStatus::Abandoned {
                    return RunOutcome::Detached;
                }
                continue;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress display fell behind; showing latest state");
                tracker.snapshot().await
            }
            Err(RecvError::Closed) => return RunOutcome::Detached,
        };

        for line in view.render(&snapshot) {
            println!("{}", line);
        }

        if snapshot.completed {
            return if snapshot.is_failed() {
                RunOutcome::Failed
            } else {
                RunOutcome::Completed
            };
        }
    }
}

/// Initialize tracing
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr,
/// or to the configured log file, so stdout carries only progress lines.
fn init_tracing(config: &ClientConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    let file_layer = match &config.logging.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = if file_layer.is_none() {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
