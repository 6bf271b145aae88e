mod config;
mod controller;
mod coordinator;
mod frame_buffer;
mod info;
mod inputs;
mod ipc_server;
mod macros;
mod node;
mod pair;
mod parameters;
mod poll;
mod stats;

use anyhow::Result;
use common::{NodeStatus, OutputFormat};
use controller::PlaybinController;
use coordinator::HandoverCoordinator;
use frame_buffer::FrameBuffer;
use inputs::InputTable;
use node::NodeReport;
use pair::StreamControllerPair;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[tokio::main]
async fn main() -> Result<()> {
    // Config is read before logging so its level can seed the filter
    let loaded = config::Config::load();
    let log_level = loaded
        .as_ref()
        .map(|cfg| cfg.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting handover daemon v{}", env!("CARGO_PKG_VERSION"));

    let config_path = config::Config::default_config_path()?;
    log::info!("Looking for config at: {}", config_path.display());

    let config = match loaded {
        Ok(cfg) => {
            log::info!("✓ Configuration loaded successfully");
            log::info!("  General settings:");
            log::info!("    - Log level: {}", cfg.general.log_level);
            log::info!("    - Cycle rate: {}/s", cfg.general.cycle_rate);
            log::info!("  Handover settings:");
            log::info!(
                "    - Ready at: {:.0}% buffered",
                cfg.handover.ready_buffer_level
            );
            log::info!("    - Frame queue depth: {}", cfg.handover.frame_queue_depth);
            log::info!(
                "  Playback speed range: {} - {}",
                cfg.playback.min_speed,
                cfg.playback.max_speed
            );

            if cfg.startup.url.is_empty() {
                log::info!("  Startup source: none");
            } else {
                log::info!("  Startup source: {}", cfg.startup.url);
                log::info!(
                    "    - Looping: {}",
                    if cfg.startup.looping { "yes" } else { "no" }
                );
                log::info!(
                    "    - Switch on cue: {}",
                    if cfg.startup.switch_on_cue { "yes" } else { "no" }
                );
            }

            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            if let Some(dir) = config_path.parent() {
                log::info!("To create a config file:");
                log::info!("  mkdir -p {}", dir.display());
                log::info!("  cp config.toml.example {}", config_path.display());
            }
            config::Config::default()
        }
    };

    #[cfg(not(feature = "video"))]
    log::warn!("Video support not compiled (build with --features video to enable)");

    let limits = config.speed_limits();
    let pair = StreamControllerPair::new(
        PlaybinController::new("main", limits),
        PlaybinController::new("spare", limits),
    );
    let table = Arc::new(InputTable::standard());
    let frame_buffer = Arc::new(FrameBuffer::new());
    let coordinator = HandoverCoordinator::new(
        pair,
        Arc::clone(&table),
        Arc::clone(&frame_buffer),
        config.coordinator_settings(),
    );

    // Channel for input changes from IPC to the poll loop
    let (param_tx, param_rx) = mpsc::unbounded_channel();
    for change in config.startup.changes() {
        // Receiver is alive until the poll loop ends
        let _ = param_tx.send(change);
    }

    let period = config.cycle_period();
    let state = Arc::new(Mutex::new(DaemonState::new(frame_buffer)));

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_tx = param_tx.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, ipc_tx).await {
            log::error!("IPC server error: {:#}", e);
        }
    });

    // Start poll loop
    let poll_state = state.clone();
    let poll_handle = tokio::spawn(async move {
        if let Err(e) = poll::run(poll_state, param_rx, table, coordinator, period).await {
            log::error!("Poll loop error: {:#}", e);
        }
    });

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to set up signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_state.lock().await.should_exit = true;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = ipc_handle => {
            log::info!("IPC server stopped");
        }
        _ = poll_handle => {
            log::info!("Poll loop stopped");
        }
    }

    log::info!("Daemon shutting down");
    Ok(())
}

/// Shared daemon state
pub struct DaemonState {
    pub should_exit: bool,
    pub start_time: std::time::Instant,
    /// Last status published by the poll loop
    pub status: NodeStatus,
    /// Visible frame, read by snapshots
    pub frame_buffer: Arc<FrameBuffer>,
}

impl DaemonState {
    fn new(frame_buffer: Arc<FrameBuffer>) -> Self {
        Self {
            should_exit: false,
            start_time: std::time::Instant::now(),
            status: NodeStatus::default(),
            frame_buffer,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Store the node's latest report for queries
    pub fn publish(&mut self, format: Option<OutputFormat>, report: NodeReport) {
        self.status = NodeStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.uptime_secs(),
            format: format.unwrap_or_default(),
            rows: report.rows,
            warning: report.warning,
            error: report.error,
            info: report.info,
        };
    }
}
