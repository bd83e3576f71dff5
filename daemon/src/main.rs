use anyhow::Result;
use clap::Parser;
use clipchain::config::Config;
use clipchain::{DaemonState, driver, ipc_server};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Parser)]
#[command(name = "clipchain")]
#[command(about = "Video clip sequencing daemon", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CLIPCHAIN_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    // Parse before logging is up so the configured level applies from the start
    let loaded = Config::load_from_path(&config_path);
    let level = loaded
        .as_ref()
        .map(|cfg| cfg.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("Starting clipchain v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Looking for config at: {}", config_path.display());

    let config = match loaded {
        Ok(cfg) => {
            log::info!("Configuration loaded");
            log::info!("  Sequence:");
            log::info!("    - Render backend: {:?}", cfg.sequence.render_backend);
            log::info!("    - Buffering: {:?}", cfg.sequence.buffering);
            log::info!(
                "    - Transition epsilon: {}ms",
                cfg.sequence.transition_epsilon_ms
            );
            log::info!("    - Clips: {}", cfg.sequence.clips.len());
            for clip in &cfg.sequence.clips {
                log::info!("      - [{}] {}", clip.rule, clip.source);
            }
            log::info!(
                "  Stage: {}x{} @ {}x, {} Hz -> {}",
                cfg.stage.width,
                cfg.stage.height,
                cfg.stage.device_pixel_ratio,
                cfg.stage.refresh_rate,
                cfg.stage.output_path().display()
            );
            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            Config::default()
        }
    };

    if config.sequence.clips.is_empty() {
        log::warn!("No clips configured; the sequence cannot start");
    }

    let (driver_tx, driver_rx) = mpsc::unbounded_channel();
    let state = Arc::new(Mutex::new(DaemonState::new(config.sequence.clips.len())));

    let ipc_state = state.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server::start(ipc_state, driver_tx).await {
            log::error!("IPC server error: {}", e);
        }
    });

    let driver_state = state.clone();
    let driver_handle = tokio::spawn(async move {
        if let Err(e) = driver::run(config, driver_state, driver_rx).await {
            log::error!("Driver error: {:#}", e);
        }
    });

    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to install signal handlers: {}", e);
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

    // Whichever task finishes first, let the other one wind down too
    let mut driver_handle = driver_handle;
    let driver_done = tokio::select! {
        _ = ipc_handle => {
            log::info!("IPC server stopped");
            false
        }
        _ = &mut driver_handle => {
            log::info!("Driver stopped");
            true
        }
    };

    state.lock().await.should_exit = true;
    if !driver_done {
        // Media is released by the driver on its way out
        let _ = driver_handle.await;
    }

    log::info!("Daemon shutting down");
    Ok(())
}
