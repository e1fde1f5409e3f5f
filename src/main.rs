use ais_bridge::bridge::Bridge;
use ais_bridge::config::BridgeConfig;
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    info!("Starting ais-bridge {}", env!("CARGO_PKG_VERSION"));
    let config = BridgeConfig::from_env()?;
    let bridge = Bridge::from_config(&config)?;

    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn(watch_signals(shutdown.clone()));

    let result = bridge.run(shutdown.clone()).await;
    shutdown.cancel();
    watcher.abort();

    match result {
        Ok(stats) => {
            info!(
                "Shut down after {} reports ({} delivered, {} unchanged, {} ignored, {} dropped)",
                stats.reports, stats.delivered, stats.unchanged, stats.ignored, stats.dropped
            );
            Ok(())
        }
        Err(e) => {
            error!("Bridge failed: {}", e);
            Err(eyre!(e))
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| raw.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Cancels `shutdown` on SIGINT or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Unable to listen for Ctrl-C: {}", e);
                return;
            }
            info!("Received SIGINT, shutting down");
        }
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
