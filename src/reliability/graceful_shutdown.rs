//! Shutdown signalling.
//!
//! The server stops on SIGINT, SIGTERM, or when some component cancels the shared
//! token (a failed model load does this).

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wait for an OS shutdown signal.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// Resolve when the process should stop serving.
///
/// An OS signal cancels `token`, so every other holder observes the shutdown too.
pub async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        _ = os_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
    info!("Shutdown signal received, draining connections");
}
