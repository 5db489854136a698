use super::ShutdownReason;
use std::future::pending;
use tokio::signal;
use tracing::{info, warn};

/// Resolve on SIGINT or SIGTERM.
///
/// A handler that cannot be installed never fires instead of failing the run.
pub(super) async fn shutdown_signal() -> ShutdownReason {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT signal (Ctrl+C)"),
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        _ = interrupt => ShutdownReason::Signal("SIGINT".to_string()),
        _ = terminate => ShutdownReason::Signal("SIGTERM".to_string()),
    }
}
