use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wait for SIGINT or SIGTERM, then cancel `token` so every duty runner
/// drains at its next tick.
///
/// The caller owns the token and decides what shares it; spawn this
/// alongside the runners and await the token wherever shutdown matters.
pub async fn wait_for_shutdown(token: CancellationToken) {
    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        }
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("Received SIGINT, draining duty runners");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, draining duty runners");
        }
    }

    token.cancel();
}
