//! Signal handling for cancellation.
//!
//! SIGTERM and SIGINT cancel the shared token so in-flight remote calls and
//! retry waits stop promptly. Nothing is rolled back.
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Blocks until a shutdown signal is received.
pub async fn recv_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C handler");
            return std::future::pending().await;
        }
        info!("received ctrl-c");
    }
}

/// Returns a token that is cancelled on the first shutdown signal.
pub fn cancel_on_shutdown() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        recv_shutdown().await;
        trigger.cancel();
    });
    token
}
