//! Signal handling for graceful shutdown

use tracing::{info, warn};

/// Wait for SIGINT or SIGTERM (ctrl-c elsewhere).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to set up SIGTERM handler");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(signal = "SIGINT", "Signal received");
        }
        _ = sigterm.recv() => {
            info!(signal = "SIGTERM", "Signal received");
        }
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(signal = "SIGINT", "Signal received"),
        Err(e) => {
            // Without a handler the process can only be killed.
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}
