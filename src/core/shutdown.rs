//! Process shutdown signals.
//!
//! Ctrl+C (and SIGTERM/SIGHUP on Unix) cancel one process-wide token. While
//! a response streams the terminal is in raw mode, so Ctrl+C arrives as an
//! ordinary keystroke and only interrupts that response.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawns a task that cancels `token` on the first shutdown signal.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_signal() => {
                info!(signal, "shutdown signal received");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut terminate, mut hangup) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::hangup()),
    ) {
        (Ok(terminate), Ok(hangup)) => (terminate, hangup),
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, "could not register SIGTERM/SIGHUP; listening for Ctrl+C only");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        name = ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
