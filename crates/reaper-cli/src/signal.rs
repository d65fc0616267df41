//! Process signal handling.

use std::future::Future;

/// Resolve on SIGTERM or SIGINT (Ctrl-C elsewhere).
///
/// If no handler can be installed this never resolves; the process then
/// stops only when killed, rather than shutting down on startup.
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "failed to register signal handlers, falling back to ctrl-c");
                ctrl_c_or_park(tokio::signal::ctrl_c()).await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c_or_park(tokio::signal::ctrl_c()).await;
    }
}

/// Await a ctrl-c listener; if it cannot be registered, wait forever.
async fn ctrl_c_or_park<F>(listener: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match listener.await {
        Ok(()) => tracing::info!("received ctrl-c"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for ctrl-c, shutdown signals are unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn failed_listener_never_resolves() {
        let parked = tokio::time::timeout(
            Duration::from_secs(3600),
            ctrl_c_or_park(async { Err(std::io::Error::other("no signal driver")) }),
        )
        .await;
        assert!(parked.is_err());
    }

    #[tokio::test]
    async fn delivered_ctrl_c_resolves() {
        tokio::time::timeout(Duration::from_secs(1), ctrl_c_or_park(async { Ok(()) }))
            .await
            .expect("listener result must be returned");
    }
}
