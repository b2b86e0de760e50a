use tokio::signal;
use tokio::sync::watch;

/// Resolves on Ctrl+C or SIGTERM, then flips `notify` so background
/// finalization workers stop pulling new jobs.
pub(crate) async fn shutdown_signal(notify: watch::Sender<bool>) {
    wait_for_signal().await;
    tracing::info!("shutdown signal received");

    if notify.send(true).is_err() {
        tracing::debug!("No background workers listening for shutdown");
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
