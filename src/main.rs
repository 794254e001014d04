use std::sync::Arc;

use booking_reaper::config::Config;
use booking_reaper::logging::{init_tracing, LogConfig};
use booking_reaper::store::Store;
use booking_reaper::workers::WorkerManager;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    if let Err(e) = init_tracing(&LogConfig::from(&config)) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }
    tracing::info!(
        timezone = %config.reaper.timezone,
        cron = %config.reaper.cron,
        max_batch_size = config.reaper.max_batch_size,
        "Starting booking-reaper"
    );

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let worker_manager = WorkerManager::new(
        store.clone(),
        shutdown_tx.subscribe(),
        &config.worker,
        &config.reaper,
    );
    let worker_handle = tokio::spawn(async move { worker_manager.start().await });

    if config.worker.is_leader {
        shutdown_signal(shutdown_tx).await;
    }

    match worker_handle.await {
        Ok(Ok(())) => tracing::info!("Worker manager exited normally"),
        Ok(Err(e)) => tracing::error!(error = %e, "Worker manager failed"),
        Err(e) => tracing::error!(error = %e, "Worker task panicked"),
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
