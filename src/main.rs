use std::sync::Arc;

use tokio::{signal, sync::oneshot};
use tracing::{error, info};

use logistics_tracker as tracker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = tracker::config::load_config()?;
    tracker::config::init_tracing(&cfg.log_level, cfg.log_json);

    let addr = cfg.bind_address();
    let state = tracker::AppState::build(cfg, Arc::new(tracker::clock::SystemClock)).await?;

    // Pick up legs and hub queues left behind by the previous process
    match tracker::dispatch::resume::resume(&state.orchestrator).await {
        Ok(report) => info!(
            resumed = report.resumed,
            completed = report.completed,
            skipped = report.skipped,
            batches = report.batches,
            "Resume finished"
        ),
        Err(err) => error!("Resume failed: {}", err),
    }

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let scheduler = state.scheduler().clone();
    let ticker = tokio::spawn(async move {
        scheduler
            .run(async {
                let _ = stop_rx.await;
            })
            .await;
    });

    let app = tracker::app_router(state);
    info!("logistics-tracker listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    if let Err(err) = ticker.await {
        error!("Scheduler task ended abnormally: {}", err);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
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
    info!("Shutdown signal received");
}
