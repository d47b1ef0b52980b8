use anyhow::Context;
use ridematch::orchestration::{
    events, Clock, DriverAvailabilityPoller, MatchingCoordinator, MatchTimeoutScheduler,
    RideService, SystemClock,
};
use ridematch::{api, config::Config, db::init_db, MatchEvent, RideStore, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize database")?;
    let store: Arc<dyn RideStore> = Arc::new(Repository::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (outcomes, outcome_rx) = events::channel::<MatchEvent>(config.event_buffer);
    let (intake, intake_rx) = events::channel(config.event_buffer);

    let scheduler = MatchTimeoutScheduler::new(
        store.clone(),
        clock.clone(),
        config.match_timeout(),
        outcomes.clone(),
    );
    let recovered = scheduler
        .recover_with_retry(Duration::from_secs(60))
        .await
        .context("failed to re-arm pending ride timeouts")?;
    tracing::info!(recovered, "pending rides re-armed");

    let coordinator = MatchingCoordinator::new(scheduler);
    tokio::spawn(coordinator.run(intake_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = DriverAvailabilityPoller::new(
        store.clone(),
        clock.clone(),
        config.poller_settings(),
        outcomes,
    );
    let poller_task = tokio::spawn(poller.run(shutdown_rx));
    tokio::spawn(log_outcomes(outcome_rx));

    let rides = Arc::new(RideService::new(store, clock, intake));
    let app = api::create_router(api::AppState::new(rides));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    let _ = poller_task.await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn log_outcomes(mut outcomes: mpsc::Receiver<MatchEvent>) {
    while let Some(event) = outcomes.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(ride_id = %event.ride_id(), event = %json, "match outcome"),
            Err(e) => tracing::warn!(error = %e, "could not encode match outcome"),
        }
    }
}
