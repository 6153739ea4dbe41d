use photo_styler::{
    app_state::Components, config::AppConfig, db, routes::metrics::describe_metrics,
    services::scheduler::JobScheduler,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting style job worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    describe_metrics();

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize services
    tracing::info!("Initializing services");
    let components =
        Components::from_config(&config, db_pool).expect("Failed to initialize services");

    let shutdown = CancellationToken::new();
    let scheduler = JobScheduler::new(components.processor, shutdown.clone()).spawn();

    tracing::info!(
        batch_size = config.batch_size,
        poll_interval_secs = config.poll_interval_secs,
        "Worker ready, processing jobs"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received, finishing current pass");
    shutdown.cancel();

    if let Err(e) = scheduler.await {
        tracing::error!(error = %e, "Scheduler task ended abnormally");
    }
}
