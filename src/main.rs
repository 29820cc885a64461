use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferrywatch::config::{database, Config, CorridorRegistry};
use ferrywatch::create_router;
use ferrywatch::repository::{MemoryStore, PgStore};
use ferrywatch::services::clock::{Clock, SystemClock};
use ferrywatch::services::{AppState, Stores};
use ferrywatch::sources::{ObservationSource, ScheduleSource, TemplateSchedule, ZipObservationClient};

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.json_logs);

    let registry = Arc::new(CorridorRegistry::load(config.corridors_path.as_deref())?);
    let schedule: Arc<dyn ScheduleSource> =
        Arc::new(TemplateSchedule::load(config.templates_path.as_deref(), &registry)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let stores = match config.database_url.as_deref() {
        Some(url) => {
            let pool = database::create_pool(url).await?;
            tracing::info!("Using Postgres storage");
            Stores::shared(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("No database_url configured; events and predictions are kept in memory only");
            Stores::shared(Arc::new(MemoryStore::new()))
        }
    };

    let observations: Option<Arc<dyn ObservationSource>> = match config.zip_observation_url.as_deref() {
        Some(url) => Some(Arc::new(ZipObservationClient::new(
            url,
            Duration::from_millis(config.fetch_timeout_ms),
            chrono::Duration::seconds(config.zip_cache_ttl_secs),
            clock.clone(),
        )?)),
        None => {
            tracing::warn!("No zip_observation_url configured; the local observation tier is disabled");
            None
        }
    };

    if config.observer_secret.as_deref().map_or(true, |s| s.trim().is_empty()) {
        tracing::error!(severity = "critical", "observer_secret is not set; ingest routes will answer 500");
    }

    let port = config.port;
    let state = Arc::new(AppState::build(config, registry.clone(), schedule, stores, observations, clock)?);
    state.restore().await?;

    let housekeeping = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            loop {
                ticker.tick().await;
                state.housekeeping();
            }
        })
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(
        %addr,
        corridors = registry.corridors().count(),
        routes = registry.routes().len(),
        "Starting server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    housekeeping.abort();
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
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

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
