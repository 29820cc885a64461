pub mod board;
pub mod cache;
pub mod clock;
pub mod merge;
pub mod persistence;
pub mod rate_limit;
pub mod risk;
pub mod status;
pub mod wind;

use chrono::Duration;
use chrono_tz::Tz;
use std::sync::Arc;

use crate::config::{Config, CorridorRegistry};
use crate::repository::{EventStore, HistoryStore, PredictionStore};
use crate::sources::{ObservationSource, ScheduleSource};
use crate::utils::local_today;

use self::board::BoardService;
use self::clock::Clock;
use self::risk::{Backtester, ForecastService, FrequencyModel};
use self::status::StatusService;
use self::wind::WindService;

/// The three storage seams, usually backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub predictions: Arc<dyn PredictionStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: EventStore + PredictionStore + HistoryStore + 'static,
    {
        Self {
            events: store.clone(),
            predictions: store.clone(),
            history: store,
        }
    }
}

pub struct AppState {
    pub config: Config,
    pub registry: Arc<CorridorRegistry>,
    pub clock: Arc<dyn Clock>,
    pub zone: Tz,
    pub stores: Stores,
    pub status: Arc<StatusService>,
    pub wind: Arc<WindService>,
    pub board: Arc<BoardService>,
    pub forecast: Arc<ForecastService>,
    pub backtester: Arc<Backtester>,
}

impl AppState {
    pub fn build(
        config: Config,
        registry: Arc<CorridorRegistry>,
        schedule: Arc<dyn ScheduleSource>,
        stores: Stores,
        observations: Option<Arc<dyn ObservationSource>>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let zone = config.local_zone()?;
        let fetch_timeout = std::time::Duration::from_millis(config.fetch_timeout_ms);

        let status = Arc::new(StatusService::new(
            registry.clone(),
            stores.events.clone(),
            Duration::seconds(config.status_cache_ttl_secs),
            Duration::seconds(config.ingest_interval_secs),
            clock.clone(),
            zone,
        ));
        let wind = Arc::new(WindService::new(
            registry.clone(),
            config.wind.clone(),
            observations,
            fetch_timeout,
            clock.clone(),
        ));
        let model = Arc::new(FrequencyModel::new(stores.history.clone(), registry.clone()));
        let board = Arc::new(BoardService::new(
            registry.clone(),
            schedule.clone(),
            status.clone(),
            wind.clone(),
            model.clone(),
            clock.clone(),
            zone,
            fetch_timeout,
        ));
        let forecast = Arc::new(ForecastService::new(
            registry.clone(),
            schedule,
            stores.predictions.clone(),
            model,
            clock.clone(),
            zone,
            config.model_version.clone(),
            config.forecast_horizon_days,
        ));
        let backtester = Arc::new(Backtester::new(
            stores.predictions.clone(),
            stores.events.clone(),
            stores.history.clone(),
            clock.clone(),
            zone,
        ));

        Ok(Self {
            config,
            registry,
            clock,
            zone,
            stores,
            status,
            wind,
            board,
            forecast,
            backtester,
        })
    }

    /// Blank secrets count as unset.
    pub fn observer_secret(&self) -> Option<&str> {
        self.config
            .observer_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Rebuilds the status ledger from the event log for the retained days.
    pub async fn restore(&self) -> anyhow::Result<usize> {
        let since = self.retention_start();
        Ok(self.status.restore(since).await?)
    }

    pub fn housekeeping(&self) {
        let (expired, purged) = self.status.housekeeping(self.retention_start());
        let wind_expired = self.wind.housekeeping();
        tracing::debug!(
            expired_snapshots = expired,
            purged_sailings = purged,
            expired_conditions = wind_expired,
            "Housekeeping pass"
        );
    }

    fn retention_start(&self) -> chrono::NaiveDate {
        local_today(self.clock.now(), self.zone) - Duration::days(self.config.ledger_retention_days)
    }
}
