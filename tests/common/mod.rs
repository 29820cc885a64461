//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use ferrywatch::config::{Config, CorridorRegistry};
use ferrywatch::repository::MemoryStore;
use ferrywatch::services::clock::{Clock, ManualClock};
use ferrywatch::services::{AppState, Stores};
use ferrywatch::sources::{ObservationSource, ScheduleSource, TemplateSchedule};

pub const SECRET: &str = "observer-test-secret";

/// 10:00 local on the service date (UTC-4).
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap()
}

pub fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn registry() -> Arc<CorridorRegistry> {
    Arc::new(CorridorRegistry::load(None).unwrap())
}

pub fn templates(registry: &CorridorRegistry) -> Arc<TemplateSchedule> {
    Arc::new(TemplateSchedule::load(None, registry).unwrap())
}

pub fn config() -> Config {
    Config {
        observer_secret: Some(SECRET.to_string()),
        fetch_timeout_ms: 200,
        ..Config::default()
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub struct HarnessBuilder {
    config: Config,
    schedule: Option<Arc<dyn ScheduleSource>>,
    observations: Option<Arc<dyn ObservationSource>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: config(),
            schedule: None,
            observations: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn schedule(mut self, schedule: Arc<dyn ScheduleSource>) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn observations(mut self, observations: Arc<dyn ObservationSource>) -> Self {
        self.observations = Some(observations);
        self
    }

    pub fn build(self) -> Harness {
        let registry = registry();
        let schedule = self
            .schedule
            .unwrap_or_else(|| templates(&registry) as Arc<dyn ScheduleSource>);
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryStore::new());
        let state = AppState::build(
            self.config,
            registry,
            schedule,
            Stores::shared(store.clone()),
            self.observations,
            clock.clone() as Arc<dyn Clock>,
        )
        .unwrap();
        Harness {
            state: Arc::new(state),
            clock,
            store,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

/// A dual-source status payload for SSA's Woods Hole / Vineyard Haven run.
pub fn ssa_batch(source: &str, rows: Value, reason_rows: Value) -> Value {
    json!({
        "version": "dual_source",
        "schedule_rows": rows,
        "reason_rows": reason_rows,
        "source_meta": {
            "source": source,
            "operator_id": "ssa",
            "observed_at": start().to_rfc3339(),
            "service_date": service_date().to_string(),
            "timezone": "America/New_York"
        }
    })
}

pub fn row(from: &str, to: &str, time: &str, status: &str, reason: Option<&str>) -> Value {
    json!({
        "from": from,
        "to": to,
        "departure_time_local": time,
        "status": status,
        "reason": reason
    })
}
