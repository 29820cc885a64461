use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{EventStore, HistoryStore, PredictionStore, RepoError};
use crate::models::prediction::{BinCounts, HistoricalSample, PredictionOutcome, PredictionSnapshot, WindBin};
use crate::models::{CorridorId, OperatorId, SailingEvent, SailingStatus};

/// Process-local store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<Vec<SailingEvent>>,
    snapshots: RwLock<Vec<PredictionSnapshot>>,
    outcomes: RwLock<HashMap<Uuid, PredictionOutcome>>,
    samples: RwLock<HashMap<String, HistoricalSample>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn outcomes(&self) -> Vec<PredictionOutcome> {
        self.outcomes.read().values().cloned().collect()
    }

    pub fn samples(&self) -> Vec<HistoricalSample> {
        self.samples.read().values().cloned().collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: &SailingEvent) -> Result<(), RepoError> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn events_for_departure(
        &self,
        corridor: &CorridorId,
        departure: NaiveDateTime,
    ) -> Result<Vec<SailingEvent>, RepoError> {
        let mut events: Vec<SailingEvent> = self
            .events
            .read()
            .iter()
            .filter(|e| &e.key.corridor_id == corridor && e.key.scheduled_departure_local == departure)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.observed_at, e.recorded_at));
        Ok(events)
    }

    async fn events_since(&self, date: NaiveDate) -> Result<Vec<SailingEvent>, RepoError> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.key.service_date() >= date)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn insert_snapshots(&self, snapshots: &[PredictionSnapshot]) -> Result<usize, RepoError> {
        let mut stored = self.snapshots.write();
        let mut inserted = 0;
        for snapshot in snapshots {
            let exists = stored.iter().any(|s| {
                s.cycle_id == snapshot.cycle_id
                    && s.sailing_id == snapshot.sailing_id
                    && s.model_version == snapshot.model_version
            });
            if !exists {
                stored.push(snapshot.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn snapshots_between(
        &self,
        corridor: &CorridorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<PredictionSnapshot>, RepoError> {
        let mut found: Vec<PredictionSnapshot> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| {
                &s.key.corridor_id == corridor
                    && s.key.scheduled_departure_local >= from
                    && s.key.scheduled_departure_local < to
            })
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.key.scheduled_departure_local, s.created_at));
        Ok(found)
    }

    async fn unresolved_snapshots(&self, before: NaiveDateTime) -> Result<Vec<PredictionSnapshot>, RepoError> {
        let outcomes = self.outcomes.read();
        let mut found: Vec<PredictionSnapshot> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| s.key.scheduled_departure_local < before && !outcomes.contains_key(&s.id))
            .cloned()
            .collect();
        found.sort_by_key(|s| (s.key.scheduled_departure_local, s.created_at));
        Ok(found)
    }

    async fn record_outcome(&self, outcome: &PredictionOutcome) -> Result<bool, RepoError> {
        let mut outcomes = self.outcomes.write();
        if outcomes.contains_key(&outcome.snapshot_id) {
            return Ok(false);
        }
        outcomes.insert(outcome.snapshot_id, outcome.clone());
        Ok(true)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn record_sample(&self, sample: &HistoricalSample) -> Result<bool, RepoError> {
        let mut samples = self.samples.write();
        if samples.contains_key(&sample.sailing_id) {
            return Ok(false);
        }
        samples.insert(sample.sailing_id.clone(), sample.clone());
        Ok(true)
    }

    async fn bin_counts(
        &self,
        operator: &OperatorId,
        corridor: &CorridorId,
        bin: WindBin,
    ) -> Result<BinCounts, RepoError> {
        let samples = self.samples.read();
        let mut counts = BinCounts::default();
        for sample in samples.values() {
            if &sample.operator_id != operator
                || &sample.corridor_id != corridor
                || WindBin::from_mph(sample.wind_speed_mph) != bin
            {
                continue;
            }
            counts.total += 1;
            if sample.status == SailingStatus::Canceled {
                counts.canceled += 1;
            }
        }
        Ok(counts)
    }
}
