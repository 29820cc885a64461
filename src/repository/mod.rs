//! Storage seams for events, prediction snapshots/outcomes and the
//! historical samples feeding the frequency model.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::models::prediction::{BinCounts, HistoricalSample, PredictionOutcome, PredictionSnapshot, WindBin};
use crate::models::{CorridorId, OperatorId, SailingEvent};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt {table} row: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

/// Append-only log of sailing observations.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: &SailingEvent) -> Result<(), RepoError>;

    async fn append_all(&self, events: &[SailingEvent]) -> Result<usize, RepoError> {
        for event in events {
            self.append(event).await?;
        }
        Ok(events.len())
    }

    /// Events for any sailing of `corridor` departing at `departure`,
    /// oldest observation first.
    async fn events_for_departure(
        &self,
        corridor: &CorridorId,
        departure: NaiveDateTime,
    ) -> Result<Vec<SailingEvent>, RepoError>;

    /// Events whose service date is on or after `date`, in recording order.
    async fn events_since(&self, date: NaiveDate) -> Result<Vec<SailingEvent>, RepoError>;
}

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Inserts snapshots, skipping any already stored for the same cycle,
    /// sailing and model version. Returns how many were new.
    async fn insert_snapshots(&self, snapshots: &[PredictionSnapshot]) -> Result<usize, RepoError>;

    /// Snapshots for sailings of `corridor` departing in `[from, to)`.
    async fn snapshots_between(
        &self,
        corridor: &CorridorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<PredictionSnapshot>, RepoError>;

    /// Snapshots for sailings departing before `before` that have no outcome yet.
    async fn unresolved_snapshots(&self, before: NaiveDateTime) -> Result<Vec<PredictionSnapshot>, RepoError>;

    /// Stores an outcome unless the snapshot already has one.
    async fn record_outcome(&self, outcome: &PredictionOutcome) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Stores a sample unless the sailing was already sampled.
    async fn record_sample(&self, sample: &HistoricalSample) -> Result<bool, RepoError>;

    async fn bin_counts(
        &self,
        operator: &OperatorId,
        corridor: &CorridorId,
        bin: WindBin,
    ) -> Result<BinCounts, RepoError>;
}
