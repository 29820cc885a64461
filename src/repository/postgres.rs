use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{EventStore, HistoryStore, PredictionStore, RepoError};
use crate::models::prediction::{
    BinCounts, HistoricalSample, LikelihoodEstimate, PredictionInputs, PredictionOutcome, PredictionSnapshot,
    RiskAssessment, WindBin,
};
use crate::models::{CorridorId, OperatorId, PortId, SailingEvent, SailingKey, SailingStatus};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    corridor_id: String,
    operator_id: String,
    origin: String,
    destination: String,
    scheduled_departure_local: NaiveDateTime,
    status: String,
    reason: Option<String>,
    source: String,
    observed_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for SailingEvent {
    type Error = RepoError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let status: SailingStatus = row.status.parse().map_err(|e: crate::models::sailing::UnknownStatus| {
            RepoError::Corrupt {
                table: "sailing_events",
                detail: e.to_string(),
            }
        })?;
        Ok(SailingEvent {
            id: row.id,
            key: SailingKey {
                corridor_id: CorridorId::new(&row.corridor_id),
                operator_id: OperatorId::new(&row.operator_id),
                origin: PortId::new(&row.origin),
                destination: PortId::new(&row.destination),
                scheduled_departure_local: row.scheduled_departure_local,
            },
            status,
            reason: row.reason,
            source: row.source,
            observed_at: row.observed_at,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    cycle_id: Uuid,
    sailing_id: String,
    corridor_id: String,
    operator_id: String,
    origin: String,
    destination: String,
    scheduled_departure_local: NaiveDateTime,
    model_version: String,
    created_at: DateTime<Utc>,
    inputs: Json<PredictionInputs>,
    risk: Json<RiskAssessment>,
    likelihood: Option<Json<LikelihoodEstimate>>,
}

impl From<SnapshotRow> for PredictionSnapshot {
    fn from(row: SnapshotRow) -> Self {
        PredictionSnapshot {
            id: row.id,
            cycle_id: row.cycle_id,
            sailing_id: row.sailing_id,
            key: SailingKey {
                corridor_id: CorridorId::new(&row.corridor_id),
                operator_id: OperatorId::new(&row.operator_id),
                origin: PortId::new(&row.origin),
                destination: PortId::new(&row.destination),
                scheduled_departure_local: row.scheduled_departure_local,
            },
            model_version: row.model_version,
            created_at: row.created_at,
            inputs: row.inputs.0,
            risk: row.risk.0,
            likelihood: row.likelihood.map(|l| l.0),
        }
    }
}

const SNAPSHOT_COLUMNS: &str = "id, cycle_id, sailing_id, corridor_id, operator_id, origin, destination, \
     scheduled_departure_local, model_version, created_at, inputs, risk, likelihood";

/// Serialized name of a unit enum variant, as stored in text columns.
fn enum_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn append(&self, event: &SailingEvent) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sailing_events
                (id, sailing_id, corridor_id, operator_id, origin, destination,
                 scheduled_departure_local, service_date, status, reason, source,
                 observed_at, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(event.id)
        .bind(event.key.sailing_id())
        .bind(event.key.corridor_id.as_str())
        .bind(event.key.operator_id.as_str())
        .bind(event.key.origin.as_str())
        .bind(event.key.destination.as_str())
        .bind(event.key.scheduled_departure_local)
        .bind(event.key.service_date())
        .bind(event.status.as_str())
        .bind(event.reason.as_deref())
        .bind(&event.source)
        .bind(event.observed_at)
        .bind(event.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_all(&self, events: &[SailingEvent]) -> Result<usize, RepoError> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO sailing_events
                    (id, sailing_id, corridor_id, operator_id, origin, destination,
                     scheduled_departure_local, service_date, status, reason, source,
                     observed_at, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(event.id)
            .bind(event.key.sailing_id())
            .bind(event.key.corridor_id.as_str())
            .bind(event.key.operator_id.as_str())
            .bind(event.key.origin.as_str())
            .bind(event.key.destination.as_str())
            .bind(event.key.scheduled_departure_local)
            .bind(event.key.service_date())
            .bind(event.status.as_str())
            .bind(event.reason.as_deref())
            .bind(&event.source)
            .bind(event.observed_at)
            .bind(event.recorded_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(events.len())
    }

    async fn events_for_departure(
        &self,
        corridor: &CorridorId,
        departure: NaiveDateTime,
    ) -> Result<Vec<SailingEvent>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, corridor_id, operator_id, origin, destination, scheduled_departure_local,
                   status, reason, source, observed_at, recorded_at
            FROM sailing_events
            WHERE corridor_id = $1 AND scheduled_departure_local = $2
            ORDER BY observed_at, recorded_at
            "#,
        )
        .bind(corridor.as_str())
        .bind(departure)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SailingEvent::try_from).collect()
    }

    async fn events_since(&self, date: NaiveDate) -> Result<Vec<SailingEvent>, RepoError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, corridor_id, operator_id, origin, destination, scheduled_departure_local,
                   status, reason, source, observed_at, recorded_at
            FROM sailing_events
            WHERE service_date >= $1
            ORDER BY recorded_at
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SailingEvent::try_from).collect()
    }
}

#[async_trait]
impl PredictionStore for PgStore {
    async fn insert_snapshots(&self, snapshots: &[PredictionSnapshot]) -> Result<usize, RepoError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for snapshot in snapshots {
            let result = sqlx::query(
                r#"
                INSERT INTO prediction_snapshots
                    (id, cycle_id, sailing_id, corridor_id, operator_id, origin, destination,
                     scheduled_departure_local, model_version, created_at, inputs, risk, likelihood)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (cycle_id, sailing_id, model_version) DO NOTHING
                "#,
            )
            .bind(snapshot.id)
            .bind(snapshot.cycle_id)
            .bind(&snapshot.sailing_id)
            .bind(snapshot.key.corridor_id.as_str())
            .bind(snapshot.key.operator_id.as_str())
            .bind(snapshot.key.origin.as_str())
            .bind(snapshot.key.destination.as_str())
            .bind(snapshot.key.scheduled_departure_local)
            .bind(&snapshot.model_version)
            .bind(snapshot.created_at)
            .bind(Json(&snapshot.inputs))
            .bind(Json(&snapshot.risk))
            .bind(snapshot.likelihood.as_ref().map(Json))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn snapshots_between(
        &self,
        corridor: &CorridorId,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<PredictionSnapshot>, RepoError> {
        let query = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM prediction_snapshots \
             WHERE corridor_id = $1 AND scheduled_departure_local >= $2 AND scheduled_departure_local < $3 \
             ORDER BY scheduled_departure_local, created_at"
        );
        let rows = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(corridor.as_str())
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PredictionSnapshot::from).collect())
    }

    async fn unresolved_snapshots(&self, before: NaiveDateTime) -> Result<Vec<PredictionSnapshot>, RepoError> {
        let query = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM prediction_snapshots s \
             WHERE s.scheduled_departure_local < $1 \
               AND NOT EXISTS (SELECT 1 FROM prediction_outcomes o WHERE o.snapshot_id = s.id) \
             ORDER BY s.scheduled_departure_local, s.created_at"
        );
        let rows = sqlx::query_as::<_, SnapshotRow>(&query)
            .bind(before)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PredictionSnapshot::from).collect())
    }

    async fn record_outcome(&self, outcome: &PredictionOutcome) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO prediction_outcomes
                (id, snapshot_id, event_id, predicted_level, predicted_bucket, observed_status,
                 observed_bucket, matched, score_error, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (snapshot_id) DO NOTHING
            "#,
        )
        .bind(outcome.id)
        .bind(outcome.snapshot_id)
        .bind(outcome.event_id)
        .bind(enum_text(&outcome.predicted_level))
        .bind(enum_text(&outcome.predicted_bucket))
        .bind(outcome.observed_status.as_str())
        .bind(enum_text(&outcome.observed_bucket))
        .bind(outcome.matched)
        .bind(outcome.score_error)
        .bind(outcome.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn record_sample(&self, sample: &HistoricalSample) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO historical_samples
                (sailing_id, operator_id, corridor_id, wind_speed_mph, wind_bin, status, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (sailing_id) DO NOTHING
            "#,
        )
        .bind(&sample.sailing_id)
        .bind(sample.operator_id.as_str())
        .bind(sample.corridor_id.as_str())
        .bind(sample.wind_speed_mph)
        .bind(WindBin::from_mph(sample.wind_speed_mph).as_str())
        .bind(sample.status.as_str())
        .bind(sample.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn bin_counts(
        &self,
        operator: &OperatorId,
        corridor: &CorridorId,
        bin: WindBin,
    ) -> Result<BinCounts, RepoError> {
        let (total, canceled): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'canceled')
            FROM historical_samples
            WHERE operator_id = $1 AND corridor_id = $2 AND wind_bin = $3
            "#,
        )
        .bind(operator.as_str())
        .bind(corridor.as_str())
        .bind(bin.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(BinCounts {
            total: u32::try_from(total).unwrap_or(u32::MAX),
            canceled: u32::try_from(canceled).unwrap_or(u32::MAX),
        })
    }
}
