//! Status ingest from the observer agent and the live-status cache.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::cache::TtlCache;
use super::clock::Clock;
use super::merge::merge_sources;
use super::persistence::{GuardDecision, StatusLedger};
use super::rate_limit::{IngestRateLimiter, RateLimited};
use crate::config::CorridorRegistry;
use crate::models::board::BoardScope;
use crate::models::ingest::{ObservedReason, ObservedRow, RawBatch};
use crate::models::sailing::clean_reason;
use crate::models::{OperatorId, PortId, SailingEvent, SailingKey, SailingStatus, StatusRecord};
use crate::repository::{EventStore, RepoError};
use crate::utils::{normalize_departure_time, rezone};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("schedule_rows is empty; refusing to treat the batch as a day without sailings")]
    NoScheduleRows,
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
    #[error("source {feed} may write again in {} s", .limit.retry_after_secs)]
    RateLimited { feed: String, limit: RateLimited },
    #[error(transparent)]
    Store(#[from] RepoError),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::NoScheduleRows => "regression_no_schedule_rows",
            IngestError::Invalid { .. } => "invalid_payload",
            IngestError::RateLimited { .. } => "rate_limited",
            IngestError::Store(_) => "storage_failure",
        }
    }

    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub persisted: usize,
    pub schedule_rows_count: usize,
    pub reason_rows_count: usize,
    pub reasons_applied: usize,
    pub transitions_rejected: usize,
}

/// Latest accepted batch from one source for one service date.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub source: String,
    pub operator_id: OperatorId,
    pub service_date: NaiveDate,
    pub observed_at: DateTime<Utc>,
    pub records: Vec<StatusRecord>,
}

pub struct StatusService {
    registry: Arc<CorridorRegistry>,
    events: Arc<dyn EventStore>,
    ledger: StatusLedger,
    snapshots: TtlCache<(String, NaiveDate), SourceSnapshot>,
    limiter: IngestRateLimiter,
    clock: Arc<dyn Clock>,
    zone: Tz,
}

struct ValidatedBatch {
    operator_id: OperatorId,
    zone: Tz,
    rows: Vec<ObservedRow>,
    reasons: Vec<ObservedReason>,
}

impl StatusService {
    pub fn new(
        registry: Arc<CorridorRegistry>,
        events: Arc<dyn EventStore>,
        cache_ttl: Duration,
        ingest_interval: Duration,
        clock: Arc<dyn Clock>,
        zone: Tz,
    ) -> Self {
        Self {
            registry,
            events,
            ledger: StatusLedger::new(),
            snapshots: TtlCache::new(cache_ttl, clock.clone()),
            limiter: IngestRateLimiter::new(ingest_interval, clock.clone()),
            clock,
            zone,
        }
    }

    pub async fn ingest(&self, batch: RawBatch) -> Result<IngestReport, IngestError> {
        let source = batch.meta.source.trim().to_string();
        if source.is_empty() {
            return Err(IngestError::invalid("source_meta.source", "must not be empty"));
        }
        if batch.schedule_rows.is_empty() {
            tracing::error!(
                source = %source,
                reason_rows = batch.reason_rows.len(),
                "Rejected batch with no schedule rows"
            );
            return Err(IngestError::NoScheduleRows);
        }
        if batch.dual_source && batch.reason_rows.is_empty() {
            tracing::warn!(source = %source, "Batch carried no reason rows; reasons come from schedule feed only");
        }

        // nothing below touches state until the whole batch has validated
        let validated = self.validate(&batch)?;

        let permit = self.limiter.try_acquire(&source).map_err(|limit| {
            tracing::warn!(source = %source, retry_after_secs = limit.retry_after_secs, "Ingest rate limited");
            IngestError::RateLimited {
                feed: source.clone(),
                limit,
            }
        })?;

        match self.apply_batch(&source, &batch, validated).await {
            Ok(report) => {
                drop(permit);
                Ok(report)
            }
            Err(err) => {
                self.limiter.release(permit);
                Err(err)
            }
        }
    }

    async fn apply_batch(
        &self,
        source: &str,
        batch: &RawBatch,
        validated: ValidatedBatch,
    ) -> Result<IngestReport, IngestError> {
        let merged = merge_sources(validated.rows, &validated.reasons);
        let service_date = batch.meta.service_date;
        let recorded_at = self.clock.now();

        let mut events = Vec::with_capacity(merged.rows.len());
        for row in &merged.rows {
            let route = self
                .registry
                .route_between(&validated.operator_id, &row.origin, &row.destination)
                .ok_or_else(|| {
                    IngestError::invalid(
                        "schedule_rows",
                        format!("no {} route from {} to {}", validated.operator_id, row.origin, row.destination),
                    )
                })?;
            let departure_local = rezone(service_date.and_time(row.departure_time), validated.zone, self.zone);
            events.push(SailingEvent {
                id: Uuid::new_v4(),
                key: SailingKey {
                    corridor_id: route.corridor_id.clone(),
                    operator_id: validated.operator_id.clone(),
                    origin: row.origin.clone(),
                    destination: row.destination.clone(),
                    scheduled_departure_local: departure_local,
                },
                status: row.status,
                reason: clean_reason(row.reason.as_deref()),
                source: source.to_string(),
                observed_at: batch.meta.observed_at,
                recorded_at,
            });
        }

        let persisted = self.events.append_all(&events).await?;

        let mut rejected = 0;
        let mut records = Vec::with_capacity(events.len());
        for event in &events {
            let decision = self.ledger.apply(event);
            if let GuardDecision::Rejected { .. } = decision {
                rejected += 1;
            }
            records.push(decision.record().clone());
        }

        self.snapshots.insert(
            (source.to_string(), service_date),
            SourceSnapshot {
                source: source.to_string(),
                operator_id: validated.operator_id.clone(),
                service_date,
                observed_at: batch.meta.observed_at,
                records,
            },
        );

        let report = IngestReport {
            ingested: merged.rows.len(),
            persisted,
            schedule_rows_count: merged.stats.schedule_rows,
            reason_rows_count: merged.stats.reason_rows,
            reasons_applied: merged.stats.reasons_applied,
            transitions_rejected: rejected,
        };

        tracing::info!(
            source = %source,
            operator_id = %validated.operator_id,
            service_date = %service_date,
            ingested = report.ingested,
            persisted = report.persisted,
            reasons_applied = report.reasons_applied,
            transitions_rejected = report.transitions_rejected,
            "Status batch ingested"
        );

        Ok(report)
    }

    fn validate(&self, batch: &RawBatch) -> Result<ValidatedBatch, IngestError> {
        let operator_id = OperatorId::new(&batch.meta.operator_id);
        if self.registry.operator(&operator_id).is_none() {
            return Err(IngestError::invalid(
                "source_meta.operator_id",
                format!("unknown operator {:?}", batch.meta.operator_id),
            ));
        }
        let timezone = batch.meta.timezone.trim();
        if timezone.is_empty() {
            return Err(IngestError::invalid("source_meta.timezone", "must not be empty"));
        }
        let zone: Tz = timezone
            .parse()
            .map_err(|_| IngestError::invalid("source_meta.timezone", format!("unknown IANA zone {timezone:?}")))?;

        let mut rows = Vec::with_capacity(batch.schedule_rows.len());
        for (i, raw) in batch.schedule_rows.iter().enumerate() {
            let field = |name: &str| format!("schedule_rows[{i}].{name}");
            let origin = self.port(&raw.from, || field("from"))?;
            let destination = self.port(&raw.to, || field("to"))?;
            if origin == destination {
                return Err(IngestError::invalid(field("to"), "destination equals origin"));
            }
            if self.registry.route_between(&operator_id, &origin, &destination).is_none() {
                return Err(IngestError::invalid(
                    field("to"),
                    format!("no {operator_id} route from {origin} to {destination}"),
                ));
            }
            let departure_time = normalize_departure_time(&raw.departure_time_local)
                .map_err(|e| IngestError::invalid(field("departure_time_local"), e.to_string()))?;
            let status: SailingStatus = raw
                .status
                .parse()
                .map_err(|e: crate::models::sailing::UnknownStatus| IngestError::invalid(field("status"), e.to_string()))?;
            rows.push(ObservedRow {
                origin,
                destination,
                departure_time,
                status,
                reason: raw.reason.clone(),
            });
        }

        let mut reasons = Vec::with_capacity(batch.reason_rows.len());
        for (i, raw) in batch.reason_rows.iter().enumerate() {
            let field = |name: &str| format!("reason_rows[{i}].{name}");
            let origin = self.port(&raw.from, || field("from"))?;
            let destination = self.port(&raw.to, || field("to"))?;
            let departure_time = normalize_departure_time(&raw.departure_time_local)
                .map_err(|e| IngestError::invalid(field("departure_time_local"), e.to_string()))?;
            let Some(reason) = clean_reason(raw.reason.as_deref()) else {
                continue;
            };
            reasons.push(ObservedReason {
                origin,
                destination,
                departure_time,
                reason,
            });
        }

        Ok(ValidatedBatch {
            operator_id,
            zone,
            rows,
            reasons,
        })
    }

    fn port(&self, raw: &str, field: impl Fn() -> String) -> Result<PortId, IngestError> {
        if raw.trim().is_empty() {
            return Err(IngestError::invalid(field(), "must not be empty"));
        }
        let id = PortId::new(raw);
        if self.registry.port(&id).is_none() {
            return Err(IngestError::invalid(field(), format!("unknown terminal {raw:?}")));
        }
        Ok(id)
    }

    /// Cached operator rows for a scope and date, from every fresh source
    /// snapshot. Status and reason reflect the authoritative ledger.
    pub fn live_rows(&self, scope: &BoardScope, date: NaiveDate) -> Vec<StatusRecord> {
        let mut rows = Vec::new();
        for snapshot in self.snapshots.values() {
            for record in &snapshot.records {
                if record.key.scheduled_departure_local.date() != date || !scope.contains(&record.key) {
                    continue;
                }
                rows.push(self.ledger.get(&record.key).unwrap_or_else(|| record.clone()));
            }
        }
        rows
    }

    pub fn current(&self, key: &SailingKey) -> Option<StatusRecord> {
        self.ledger.get(key)
    }

    pub fn canceled_in_scope(&self, scope: &BoardScope, date: NaiveDate) -> Vec<StatusRecord> {
        self.ledger
            .canceled_on(date)
            .into_iter()
            .filter(|record| scope.contains(&record.key))
            .collect()
    }

    /// Replays stored events into the ledger, e.g. after a restart.
    pub async fn restore(&self, since: NaiveDate) -> Result<usize, RepoError> {
        let events = self.events.events_since(since).await?;
        for event in &events {
            self.ledger.apply(event);
        }
        tracing::info!(events = events.len(), since = %since, sailings = self.ledger.len(), "Status ledger restored");
        Ok(events.len())
    }

    /// Expires stale cache entries and drops ledger days older than `keep_from`.
    pub fn housekeeping(&self, keep_from: NaiveDate) -> (usize, usize) {
        let expired = self.snapshots.purge_expired();
        let purged = self.ledger.purge_before(keep_from);
        if expired > 0 || purged > 0 {
            tracing::debug!(expired_snapshots = expired, purged_sailings = purged, "Status housekeeping");
        }
        (expired, purged)
    }
}
