//! Links past prediction snapshots to what actually happened.

use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::prediction::{HistoricalSample, OutcomeBucket, PredictionOutcome, PredictionSnapshot};
use crate::models::SailingEvent;
use crate::repository::{EventStore, HistoryStore, PredictionStore, RepoError};
use crate::services::clock::Clock;
use crate::services::persistence::apply_observation;
use crate::utils::utc_to_local;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BacktestReport {
    pub examined: usize,
    pub linked: usize,
    pub matched: usize,
    pub awaiting_outcome: usize,
    pub samples_recorded: usize,
    pub hit_rate: Option<f64>,
    pub mean_abs_score_error: Option<f64>,
}

/// Score a perfect prediction would have carried for the observed bucket.
fn bucket_target(bucket: OutcomeBucket) -> f64 {
    match bucket {
        OutcomeBucket::Low => 0.0,
        OutcomeBucket::High => 100.0,
    }
}

/// How an event was tied to a snapshot's sailing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMatch {
    /// Same operator, route and departure.
    Exact,
    /// Same operator and corridor slot, other direction.
    OperatorSlot,
}

/// Picks the event that carries the sailing's authoritative final status.
///
/// Events for the exact sailing win. Otherwise only the snapshot operator's
/// own events in the corridor slot are considered; other operators' sailings
/// never stand in.
pub fn confirming_event<'a>(
    snapshot: &PredictionSnapshot,
    events: &'a [SailingEvent],
) -> Option<(&'a SailingEvent, EventMatch)> {
    let exact: Vec<&SailingEvent> = events.iter().filter(|e| e.key == snapshot.key).collect();
    let (candidates, kind) = if exact.is_empty() {
        let same_operator: Vec<&SailingEvent> = events
            .iter()
            .filter(|e| e.key.operator_id == snapshot.key.operator_id)
            .collect();
        (same_operator, EventMatch::OperatorSlot)
    } else {
        (exact, EventMatch::Exact)
    };

    let mut record = None;
    for event in &candidates {
        let decision = apply_observation(record.as_ref(), event);
        record = Some(decision.record().clone());
    }
    let status = record?.status;
    candidates
        .into_iter()
        .rev()
        .find(|e| e.status == status)
        .map(|event| (event, kind))
}

pub fn build_outcome(snapshot: &PredictionSnapshot, event: &SailingEvent, recorded_at: chrono::DateTime<chrono::Utc>) -> PredictionOutcome {
    let predicted_bucket = snapshot.risk.level.bucket();
    let observed_bucket = OutcomeBucket::from_status(event.status);
    PredictionOutcome {
        id: Uuid::new_v4(),
        snapshot_id: snapshot.id,
        event_id: event.id,
        predicted_level: snapshot.risk.level,
        predicted_bucket,
        observed_status: event.status,
        observed_bucket,
        matched: predicted_bucket == observed_bucket,
        score_error: (f64::from(snapshot.risk.score) - bucket_target(observed_bucket)).abs(),
        recorded_at,
    }
}

pub struct Backtester {
    predictions: Arc<dyn PredictionStore>,
    events: Arc<dyn EventStore>,
    history: Arc<dyn HistoryStore>,
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl Backtester {
    pub fn new(
        predictions: Arc<dyn PredictionStore>,
        events: Arc<dyn EventStore>,
        history: Arc<dyn HistoryStore>,
        clock: Arc<dyn Clock>,
        zone: Tz,
    ) -> Self {
        Self {
            predictions,
            events,
            history,
            clock,
            zone,
        }
    }

    pub async fn run(&self) -> Result<BacktestReport, RepoError> {
        let now = self.clock.now();
        let pending = self.predictions.unresolved_snapshots(utc_to_local(now, self.zone)).await?;

        let mut report = BacktestReport {
            examined: pending.len(),
            ..Default::default()
        };
        let mut error_total = 0.0;

        for snapshot in &pending {
            let events = self
                .events
                .events_for_departure(&snapshot.key.corridor_id, snapshot.key.scheduled_departure_local)
                .await?;
            let Some((event, kind)) = confirming_event(snapshot, &events) else {
                report.awaiting_outcome += 1;
                continue;
            };

            let outcome = build_outcome(snapshot, event, now);
            if !self.predictions.record_outcome(&outcome).await? {
                continue;
            }
            report.linked += 1;
            error_total += outcome.score_error;
            if outcome.matched {
                report.matched += 1;
            }

            // only a sailing's own outcome becomes history
            if kind != EventMatch::Exact {
                continue;
            }
            if let Some(wind_speed_mph) = snapshot.inputs.wind_speed_mph {
                let sample = HistoricalSample {
                    sailing_id: snapshot.sailing_id.clone(),
                    operator_id: snapshot.key.operator_id.clone(),
                    corridor_id: snapshot.key.corridor_id.clone(),
                    wind_speed_mph,
                    status: event.status,
                    recorded_at: now,
                };
                if self.history.record_sample(&sample).await? {
                    report.samples_recorded += 1;
                }
            }
        }

        if report.linked > 0 {
            report.hit_rate = Some(report.matched as f64 / report.linked as f64);
            report.mean_abs_score_error = Some(error_total / report.linked as f64);
        }

        tracing::info!(
            examined = report.examined,
            linked = report.linked,
            matched = report.matched,
            awaiting_outcome = report.awaiting_outcome,
            samples_recorded = report.samples_recorded,
            "Backtest pass complete"
        );
        Ok(report)
    }
}
