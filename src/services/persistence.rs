//! Forward-only status transitions for sailings.
//!
//! `scheduled → on_time → delayed → canceled`; a status may move forward
//! (skipping steps is allowed) or repeat, never move back. `canceled`
//! absorbs everything. A non-empty reason is never replaced by an empty one.

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::sailing::clean_reason;
use crate::models::{SailingEvent, SailingKey, SailingStatus, StatusRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    /// First observation of this sailing.
    Created(StatusRecord),
    /// Status moved forward.
    Advanced { record: StatusRecord, from: SailingStatus },
    /// Same status observed again; reason may have been filled in.
    Refreshed(StatusRecord),
    /// Incoming status would move backwards and was discarded.
    Rejected { kept: StatusRecord, attempted: SailingStatus },
}

impl GuardDecision {
    pub fn record(&self) -> &StatusRecord {
        match self {
            GuardDecision::Created(record)
            | GuardDecision::Advanced { record, .. }
            | GuardDecision::Refreshed(record) => record,
            GuardDecision::Rejected { kept, .. } => kept,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardDecision::Rejected { .. })
    }
}

pub fn transition_allowed(from: SailingStatus, to: SailingStatus) -> bool {
    if from.is_terminal() {
        return to == from;
    }
    to.rank() >= from.rank()
}

/// Decides what the authoritative record becomes after `event`.
pub fn apply_observation(current: Option<&StatusRecord>, event: &SailingEvent) -> GuardDecision {
    let incoming_reason = clean_reason(event.reason.as_deref());

    let Some(current) = current else {
        return GuardDecision::Created(StatusRecord {
            key: event.key.clone(),
            status: event.status,
            reason: incoming_reason,
            source: event.source.clone(),
            observed_at: event.observed_at,
        });
    };

    if !transition_allowed(current.status, event.status) {
        return GuardDecision::Rejected {
            kept: current.clone(),
            attempted: event.status,
        };
    }

    let existing_reason = clean_reason(current.reason.as_deref());
    if event.status == current.status {
        let record = StatusRecord {
            key: current.key.clone(),
            status: current.status,
            reason: existing_reason.or(incoming_reason),
            source: event.source.clone(),
            observed_at: event.observed_at.max(current.observed_at),
        };
        return GuardDecision::Refreshed(record);
    }

    GuardDecision::Advanced {
        record: StatusRecord {
            key: current.key.clone(),
            status: event.status,
            reason: incoming_reason.or(existing_reason),
            source: event.source.clone(),
            observed_at: event.observed_at,
        },
        from: current.status,
    }
}

/// Latest-known status per sailing, guarded by [`apply_observation`].
#[derive(Default)]
pub struct StatusLedger {
    records: DashMap<SailingKey, StatusRecord>,
}

impl StatusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &SailingEvent) -> GuardDecision {
        let decision = match self.records.entry(event.key.clone()) {
            Entry::Occupied(mut slot) => {
                let decision = apply_observation(Some(slot.get()), event);
                if !decision.is_rejected() {
                    slot.insert(decision.record().clone());
                }
                decision
            }
            Entry::Vacant(slot) => {
                let decision = apply_observation(None, event);
                slot.insert(decision.record().clone());
                decision
            }
        };

        match &decision {
            GuardDecision::Rejected { kept, attempted } => tracing::warn!(
                sailing_id = %event.key.sailing_id(),
                current = %kept.status,
                attempted = %attempted,
                source = %event.source,
                "Rejected backwards status transition"
            ),
            GuardDecision::Advanced { record, from } => tracing::info!(
                sailing_id = %event.key.sailing_id(),
                from = %from,
                to = %record.status,
                reason = record.reason.as_deref().unwrap_or(""),
                "Sailing status advanced"
            ),
            _ => {}
        }

        decision
    }

    pub fn get(&self, key: &SailingKey) -> Option<StatusRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    pub fn canceled_on(&self, date: NaiveDate) -> Vec<StatusRecord> {
        self.records
            .iter()
            .filter(|r| r.key.service_date() == date && r.status == SailingStatus::Canceled)
            .map(|r| r.clone())
            .collect()
    }

    /// Drops records for service dates before `date`.
    pub fn purge_before(&self, date: NaiveDate) -> usize {
        let before = self.records.len();
        self.records.retain(|key, _| key.service_date() >= date);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
