//! Reconciles the canonical schedule feed with the reason-enrichment feed.
//!
//! The schedule feed decides which sailings exist and their status; the
//! reason feed may only fill in reasons the schedule feed left blank.

use serde::Serialize;
use std::collections::HashMap;

use crate::models::ingest::{ObservedReason, ObservedRow};
use crate::models::PortId;
use crate::utils::natural_time;

/// `(origin_slug, destination_slug, HH:MM)`
pub type NaturalKey = (PortId, PortId, String);

pub fn natural_key(origin: &PortId, destination: &PortId, departure: chrono::NaiveTime) -> NaturalKey {
    (origin.clone(), destination.clone(), natural_time(departure))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub schedule_rows: usize,
    pub reason_rows: usize,
    pub reasons_applied: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub rows: Vec<ObservedRow>,
    pub stats: MergeStats,
}

pub fn merge_sources(schedule: Vec<ObservedRow>, reasons: &[ObservedReason]) -> MergeOutcome {
    let mut lookup: HashMap<NaturalKey, &str> = HashMap::with_capacity(reasons.len());
    for row in reasons {
        let reason = row.reason.trim();
        if reason.is_empty() {
            continue;
        }
        // first reason seen for a key wins
        lookup
            .entry(natural_key(&row.origin, &row.destination, row.departure_time))
            .or_insert(reason);
    }

    let mut stats = MergeStats {
        schedule_rows: schedule.len(),
        reason_rows: reasons.len(),
        reasons_applied: 0,
    };

    let rows = schedule
        .into_iter()
        .map(|mut row| {
            let has_reason = row.reason.as_deref().is_some_and(|r| !r.trim().is_empty());
            if !has_reason {
                let key = natural_key(&row.origin, &row.destination, row.departure_time);
                if let Some(reason) = lookup.get(&key) {
                    row.reason = Some((*reason).to_string());
                    stats.reasons_applied += 1;
                }
            }
            row
        })
        .collect();

    tracing::debug!(
        schedule_rows = stats.schedule_rows,
        reason_rows = stats.reason_rows,
        reasons_applied = stats.reasons_applied,
        "Merged schedule and reason feeds"
    );

    MergeOutcome { rows, stats }
}
