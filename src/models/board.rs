use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CorridorId, OperatorId, PortId};
use super::prediction::{LikelihoodEstimate, RiskAssessment};
use super::sailing::{SailingKey, SailingStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOrigin {
    /// Rows scraped from the operator by the observer agent.
    OperatorLive,
    /// Rows generated from the static base schedule.
    Template,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SailingProvenance {
    pub schedule_source: ScheduleOrigin,
    pub status_overlay_applied: bool,
    pub status_source: Option<String>,
    pub status_observed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskOverlay {
    pub risk: RiskAssessment,
    pub likelihood: Option<LikelihoodEstimate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SailingView {
    pub sailing_id: String,
    pub corridor_id: CorridorId,
    pub operator_id: OperatorId,
    pub origin: PortId,
    pub destination: PortId,
    pub scheduled_departure_local: NaiveDateTime,
    pub scheduled_departure_utc: DateTime<Utc>,
    pub status: SailingStatus,
    pub reason: Option<String>,
    pub provenance: SailingProvenance,
    pub risk: Option<RiskOverlay>,
}

impl SailingView {
    pub fn key(&self) -> SailingKey {
        SailingKey {
            corridor_id: self.corridor_id.clone(),
            operator_id: self.operator_id.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            scheduled_departure_local: self.scheduled_departure_local,
        }
    }

    /// Deduplication key: one row per operator, direction and departure.
    pub fn dedup_key(&self) -> (OperatorId, PortId, PortId, NaiveDateTime) {
        (
            self.operator_id.clone(),
            self.origin.clone(),
            self.destination.clone(),
            self.scheduled_departure_local,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BoardScope {
    Corridor(CorridorId),
    Terminal(PortId),
}

impl BoardScope {
    /// Terminal boards carry both directions: departures and arrivals.
    pub fn contains(&self, key: &SailingKey) -> bool {
        match self {
            BoardScope::Corridor(id) => &key.corridor_id == id,
            BoardScope::Terminal(port) => &key.origin == port || &key.destination == port,
        }
    }

    pub fn label(&self) -> String {
        match self {
            BoardScope::Corridor(id) => format!("corridor:{id}"),
            BoardScope::Terminal(port) => format!("terminal:{port}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardAuthority {
    OperatorOnly,
    TemplateOnly,
    NoSchedule,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok { rows: usize },
    Empty,
    Failed { error: String },
    TimedOut { after_ms: u64 },
}

/// What happened when one upstream source was consulted for a board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub scope: BoardScope,
    pub service_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub authority: BoardAuthority,
    pub authority_note: String,
    pub operator_filter: Option<OperatorId>,
    pub sailings: Vec<SailingView>,
    pub duplicates_dropped: usize,
    pub sources: Vec<SourceReport>,
}
