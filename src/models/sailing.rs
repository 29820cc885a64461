use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::ids::{CorridorId, OperatorId, PortId};
use crate::utils::stable_digest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SailingStatus {
    Scheduled,
    OnTime,
    Delayed,
    Canceled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown sailing status: {0:?}")]
pub struct UnknownStatus(pub String);

impl SailingStatus {
    /// Position in the forward-only status ordering.
    pub fn rank(self) -> u8 {
        match self {
            SailingStatus::Scheduled => 0,
            SailingStatus::OnTime => 1,
            SailingStatus::Delayed => 2,
            SailingStatus::Canceled => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SailingStatus::Scheduled => "scheduled",
            SailingStatus::OnTime => "on_time",
            SailingStatus::Delayed => "delayed",
            SailingStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SailingStatus::Canceled
    }
}

impl fmt::Display for SailingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SailingStatus {
    type Err = UnknownStatus;

    /// Accepts operator spellings: `On Time`, `on-time`, `Cancelled`, ...
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let folded: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();

        match folded.as_str() {
            "scheduled" => Ok(SailingStatus::Scheduled),
            "ontime" => Ok(SailingStatus::OnTime),
            "delayed" | "delay" => Ok(SailingStatus::Delayed),
            "canceled" | "cancelled" | "cancel" => Ok(SailingStatus::Canceled),
            _ => Err(UnknownStatus(raw.to_string())),
        }
    }
}

/// Identity of one scheduled departure.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SailingKey {
    pub corridor_id: CorridorId,
    pub operator_id: OperatorId,
    pub origin: PortId,
    pub destination: PortId,
    pub scheduled_departure_local: NaiveDateTime,
}

impl SailingKey {
    pub fn service_date(&self) -> NaiveDate {
        self.scheduled_departure_local.date()
    }

    /// Stable identifier derived from the natural key.
    pub fn sailing_id(&self) -> String {
        let departure = self
            .scheduled_departure_local
            .format("%Y-%m-%dT%H:%M")
            .to_string();
        stable_digest(&[
            self.corridor_id.as_str(),
            self.operator_id.as_str(),
            self.origin.as_str(),
            self.destination.as_str(),
            &departure,
        ])
    }
}

/// One observation of a sailing's status. Never mutated once recorded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SailingEvent {
    pub id: Uuid,
    pub key: SailingKey,
    pub status: SailingStatus,
    pub reason: Option<String>,
    pub source: String,
    pub observed_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Authoritative latest-known status of a sailing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub key: SailingKey,
    pub status: SailingStatus,
    pub reason: Option<String>,
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

/// Trims a reason and maps blank text to `None`.
pub fn clean_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_spellings() {
        assert_eq!("On Time".parse::<SailingStatus>().unwrap(), SailingStatus::OnTime);
        assert_eq!("on-time".parse::<SailingStatus>().unwrap(), SailingStatus::OnTime);
        assert_eq!("on_time".parse::<SailingStatus>().unwrap(), SailingStatus::OnTime);
        assert_eq!("CANCELLED".parse::<SailingStatus>().unwrap(), SailingStatus::Canceled);
        assert_eq!("Delayed".parse::<SailingStatus>().unwrap(), SailingStatus::Delayed);
        assert!("departed".parse::<SailingStatus>().is_err());
    }

    #[test]
    fn rank_orders_statuses() {
        assert!(SailingStatus::Scheduled.rank() < SailingStatus::OnTime.rank());
        assert!(SailingStatus::OnTime.rank() < SailingStatus::Delayed.rank());
        assert!(SailingStatus::Delayed.rank() < SailingStatus::Canceled.rank());
    }

    #[test]
    fn blank_reasons_are_none() {
        assert_eq!(clean_reason(Some("   ")), None);
        assert_eq!(clean_reason(None), None);
        assert_eq!(clean_reason(Some(" Weather ")), Some("Weather".to_string()));
    }
}
