use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::PortId;
use super::sailing::SailingStatus;
use super::weather::ForecastPoint;

/// Batch-level metadata sent by the observer agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub source: String,
    pub operator_id: String,
    pub observed_at: DateTime<Utc>,
    pub service_date: NaiveDate,
    pub timezone: String,
}

/// A canonical schedule/status row as scraped, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub from: String,
    pub to: String,
    pub departure_time_local: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A reason-enrichment row from the secondary feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReasonRow {
    pub from: String,
    pub to: String,
    pub departure_time_local: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyPayload {
    #[serde(flatten)]
    pub meta: SourceMeta,
    pub sailings: Vec<ScheduleRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DualSourcePayload {
    pub schedule_rows: Vec<ScheduleRow>,
    #[serde(default)]
    pub reason_rows: Vec<ReasonRow>,
    pub source_meta: SourceMeta,
}

/// Status ingest body, discriminated by its `version` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "snake_case")]
pub enum IngestPayload {
    Legacy(LegacyPayload),
    DualSource(DualSourcePayload),
}

/// Both payload shapes reduced to one form.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBatch {
    /// False for legacy payloads, which never carry an enrichment feed.
    pub dual_source: bool,
    pub meta: SourceMeta,
    pub schedule_rows: Vec<ScheduleRow>,
    pub reason_rows: Vec<ReasonRow>,
}

impl From<IngestPayload> for RawBatch {
    fn from(payload: IngestPayload) -> Self {
        match payload {
            IngestPayload::Legacy(legacy) => RawBatch {
                dual_source: false,
                meta: legacy.meta,
                schedule_rows: legacy.sailings,
                reason_rows: Vec::new(),
            },
            IngestPayload::DualSource(dual) => RawBatch {
                dual_source: true,
                meta: dual.source_meta,
                schedule_rows: dual.schedule_rows,
                reason_rows: dual.reason_rows,
            },
        }
    }
}

/// A schedule row after boundary validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedRow {
    pub origin: PortId,
    pub destination: PortId,
    pub departure_time: NaiveTime,
    pub status: SailingStatus,
    pub reason: Option<String>,
}

/// A reason row after boundary validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedReason {
    pub origin: PortId,
    pub destination: PortId,
    pub departure_time: NaiveTime,
    pub reason: String,
}

/// Operator-reported current conditions for one terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionsPayload {
    pub source: String,
    pub terminal: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub wind_speed_mph: Option<f64>,
    #[serde(default)]
    pub gust_mph: Option<f64>,
    #[serde(default)]
    pub direction_deg: Option<f64>,
    #[serde(default)]
    pub conditions_text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastCyclePayload {
    pub points: Vec<ForecastPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dual_source_payload_parses() {
        let body = json!({
            "version": "dual_source",
            "schedule_rows": [
                {"from": "Woods Hole", "to": "Vineyard Haven", "departure_time_local": "6:00 AM", "status": "On Time"}
            ],
            "source_meta": {
                "source": "ssa-observer",
                "operator_id": "ssa",
                "observed_at": "2026-10-19T10:00:00Z",
                "service_date": "2026-10-19",
                "timezone": "America/New_York"
            }
        });
        let payload: IngestPayload = serde_json::from_value(body).unwrap();
        let batch = RawBatch::from(payload);
        assert_eq!(batch.schedule_rows.len(), 1);
        assert!(batch.reason_rows.is_empty());
        assert_eq!(batch.meta.operator_id, "ssa");
    }

    #[test]
    fn legacy_payload_parses_flat_list() {
        let body = json!({
            "version": "legacy",
            "source": "ssa-observer",
            "operator_id": "ssa",
            "observed_at": "2026-10-19T10:00:00Z",
            "service_date": "2026-10-19",
            "timezone": "America/New_York",
            "sailings": [
                {"from": "woods-hole", "to": "vineyard-haven", "departure_time_local": "07:00", "status": "canceled", "reason": "Weather"}
            ]
        });
        let batch = RawBatch::from(serde_json::from_value::<IngestPayload>(body).unwrap());
        assert_eq!(batch.schedule_rows[0].reason.as_deref(), Some("Weather"));
        assert_eq!(batch.meta.source, "ssa-observer");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let body = json!({"version": "v9", "rows": []});
        assert!(serde_json::from_value::<IngestPayload>(body).is_err());
    }
}
