use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{CorridorId, OperatorId};
use super::sailing::{SailingKey, SailingStatus};
use super::weather::AdvisoryLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
    Severe,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => RiskLevel::Low,
            20..=39 => RiskLevel::Moderate,
            40..=59 => RiskLevel::Elevated,
            60..=79 => RiskLevel::High,
            _ => RiskLevel::Severe,
        }
    }

    /// Coarse bucket compared against observed outcomes when backtesting.
    pub fn bucket(self) -> OutcomeBucket {
        match self {
            RiskLevel::Low | RiskLevel::Moderate => OutcomeBucket::Low,
            _ => OutcomeBucket::High,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn demote(self) -> Self {
        match self {
            ConfidenceTier::High => ConfidenceTier::Medium,
            _ => ConfidenceTier::Low,
        }
    }

    /// Tier from the combined historical sample size.
    pub fn from_sample_size(samples: u32) -> Self {
        match samples {
            100.. => ConfidenceTier::High,
            30..=99 => ConfidenceTier::Medium,
            _ => ConfidenceTier::Low,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindRelation {
    Headwind,
    Crosswind,
    Tailwind,
}

/// Wind-speed bands shared by the frequency model and its defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindBin {
    Under15,
    From15To25,
    From25To35,
    From35To45,
    Over45,
}

impl WindBin {
    pub const ALL: [WindBin; 5] = [
        WindBin::Under15,
        WindBin::From15To25,
        WindBin::From25To35,
        WindBin::From35To45,
        WindBin::Over45,
    ];

    pub fn from_mph(speed_mph: f64) -> Self {
        if speed_mph < 15.0 {
            WindBin::Under15
        } else if speed_mph < 25.0 {
            WindBin::From15To25
        } else if speed_mph < 35.0 {
            WindBin::From25To35
        } else if speed_mph < 45.0 {
            WindBin::From35To45
        } else {
            WindBin::Over45
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WindBin::Under15 => "under_15",
            WindBin::From15To25 => "15_25",
            WindBin::From25To35 => "25_35",
            WindBin::From35To45 => "35_45",
            WindBin::Over45 => "over_45",
        }
    }

    /// Benign-weather bin used for the non-weather cancellation baseline.
    pub fn is_benign(self) -> bool {
        self == WindBin::Under15
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub points: i32,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    pub confidence: ConfidenceTier,
    pub wind_relation: Option<WindRelation>,
    pub factors: Vec<RiskFactor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum LikelihoodBasis {
    OperatorHistory,
    CrossOperatorHistory { borrowed_from: OperatorId },
    DefaultBands,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LikelihoodEstimate {
    pub likelihood_to_run_pct: u8,
    pub p_cancel_weather: f64,
    pub p_cancel_mech: f64,
    pub p_cancel_total: f64,
    pub sample_size: u32,
    pub confidence: ConfidenceTier,
    pub wind_bin: WindBin,
    #[serde(flatten)]
    pub basis: LikelihoodBasis,
    pub american_odds: i32,
}

/// Weather inputs a snapshot was computed from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionInputs {
    pub wind_speed_mph: Option<f64>,
    pub gust_mph: Option<f64>,
    pub direction_deg: Option<f64>,
    pub wave_height_ft: Option<f64>,
    pub visibility_mi: Option<f64>,
    pub advisory: AdvisoryLevel,
    pub forecast_valid_at: DateTime<Utc>,
}

/// Immutable record of one risk/likelihood computation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionSnapshot {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub sailing_id: String,
    pub key: SailingKey,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
    pub inputs: PredictionInputs,
    pub risk: RiskAssessment,
    pub likelihood: Option<LikelihoodEstimate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeBucket {
    Low,
    High,
}

impl OutcomeBucket {
    pub fn from_status(status: SailingStatus) -> Self {
        match status {
            SailingStatus::Scheduled | SailingStatus::OnTime => OutcomeBucket::Low,
            SailingStatus::Delayed | SailingStatus::Canceled => OutcomeBucket::High,
        }
    }
}

/// Link between a snapshot and the event that confirmed what happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub event_id: Uuid,
    pub predicted_level: RiskLevel,
    pub predicted_bucket: OutcomeBucket,
    pub observed_status: SailingStatus,
    pub observed_bucket: OutcomeBucket,
    pub matched: bool,
    pub score_error: f64,
    pub recorded_at: DateTime<Utc>,
}

/// One historical sailing outcome under known wind, for the frequency model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSample {
    /// One sample per sailing; later links for the same sailing are ignored.
    pub sailing_id: String,
    pub operator_id: OperatorId,
    pub corridor_id: CorridorId,
    pub wind_speed_mph: f64,
    pub status: SailingStatus,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinCounts {
    pub total: u32,
    pub canceled: u32,
}

impl BinCounts {
    pub fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.canceled as f64 / self.total as f64)
        }
    }
}
