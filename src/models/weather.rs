use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::CorridorId;

/// Ranked sources for "current conditions", tried strictly in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityTier {
    OperatorLive,
    OperatorStale,
    LocalZipObservation,
    OperatorTextFallback,
    Unavailable,
}

impl AuthorityTier {
    pub const ORDER: [AuthorityTier; 5] = [
        AuthorityTier::OperatorLive,
        AuthorityTier::OperatorStale,
        AuthorityTier::LocalZipObservation,
        AuthorityTier::OperatorTextFallback,
        AuthorityTier::Unavailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityTier::OperatorLive => "operator_live",
            AuthorityTier::OperatorStale => "operator_stale",
            AuthorityTier::LocalZipObservation => "local_zip_observation",
            AuthorityTier::OperatorTextFallback => "operator_text_fallback",
            AuthorityTier::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AuthorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw wind reading as delivered by one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    pub speed_mph: f64,
    pub gust_mph: Option<f64>,
    /// Direction the wind blows from, degrees true.
    pub direction_deg: Option<f64>,
    pub observed_at: DateTime<Utc>,
    /// Station, terminal or feed that produced the reading.
    pub station: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TierOutcome {
    Selected,
    Missing,
    TooOld { age_minutes: i64 },
    Unparseable,
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: AuthorityTier,
    #[serde(flatten)]
    pub outcome: TierOutcome,
}

/// Resolved current-conditions context. `reading` and `age_minutes` are
/// present for every tier except `unavailable`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindContext {
    pub authority: AuthorityTier,
    pub source_label: String,
    pub explanation: String,
    pub reading: Option<WindReading>,
    pub age_minutes: Option<i64>,
    pub tiers_considered: Vec<TierAttempt>,
}

impl WindContext {
    pub fn selected(
        authority: AuthorityTier,
        reading: WindReading,
        age_minutes: i64,
        source_label: String,
        explanation: String,
        tiers_considered: Vec<TierAttempt>,
    ) -> Self {
        Self {
            authority,
            source_label,
            explanation,
            reading: Some(reading),
            age_minutes: Some(age_minutes),
            tiers_considered,
        }
    }

    pub fn unavailable(explanation: String, tiers_considered: Vec<TierAttempt>) -> Self {
        Self {
            authority: AuthorityTier::Unavailable,
            source_label: "Wind data unavailable".to_string(),
            explanation,
            reading: None,
            age_minutes: None,
            tiers_considered,
        }
    }

    pub fn is_available(&self) -> bool {
        self.authority != AuthorityTier::Unavailable
    }
}

/// Marine advisory in effect for the corridor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryLevel {
    #[default]
    None,
    SmallCraft,
    Gale,
    Storm,
    Hurricane,
}

/// A forecast sample for a corridor at one valid time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub corridor_id: CorridorId,
    pub valid_at: DateTime<Utc>,
    pub wind_speed_mph: Option<f64>,
    pub gust_mph: Option<f64>,
    pub direction_deg: Option<f64>,
    pub wave_height_ft: Option<f64>,
    pub visibility_mi: Option<f64>,
    #[serde(default)]
    pub advisory: AdvisoryLevel,
}

/// 16-point compass rose, 22.5 degrees per point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CompassPoint {
    N,
    Nne,
    Ne,
    Ene,
    E,
    Ese,
    Se,
    Sse,
    S,
    Ssw,
    Sw,
    Wsw,
    W,
    Wnw,
    Nw,
    Nnw,
}

impl CompassPoint {
    pub const ALL: [CompassPoint; 16] = [
        CompassPoint::N,
        CompassPoint::Nne,
        CompassPoint::Ne,
        CompassPoint::Ene,
        CompassPoint::E,
        CompassPoint::Ese,
        CompassPoint::Se,
        CompassPoint::Sse,
        CompassPoint::S,
        CompassPoint::Ssw,
        CompassPoint::Sw,
        CompassPoint::Wsw,
        CompassPoint::W,
        CompassPoint::Wnw,
        CompassPoint::Nw,
        CompassPoint::Nnw,
    ];

    pub fn from_degrees(degrees: f64) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let index = ((normalized / 22.5).round() as usize) % 16;
        Self::ALL[index]
    }

    pub fn degrees(self) -> f64 {
        let index = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        index as f64 * 22.5
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|p| p.as_str() == upper)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompassPoint::N => "N",
            CompassPoint::Nne => "NNE",
            CompassPoint::Ne => "NE",
            CompassPoint::Ene => "ENE",
            CompassPoint::E => "E",
            CompassPoint::Ese => "ESE",
            CompassPoint::Se => "SE",
            CompassPoint::Sse => "SSE",
            CompassPoint::S => "S",
            CompassPoint::Ssw => "SSW",
            CompassPoint::Sw => "SW",
            CompassPoint::Wsw => "WSW",
            CompassPoint::W => "W",
            CompassPoint::Wnw => "WNW",
            CompassPoint::Nw => "NW",
            CompassPoint::Nnw => "NNW",
        }
    }
}
