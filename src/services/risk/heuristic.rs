//! Deterministic 0–100 weather risk score for one sailing.

use chrono::Duration;

use crate::config::corridors::ExposureProfile;
use crate::geo::angular_difference_deg;
use crate::models::prediction::{ConfidenceTier, RiskAssessment, RiskFactor, RiskLevel, WindRelation};
use crate::models::weather::{AdvisoryLevel, CompassPoint};

/// Wind-relation and exposure modifiers only apply above this speed.
const RELATION_MIN_WIND_MPH: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct HeuristicInputs<'a> {
    pub wind_speed_mph: Option<f64>,
    pub gust_mph: Option<f64>,
    /// Direction the wind blows from.
    pub direction_deg: Option<f64>,
    pub wave_height_ft: Option<f64>,
    pub visibility_mi: Option<f64>,
    pub advisory: AdvisoryLevel,
    pub route_bearing_deg: Option<f64>,
    pub exposure: Option<&'a ExposureProfile>,
    /// How far ahead of the sailing the inputs were produced.
    pub horizon: Duration,
}

/// `≤45°` between wind-from and route bearing is a tailwind, `≥135°` a
/// headwind, anything between a crosswind.
pub fn wind_relation(wind_from_deg: f64, route_bearing_deg: f64) -> WindRelation {
    let diff = angular_difference_deg(wind_from_deg, route_bearing_deg);
    if diff <= 45.0 {
        WindRelation::Tailwind
    } else if diff >= 135.0 {
        WindRelation::Headwind
    } else {
        WindRelation::Crosswind
    }
}

pub fn relation_points(relation: WindRelation) -> i32 {
    match relation {
        WindRelation::Headwind => 5,
        WindRelation::Crosswind => 15,
        WindRelation::Tailwind => -5,
    }
}

fn wind_points(mph: f64) -> i32 {
    match mph {
        m if m < 10.0 => 0,
        m if m < 15.0 => 5,
        m if m < 20.0 => 10,
        m if m < 25.0 => 20,
        m if m < 30.0 => 30,
        m if m < 35.0 => 40,
        _ => 50,
    }
}

fn gust_points(mph: f64) -> i32 {
    match mph {
        m if m < 20.0 => 0,
        m if m < 30.0 => 5,
        m if m < 40.0 => 10,
        _ => 20,
    }
}

fn wave_points(ft: f64) -> i32 {
    match ft {
        f if f < 3.0 => 0,
        f if f < 5.0 => 5,
        f if f < 8.0 => 15,
        _ => 25,
    }
}

fn visibility_points(mi: f64) -> i32 {
    match mi {
        v if v < 0.5 => 15,
        v if v < 1.0 => 10,
        v if v < 3.0 => 5,
        _ => 0,
    }
}

pub fn advisory_points(advisory: AdvisoryLevel) -> i32 {
    match advisory {
        AdvisoryLevel::None => 0,
        AdvisoryLevel::SmallCraft => 10,
        AdvisoryLevel::Gale => 20,
        AdvisoryLevel::Storm => 30,
        AdvisoryLevel::Hurricane => 40,
    }
}

/// Open exposure adds up to five points, shelter removes up to five.
fn exposure_points(exposure: f64) -> i32 {
    ((exposure.clamp(0.0, 1.0) - 0.5) * 10.0).round() as i32
}

fn horizon_confidence(horizon: Duration) -> ConfidenceTier {
    if horizon > Duration::days(7) {
        ConfidenceTier::Low
    } else if horizon > Duration::days(3) {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::High
    }
}

pub fn assess(inputs: &HeuristicInputs<'_>) -> RiskAssessment {
    let mut factors = Vec::new();
    let mut push = |name: &str, points: i32, detail: String| {
        if points != 0 {
            factors.push(RiskFactor {
                name: name.to_string(),
                points,
                detail,
            });
        }
    };

    if let Some(wind) = inputs.wind_speed_mph {
        push("wind_speed", wind_points(wind), format!("sustained wind {wind:.0} mph"));
    }
    if let Some(gust) = inputs.gust_mph {
        push("gust", gust_points(gust), format!("gusts {gust:.0} mph"));
    }
    if let Some(wave) = inputs.wave_height_ft {
        push("wave_height", wave_points(wave), format!("waves {wave:.1} ft"));
    }
    if let Some(vis) = inputs.visibility_mi {
        push("visibility", visibility_points(vis), format!("visibility {vis:.1} mi"));
    }
    push(
        "advisory",
        advisory_points(inputs.advisory),
        format!("{:?} advisory in effect", inputs.advisory),
    );

    let mut relation = None;
    let windy = inputs.wind_speed_mph.is_some_and(|w| w > RELATION_MIN_WIND_MPH);
    if let Some(direction) = inputs.direction_deg {
        if let Some(bearing) = inputs.route_bearing_deg {
            let r = wind_relation(direction, bearing);
            relation = Some(r);
            if windy {
                push(
                    "wind_relation",
                    relation_points(r),
                    format!("{r:?} relative to a {bearing:.0}° course"),
                );
            }
        }
        if let (true, Some(profile)) = (windy, inputs.exposure) {
            let exposure = profile.exposure_from(direction);
            push(
                "exposure",
                exposure_points(exposure),
                format!(
                    "route is {:.0}% open to wind from {}",
                    exposure * 100.0,
                    CompassPoint::from_degrees(direction).as_str()
                ),
            );
        }
    }

    let total: i32 = factors.iter().map(|f| f.points).sum();
    let score = total.clamp(0, 100) as u8;

    let mut confidence = horizon_confidence(inputs.horizon);
    if inputs.wind_speed_mph.is_none() {
        confidence = confidence.demote();
    }
    let partial = inputs.gust_mph.is_none()
        || inputs.direction_deg.is_none()
        || inputs.wave_height_ft.is_none()
        || inputs.visibility_mi.is_none();
    if partial {
        confidence = confidence.demote();
    }

    RiskAssessment {
        score,
        level: RiskLevel::from_score(score),
        confidence,
        wind_relation: relation,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(wind: f64, direction: f64) -> HeuristicInputs<'static> {
        HeuristicInputs {
            wind_speed_mph: Some(wind),
            gust_mph: Some(wind + 5.0),
            direction_deg: Some(direction),
            wave_height_ft: Some(2.0),
            visibility_mi: Some(10.0),
            advisory: AdvisoryLevel::None,
            route_bearing_deg: Some(150.0),
            exposure: None,
            horizon: Duration::hours(6),
        }
    }

    #[test]
    fn relation_boundaries() {
        assert_eq!(wind_relation(150.0, 150.0), WindRelation::Tailwind);
        assert_eq!(wind_relation(195.0, 150.0), WindRelation::Tailwind);
        assert_eq!(wind_relation(196.0, 150.0), WindRelation::Crosswind);
        assert_eq!(wind_relation(285.0, 150.0), WindRelation::Headwind);
        assert_eq!(wind_relation(330.0, 150.0), WindRelation::Headwind);
        assert_eq!(wind_relation(60.0, 150.0), WindRelation::Crosswind);
    }

    #[test]
    fn calm_day_is_low() {
        let risk = assess(&full(5.0, 240.0));
        assert_eq!(risk.score, 0);
        assert_eq!(risk.level, RiskLevel::Low);
        assert_eq!(risk.confidence, ConfidenceTier::High);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn relation_modifier_needs_wind_over_ten() {
        let mut inputs = full(10.0, 60.0);
        inputs.gust_mph = Some(12.0);
        let risk = assess(&inputs);
        assert_eq!(risk.wind_relation, Some(WindRelation::Crosswind));
        assert!(risk.factors.iter().all(|f| f.name != "wind_relation"));
    }

    #[test]
    fn crosswind_adds_fifteen() {
        // 22 mph -> 20, gust 27 -> 5, crosswind -> 15
        let risk = assess(&full(22.0, 60.0));
        assert_eq!(risk.score, 40);
        assert_eq!(risk.level, RiskLevel::Elevated);
        let relation = risk.factors.iter().find(|f| f.name == "wind_relation").unwrap();
        assert_eq!(relation.points, 15);
    }

    #[test]
    fn tailwind_subtracts_and_score_floors_at_zero() {
        let mut inputs = full(12.0, 150.0);
        inputs.gust_mph = Some(15.0);
        // 5 for wind, -5 tailwind
        assert_eq!(assess(&inputs).score, 0);
    }

    #[test]
    fn score_caps_at_one_hundred() {
        let mut inputs = full(60.0, 60.0);
        inputs.gust_mph = Some(75.0);
        inputs.wave_height_ft = Some(14.0);
        inputs.visibility_mi = Some(0.2);
        inputs.advisory = AdvisoryLevel::Hurricane;
        let risk = assess(&inputs);
        assert_eq!(risk.score, 100);
        assert_eq!(risk.level, RiskLevel::Severe);
    }

    #[test]
    fn horizon_and_missing_inputs_lower_confidence() {
        let mut inputs = full(5.0, 240.0);
        inputs.horizon = Duration::days(5);
        assert_eq!(assess(&inputs).confidence, ConfidenceTier::Medium);
        inputs.horizon = Duration::days(10);
        assert_eq!(assess(&inputs).confidence, ConfidenceTier::Low);

        let mut sparse = full(5.0, 240.0);
        sparse.wave_height_ft = None;
        assert_eq!(assess(&sparse).confidence, ConfidenceTier::Medium);
        sparse.wind_speed_mph = None;
        assert_eq!(assess(&sparse).confidence, ConfidenceTier::Low);
    }
}
