//! Forecast cycles: one immutable snapshot per templated sailing in the
//! horizon, and the per-corridor forecast view built from them.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::heuristic::{assess, wind_relation, HeuristicInputs};
use super::likelihood::{FrequencyModel, LikelihoodQuery};
use crate::config::CorridorRegistry;
use crate::models::prediction::{LikelihoodEstimate, PredictionInputs, PredictionSnapshot, RiskAssessment};
use crate::models::weather::ForecastPoint;
use crate::models::{CorridorId, OperatorId, PortId, SailingKey};
use crate::repository::{PredictionStore, RepoError};
use crate::services::clock::Clock;
use crate::sources::{ScheduleSource, SourceError};
use crate::utils::{local_to_utc, local_today};

/// A forecast point is only used for sailings this close to its valid time.
const MAX_POINT_DISTANCE_HOURS: i64 = 3;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("unknown corridor {0}")]
    UnknownCorridor(String),
    #[error("days must be 7 or 14, got {0}")]
    InvalidDays(u32),
    #[error("points[{index}].{field}: {message}")]
    InvalidPoint {
        index: usize,
        field: &'static str,
        message: String,
    },
    #[error(transparent)]
    Store(#[from] RepoError),
    #[error(transparent)]
    Schedule(#[from] SourceError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub model_version: String,
    pub points_accepted: usize,
    pub corridors: Vec<CorridorId>,
    pub snapshots_created: usize,
    pub sailings_without_forecast: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSailing {
    pub sailing_id: String,
    pub operator_id: OperatorId,
    pub origin: PortId,
    pub destination: PortId,
    pub scheduled_departure_local: NaiveDateTime,
    pub risk: RiskAssessment,
    pub likelihood: Option<LikelihoodEstimate>,
    pub model_version: String,
    pub cycle_id: Uuid,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub sailings: Vec<ForecastSailing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorridorForecast {
    pub corridor_id: CorridorId,
    pub days_requested: u32,
    pub from: NaiveDate,
    pub days: Vec<ForecastDay>,
}

/// Nearest point to `at`, if any lies within the allowed distance.
pub fn nearest_point<'a>(points: &[&'a ForecastPoint], at: DateTime<Utc>) -> Option<&'a ForecastPoint> {
    points
        .iter()
        .copied()
        .map(|p| ((p.valid_at - at).num_seconds().abs(), p))
        .filter(|(distance, _)| *distance <= MAX_POINT_DISTANCE_HOURS * 3600)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, p)| p)
}

fn check_value(index: usize, field: &'static str, value: Option<f64>, max: f64) -> Result<(), ForecastError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 || v > max => Err(ForecastError::InvalidPoint {
            index,
            field,
            message: format!("{v} is outside [0, {max}]"),
        }),
        _ => Ok(()),
    }
}

pub struct ForecastService {
    registry: Arc<CorridorRegistry>,
    schedule: Arc<dyn ScheduleSource>,
    predictions: Arc<dyn PredictionStore>,
    model: Arc<FrequencyModel>,
    clock: Arc<dyn Clock>,
    zone: Tz,
    model_version: String,
    horizon_days: u32,
}

impl ForecastService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<CorridorRegistry>,
        schedule: Arc<dyn ScheduleSource>,
        predictions: Arc<dyn PredictionStore>,
        model: Arc<FrequencyModel>,
        clock: Arc<dyn Clock>,
        zone: Tz,
        model_version: String,
        horizon_days: u32,
    ) -> Self {
        Self {
            registry,
            schedule,
            predictions,
            model,
            clock,
            zone,
            model_version,
            horizon_days,
        }
    }

    fn validate(&self, points: &[ForecastPoint]) -> Result<(), ForecastError> {
        for (index, point) in points.iter().enumerate() {
            if self.registry.corridor(&point.corridor_id).is_none() {
                return Err(ForecastError::InvalidPoint {
                    index,
                    field: "corridor_id",
                    message: format!("unknown corridor {}", point.corridor_id),
                });
            }
            check_value(index, "wind_speed_mph", point.wind_speed_mph, 250.0)?;
            check_value(index, "gust_mph", point.gust_mph, 250.0)?;
            check_value(index, "direction_deg", point.direction_deg, 360.0)?;
            check_value(index, "wave_height_ft", point.wave_height_ft, 100.0)?;
            check_value(index, "visibility_mi", point.visibility_mi, 100.0)?;
        }
        Ok(())
    }

    /// Computes and stores one snapshot per upcoming templated sailing that
    /// has a forecast point close enough to its departure.
    pub async fn run_cycle(&self, points: Vec<ForecastPoint>) -> Result<CycleReport, ForecastError> {
        self.validate(&points)?;

        let cycle_id = Uuid::new_v4();
        let now = self.clock.now();
        let today = local_today(now, self.zone);

        let mut by_corridor: BTreeMap<CorridorId, Vec<&ForecastPoint>> = BTreeMap::new();
        for point in &points {
            by_corridor.entry(point.corridor_id.clone()).or_default().push(point);
        }

        let mut snapshots = Vec::new();
        let mut without_forecast = 0;

        for (corridor_id, corridor_points) in &by_corridor {
            for route in self.registry.routes_for_corridor(corridor_id) {
                for day in 0..self.horizon_days {
                    let date = today + Duration::days(i64::from(day));
                    for time in self.schedule.departures(&route.id, date).await? {
                        let departure_local = date.and_time(time);
                        let departure_utc = local_to_utc(departure_local, self.zone);
                        if departure_utc <= now {
                            continue;
                        }
                        let Some(point) = nearest_point(corridor_points, departure_utc) else {
                            without_forecast += 1;
                            continue;
                        };

                        let key = SailingKey {
                            corridor_id: corridor_id.clone(),
                            operator_id: route.operator_id.clone(),
                            origin: route.origin.clone(),
                            destination: route.destination.clone(),
                            scheduled_departure_local: departure_local,
                        };
                        let risk = assess(&HeuristicInputs {
                            wind_speed_mph: point.wind_speed_mph,
                            gust_mph: point.gust_mph,
                            direction_deg: point.direction_deg,
                            wave_height_ft: point.wave_height_ft,
                            visibility_mi: point.visibility_mi,
                            advisory: point.advisory,
                            route_bearing_deg: Some(route.bearing_deg),
                            exposure: route.exposure.as_ref(),
                            horizon: departure_utc - now,
                        });
                        let likelihood = match point.wind_speed_mph {
                            Some(wind_speed_mph) => Some(
                                self.model
                                    .estimate(&LikelihoodQuery {
                                        operator_id: route.operator_id.clone(),
                                        corridor_id: corridor_id.clone(),
                                        wind_speed_mph,
                                        advisory: point.advisory,
                                        relation: point.direction_deg.map(|d| wind_relation(d, route.bearing_deg)),
                                    })
                                    .await?,
                            ),
                            None => None,
                        };

                        snapshots.push(PredictionSnapshot {
                            id: Uuid::new_v4(),
                            cycle_id,
                            sailing_id: key.sailing_id(),
                            key,
                            model_version: self.model_version.clone(),
                            created_at: now,
                            inputs: PredictionInputs {
                                wind_speed_mph: point.wind_speed_mph,
                                gust_mph: point.gust_mph,
                                direction_deg: point.direction_deg,
                                wave_height_ft: point.wave_height_ft,
                                visibility_mi: point.visibility_mi,
                                advisory: point.advisory,
                                forecast_valid_at: point.valid_at,
                            },
                            risk,
                            likelihood,
                        });
                    }
                }
            }
        }

        let created = self.predictions.insert_snapshots(&snapshots).await?;
        let report = CycleReport {
            cycle_id,
            model_version: self.model_version.clone(),
            points_accepted: points.len(),
            corridors: by_corridor.into_keys().collect(),
            snapshots_created: created,
            sailings_without_forecast: without_forecast,
        };

        tracing::info!(
            cycle_id = %report.cycle_id,
            model_version = %report.model_version,
            points = report.points_accepted,
            snapshots = report.snapshots_created,
            without_forecast = report.sailings_without_forecast,
            "Forecast cycle complete"
        );
        Ok(report)
    }

    /// Latest snapshot per sailing for the next `days` days, grouped by date.
    pub async fn corridor_forecast(&self, corridor_id: &CorridorId, days: u32) -> Result<CorridorForecast, ForecastError> {
        if self.registry.corridor(corridor_id).is_none() {
            return Err(ForecastError::UnknownCorridor(corridor_id.to_string()));
        }
        if days != 7 && days != 14 {
            return Err(ForecastError::InvalidDays(days));
        }

        let from = local_today(self.clock.now(), self.zone);
        let start = from.and_time(chrono::NaiveTime::MIN);
        let end = start + Duration::days(i64::from(days));
        let snapshots = self.predictions.snapshots_between(corridor_id, start, end).await?;

        let mut latest: HashMap<String, PredictionSnapshot> = HashMap::new();
        for snapshot in snapshots {
            let newer = latest
                .get(&snapshot.sailing_id)
                .map_or(true, |existing| snapshot.created_at >= existing.created_at);
            if newer {
                latest.insert(snapshot.sailing_id.clone(), snapshot);
            }
        }

        let mut grouped: BTreeMap<NaiveDate, Vec<ForecastSailing>> = BTreeMap::new();
        for snapshot in latest.into_values() {
            grouped
                .entry(snapshot.key.service_date())
                .or_default()
                .push(ForecastSailing {
                    sailing_id: snapshot.sailing_id,
                    operator_id: snapshot.key.operator_id,
                    origin: snapshot.key.origin,
                    destination: snapshot.key.destination,
                    scheduled_departure_local: snapshot.key.scheduled_departure_local,
                    risk: snapshot.risk,
                    likelihood: snapshot.likelihood,
                    model_version: snapshot.model_version,
                    cycle_id: snapshot.cycle_id,
                    computed_at: snapshot.created_at,
                });
        }

        let days_out = grouped
            .into_iter()
            .map(|(date, mut sailings)| {
                sailings.sort_by(|a, b| {
                    a.scheduled_departure_local
                        .cmp(&b.scheduled_departure_local)
                        .then_with(|| a.operator_id.cmp(&b.operator_id))
                        .then_with(|| a.origin.cmp(&b.origin))
                });
                ForecastDay { date, sailings }
            })
            .collect();

        Ok(CorridorForecast {
            corridor_id: corridor_id.clone(),
            days_requested: days,
            from,
            days: days_out,
        })
    }
}
