use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiJson, AppError, Success};
use crate::models::ingest::ForecastCyclePayload;
use crate::models::CorridorId;
use crate::services::risk::{BacktestReport, CorridorForecast, CycleReport};
use crate::services::AppState;

const DEFAULT_DAYS: u32 = 7;

#[derive(Debug, Default, Deserialize)]
pub struct ForecastParams {
    pub days: Option<String>,
}

pub async fn corridor_forecast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ForecastParams>,
) -> Result<Json<Success<CorridorForecast>>, AppError> {
    let days = match params.days.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<u32>()
            .map_err(|_| AppError::invalid("days", format!("days must be 7 or 14, got {raw:?}")))?,
        _ => DEFAULT_DAYS,
    };
    let forecast = state.forecast.corridor_forecast(&CorridorId::new(&id), days).await?;
    Ok(Success::new(forecast))
}

pub async fn run_forecast_cycle(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ForecastCyclePayload>,
) -> Result<Json<Success<CycleReport>>, AppError> {
    if payload.points.is_empty() {
        return Err(AppError::invalid("points", "at least one forecast point is required"));
    }
    Ok(Success::new(state.forecast.run_cycle(payload.points).await?))
}

pub async fn run_backtest(State(state): State<Arc<AppState>>) -> Result<Json<Success<BacktestReport>>, AppError> {
    Ok(Success::new(state.backtester.run().await?))
}
