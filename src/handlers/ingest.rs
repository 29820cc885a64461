use axum::{extract::State, Json};
use std::sync::Arc;

use super::{ApiJson, AppError, Success};
use crate::models::ingest::{ConditionsPayload, IngestPayload, RawBatch};
use crate::services::status::IngestReport;
use crate::services::wind::ConditionsReport;
use crate::services::AppState;

pub async fn ingest_status(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<IngestPayload>,
) -> Result<Json<Success<IngestReport>>, AppError> {
    let report = state.status.ingest(RawBatch::from(payload)).await?;
    Ok(Success::new(report))
}

pub async fn ingest_conditions(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ConditionsPayload>,
) -> Result<Json<Success<ConditionsReport>>, AppError> {
    let report = state.wind.record_conditions(payload)?;
    Ok(Success::new(report))
}
