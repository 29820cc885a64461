use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AppError, Success};
use crate::models::board::BoardScope;
use crate::models::weather::WindContext;
use crate::models::{CorridorId, OperatorId, PortId};
use crate::services::board::{BoardQuery, BoardResponse};
use crate::services::AppState;

/// Query parameters arrive as text so bad values get a field-level error.
#[derive(Debug, Default, Deserialize)]
pub struct BoardParams {
    pub operator: Option<String>,
    pub date: Option<String>,
}

impl BoardParams {
    fn into_query(self, scope: BoardScope) -> Result<BoardQuery, AppError> {
        let date = match self.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| AppError::invalid("date", format!("expected YYYY-MM-DD, got {raw:?}")))?,
            ),
            None => None,
        };
        let operator = self
            .operator
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(OperatorId::new);
        Ok(BoardQuery { scope, date, operator })
    }
}

pub async fn corridor_board(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BoardParams>,
) -> Result<Json<Success<BoardResponse>>, AppError> {
    let query = params.into_query(BoardScope::Corridor(CorridorId::new(&id)))?;
    Ok(Success::new(state.board.build(query).await?))
}

pub async fn terminal_board(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<BoardParams>,
) -> Result<Json<Success<BoardResponse>>, AppError> {
    let query = params.into_query(BoardScope::Terminal(PortId::new(&id)))?;
    Ok(Success::new(state.board.build(query).await?))
}

#[derive(Debug, Serialize)]
pub struct WindResponse {
    pub corridor_id: CorridorId,
    pub weather_context: WindContext,
}

pub async fn corridor_wind(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Success<WindResponse>>, AppError> {
    let corridor_id = CorridorId::new(&id);
    let weather_context = state
        .wind
        .context_for_scope(&BoardScope::Corridor(corridor_id.clone()))
        .await
        .ok_or_else(|| AppError::NotFound(format!("unknown corridor {corridor_id}")))?;
    Ok(Success::new(WindResponse {
        corridor_id,
        weather_context,
    }))
}
