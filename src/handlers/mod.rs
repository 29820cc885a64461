pub mod boards;
pub mod forecast;
pub mod ingest;

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::repository::RepoError;
use crate::services::board::BoardError;
use crate::services::risk::ForecastError;
use crate::services::status::IngestError;
use crate::services::wind::ConditionsError;

/// Every failure leaves the API as `{success: false, error, code, ...}`.
#[derive(Debug)]
pub enum AppError {
    Validation {
        code: &'static str,
        message: String,
        field: Option<String>,
    },
    Unauthorized,
    NotFound(String),
    RateLimited {
        message: String,
        retry_after_secs: i64,
    },
    Misconfigured(String),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            code: "invalid_payload",
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation { code, message, field } => {
                let mut body = json!({ "success": false, "error": message, "code": code });
                if let Some(field) = field {
                    body["field"] = json!(field);
                }
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "missing or invalid bearer token", "code": "unauthorized" })),
            )
                .into_response(),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "success": false, "error": message, "code": "not_found" })),
            )
                .into_response(),
            AppError::RateLimited {
                message,
                retry_after_secs,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "success": false,
                        "error": message,
                        "code": "rate_limited",
                        "retry_after_seconds": retry_after_secs,
                    })),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            AppError::Misconfigured(message) => {
                tracing::error!(severity = "critical", error = %message, "Service misconfigured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": message, "code": "misconfigured" })),
                )
                    .into_response()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": err.to_string(), "code": "internal_error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            code: "invalid_json",
            message: rejection.body_text(),
            field: None,
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NoScheduleRows => AppError::Validation {
                code: err.code(),
                message: err.to_string(),
                field: Some("schedule_rows".into()),
            },
            IngestError::Invalid { ref field, .. } => AppError::Validation {
                code: err.code(),
                field: Some(field.clone()),
                message: err.to_string(),
            },
            IngestError::RateLimited { limit, .. } => AppError::RateLimited {
                message: err.to_string(),
                retry_after_secs: limit.retry_after_secs,
            },
            IngestError::Store(store) => AppError::Internal(store.into()),
        }
    }
}

impl From<ConditionsError> for AppError {
    fn from(err: ConditionsError) -> Self {
        match err {
            ConditionsError::Invalid { field, message } => AppError::invalid(field, message),
        }
    }
}

impl From<BoardError> for AppError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::UnknownScope { .. } => AppError::NotFound(err.to_string()),
            BoardError::UnknownOperator(_) => AppError::invalid("operator", err.to_string()),
        }
    }
}

impl From<ForecastError> for AppError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::UnknownCorridor(_) => AppError::NotFound(err.to_string()),
            ForecastError::InvalidDays(_) => AppError::invalid("days", err.to_string()),
            ForecastError::InvalidPoint { index, field, .. } => {
                AppError::invalid(format!("points[{index}].{field}"), err.to_string())
            }
            ForecastError::Store(_) | ForecastError::Schedule(_) => AppError::Internal(err.into()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::Internal(err.into())
    }
}

/// JSON body extractor whose rejections use the API error shape.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Successful responses carry `success: true` beside the payload fields.
#[derive(Serialize)]
pub struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(body: T) -> Json<Self> {
        Json(Self { success: true, body })
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
