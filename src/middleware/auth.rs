use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::handlers::AppError;
use crate::services::AppState;

/// Constant-time comparison; only the lengths leak.
pub fn verify_token(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Guards observer-agent writes with the shared bearer secret.
pub async fn require_observer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(secret) = state.observer_secret() else {
        return Err(AppError::Misconfigured(
            "observer secret is not configured; authenticated routes are disabled".into(),
        ));
    };

    match bearer_token(&request) {
        Some(token) if verify_token(token, secret) => Ok(next.run(request).await),
        _ => {
            tracing::warn!(uri = %request.uri(), "Rejected unauthenticated write");
            Err(AppError::Unauthorized)
        }
    }
}
