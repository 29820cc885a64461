//! HTTP contract tests for the observer ingest surface and board reads.
//!
//! Covers:
//! - empty schedule_rows is a 400 regression, never an empty day
//! - bearer auth (401) and missing secret (500 misconfigured)
//! - per-source rate limit with Retry-After
//! - JSON error bodies for parse failures
//! - canceled sailings keep their reason through later "on time" reports

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{harness, row, ssa_batch, Harness, HarnessBuilder, SECRET};
use ferrywatch::config::Config;
use ferrywatch::create_router;

fn post(uri: &str, token: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

fn app(h: &Harness) -> Router {
    create_router(h.state.clone())
}

#[tokio::test]
async fn test_empty_schedule_rows_is_regression_error() {
    let h = harness();
    let app = app(&h);
    let body = ssa_batch(
        "ssa-observer",
        json!([]),
        json!([{"from": "woods-hole", "to": "vineyard-haven", "departure_time_local": "7:00 AM", "reason": "Weather"}]),
    );

    let (status, _, body) = send(&app, post("/api/ingest/status", Some(SECRET), body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("regression_no_schedule_rows"));
    assert_eq!(h.store.event_count(), 0, "Rejected batch must not write events");
}

#[tokio::test]
async fn test_empty_batch_after_recent_write_is_still_regression_error() {
    let h = harness();
    let app = app(&h);
    let first = ssa_batch(
        "ssa-observer",
        json!([row("woods-hole", "vineyard-haven", "07:00", "on_time", None)]),
        json!([]),
    );
    let (status, _, _) = send(&app, post("/api/ingest/status", Some(SECRET), first.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    h.clock.advance(Duration::seconds(10));
    let empty = ssa_batch("ssa-observer", json!([]), json!([]));
    let (status, headers, body) = send(&app, post("/api/ingest/status", Some(SECRET), empty.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST, "Empty batch must not be masked by the rate limit");
    assert_eq!(body["code"], json!("regression_no_schedule_rows"));
    assert!(headers.get(header::RETRY_AFTER).is_none());
    assert_eq!(h.store.event_count(), 1);
}

#[tokio::test]
async fn test_successful_ingest_reports_counts() {
    let h = harness();
    let app = app(&h);
    let body = ssa_batch(
        "ssa-observer",
        json!([
            row("Woods Hole", "Vineyard Haven", "7:00 AM", "Canceled", None),
            row("Vineyard Haven", "Woods Hole", "8:15 AM", "On Time", None),
        ]),
        json!([
            {"from": "woods-hole", "to": "vineyard-haven", "departure_time_local": "07:00", "reason": "Weather"}
        ]),
    );

    let (status, _, body) = send(&app, post("/api/ingest/status", Some(SECRET), body.to_string())).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["ingested"], json!(2));
    assert_eq!(body["persisted"], json!(2));
    assert_eq!(body["schedule_rows_count"], json!(2));
    assert_eq!(body["reason_rows_count"], json!(1));
    assert_eq!(body["reasons_applied"], json!(1));
}

#[tokio::test]
async fn test_missing_bearer_is_unauthorized() {
    let h = harness();
    let app = app(&h);
    let body = ssa_batch("ssa-observer", json!([row("woods-hole", "vineyard-haven", "07:00", "on_time", None)]), json!([]));

    let (status, _, json_body) = send(&app, post("/api/ingest/status", None, body.to_string())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body["code"], json!("unauthorized"));

    let (status, _, _) = send(&app, post("/api/ingest/status", Some("wrong-secret"), body.to_string())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.store.event_count(), 0);
}

#[tokio::test]
async fn test_missing_secret_is_misconfiguration() {
    let h = HarnessBuilder::new()
        .config(Config {
            observer_secret: None,
            ..common::config()
        })
        .build();
    let app = app(&h);
    let body = ssa_batch("ssa-observer", json!([row("woods-hole", "vineyard-haven", "07:00", "on_time", None)]), json!([]));

    let (status, _, json_body) = send(&app, post("/api/ingest/status", Some("anything"), body.to_string())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body["code"], json!("misconfigured"));

    // reads stay open
    let (status, _, _) = send(&app, get("/api/boards/corridor/wh-vh")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_second_write_within_interval_is_rate_limited() {
    let h = harness();
    let app = app(&h);
    let body = ssa_batch("ssa-observer", json!([row("woods-hole", "vineyard-haven", "07:00", "on_time", None)]), json!([]));

    let (status, _, _) = send(&app, post("/api/ingest/status", Some(SECRET), body.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    h.clock.advance(Duration::seconds(20));
    let (status, headers, json_body) = send(&app, post("/api/ingest/status", Some(SECRET), body.to_string())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body["code"], json!("rate_limited"));
    assert_eq!(json_body["retry_after_seconds"], json!(40));
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "40");

    // a different source is limited independently
    let other = ssa_batch("ssa-backup", json!([row("woods-hole", "vineyard-haven", "07:00", "on_time", None)]), json!([]));
    let (status, _, _) = send(&app, post("/api/ingest/status", Some(SECRET), other.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    h.clock.advance(Duration::seconds(41));
    let (status, _, _) = send(&app, post("/api/ingest/status", Some(SECRET), body.to_string())).await;
    assert_eq!(status, StatusCode::OK, "Writes resume once the interval has passed");
}

#[tokio::test]
async fn test_malformed_body_returns_json_error() {
    let h = harness();
    let app = app(&h);

    let (status, _, body) = send(&app, post("/api/ingest/status", Some(SECRET), "{not json".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("invalid_json"));
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

    let (status, _, body) = send(
        &app,
        post("/api/ingest/status", Some(SECRET), json!({"version": "v9"}).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_invalid_row_names_field() {
    let h = harness();
    let app = app(&h);
    let body = ssa_batch(
        "ssa-observer",
        json!([
            row("woods-hole", "vineyard-haven", "07:00", "on_time", None),
            row("woods-hole", "vineyard-haven", "25:99", "on_time", None),
        ]),
        json!([]),
    );

    let (status, _, body) = send(&app, post("/api/ingest/status", Some(SECRET), body.to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_payload"));
    assert_eq!(body["field"], json!("schedule_rows[1].departure_time_local"));
}

#[tokio::test]
async fn test_canceled_with_reason_survives_on_time_report() {
    let h = harness();
    let app = app(&h);

    let first = ssa_batch(
        "ssa-observer",
        json!([row("woods-hole", "vineyard-haven", "07:00", "canceled", Some("Weather"))]),
        json!([]),
    );
    let (status, _, _) = send(&app, post("/api/ingest/status", Some(SECRET), first.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    h.clock.advance(Duration::seconds(61));
    let second = ssa_batch(
        "ssa-observer",
        json!([row("woods-hole", "vineyard-haven", "07:00", "on_time", None)]),
        json!([]),
    );
    let (status, _, body) = send(&app, post("/api/ingest/status", Some(SECRET), second.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transitions_rejected"], json!(1));

    let (status, _, body) = send(&app, get("/api/boards/corridor/wh-vh?date=2026-10-19")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["board"]["authority"], json!("operator_only"));
    let sailing = body["board"]["sailings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["origin"] == json!("woods-hole") && s["scheduled_departure_local"] == json!("2026-10-19T07:00:00"))
        .cloned()
        .unwrap();
    assert_eq!(sailing["status"], json!("canceled"));
    assert_eq!(sailing["reason"], json!("Weather"));
}

#[tokio::test]
async fn test_board_query_validation() {
    let h = harness();
    let app = app(&h);

    let (status, _, body) = send(&app, get("/api/boards/corridor/wh-vh?date=19-10-2026")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], json!("date"));

    let (status, _, body) = send(&app, get("/api/boards/corridor/nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));

    let (status, _, body) = send(&app, get("/api/forecast/wh-vh?days=10")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], json!("days"));

    let (status, _, body) = send(&app, get("/api/forecast/wh-vh?days=14")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days"], json!([]), "No snapshots is an empty but valid forecast");
}

#[tokio::test]
async fn test_conditions_ingest_feeds_wind_endpoint() {
    let h = harness();
    let app = app(&h);
    let conditions = json!({
        "source": "ssa-observer",
        "terminal": "woods-hole",
        "observed_at": common::start().to_rfc3339(),
        "wind_speed_mph": 18.0,
        "direction_deg": 225.0
    });

    let (status, _, body) = send(&app, post("/api/ingest/conditions", Some(SECRET), conditions.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reading_stored"], json!(true));

    let (status, _, body) = send(&app, get("/api/wind/wh-vh")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["weather_context"]["authority"], json!("operator_live"));
    assert_eq!(body["weather_context"]["reading"]["speed_mph"], json!(18.0));
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, _, body) = send(&app(&h), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}
