//! Wind authority tier selection and the ZIP observation client.

mod common;

use chrono::Duration;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{registry, start};
use ferrywatch::config::WindThresholds;
use ferrywatch::models::board::BoardScope;
use ferrywatch::models::ingest::ConditionsPayload;
use ferrywatch::models::weather::{AuthorityTier, TierOutcome};
use ferrywatch::models::CorridorId;
use ferrywatch::services::clock::{Clock, ManualClock};
use ferrywatch::services::wind::WindService;
use ferrywatch::sources::{ObservationSource, SourceError, ZipObservationClient};

const TIMEOUT: std::time::Duration = std::time::Duration::from_millis(300);

fn wh_vh() -> BoardScope {
    BoardScope::Corridor(CorridorId::new("wh-vh"))
}

fn conditions(minutes_ago: i64, speed: Option<f64>, text: Option<&str>) -> ConditionsPayload {
    ConditionsPayload {
        source: "ssa-observer".into(),
        terminal: "woods-hole".into(),
        observed_at: start() - Duration::minutes(minutes_ago),
        wind_speed_mph: speed,
        gust_mph: None,
        direction_deg: speed.map(|_| 225.0),
        conditions_text: text.map(str::to_string),
    }
}

fn service(clock: Arc<ManualClock>, observations: Option<Arc<dyn ObservationSource>>) -> WindService {
    WindService::new(
        registry(),
        WindThresholds::default(),
        observations,
        TIMEOUT,
        clock as Arc<dyn Clock>,
    )
}

async fn zip_client(server: &MockServer, clock: Arc<ManualClock>) -> Arc<dyn ObservationSource> {
    Arc::new(
        ZipObservationClient::new(&server.uri(), TIMEOUT, Duration::minutes(10), clock as Arc<dyn Clock>).unwrap(),
    )
}

async fn mount_zip(server: &MockServer, zip: &str, minutes_ago: i64, speed: f64) {
    Mock::given(method("GET"))
        .and(path(format!("/observations/{zip}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "station": format!("KZIP{zip}"),
            "observed_at": (start() - Duration::minutes(minutes_ago)).to_rfc3339(),
            "wind_speed_mph": speed,
            "wind_gust_mph": speed + 8.0,
            "wind_direction_deg": 200.0
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_reading_45_minutes_old_is_operator_live() {
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock, None);
    wind.record_conditions(conditions(45, Some(14.0), None)).unwrap();

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();

    assert_eq!(ctx.authority, AuthorityTier::OperatorLive);
    assert_eq!(ctx.age_minutes, Some(45));
    assert_eq!(ctx.reading.unwrap().speed_mph, 14.0);
}

#[tokio::test]
async fn test_reading_90_minutes_old_is_operator_stale() {
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock, None);
    wind.record_conditions(conditions(90, Some(14.0), None)).unwrap();

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();

    assert_eq!(ctx.authority, AuthorityTier::OperatorStale);
    assert_eq!(ctx.age_minutes, Some(90));
    assert!(ctx
        .tiers_considered
        .iter()
        .any(|a| a.tier == AuthorityTier::OperatorLive && matches!(a.outcome, TierOutcome::TooOld { .. })));
}

#[tokio::test]
async fn test_expired_operator_reading_falls_to_zip() {
    let server = MockServer::start().await;
    mount_zip(&server, "02543", 10, 22.0).await;
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock.clone(), Some(zip_client(&server, clock).await));
    wind.record_conditions(conditions(200, Some(14.0), None)).unwrap();

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();

    assert_eq!(ctx.authority, AuthorityTier::LocalZipObservation);
    let reading = ctx.reading.unwrap();
    assert_eq!(reading.speed_mph, 22.0);
    assert_eq!(reading.station, "KZIP02543");
    assert_eq!(ctx.age_minutes, Some(10));
}

#[tokio::test]
async fn test_fresh_operator_reading_skips_zip_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock.clone(), Some(zip_client(&server, clock).await));
    wind.record_conditions(conditions(5, Some(9.0), None)).unwrap();

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();
    assert_eq!(ctx.authority, AuthorityTier::OperatorLive);
}

#[tokio::test]
async fn test_text_fallback_when_no_reading_or_zip() {
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock, None);
    wind.record_conditions(conditions(30, None, Some("Winds SW 15-20 mph, gusts to 30")))
        .unwrap();

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();

    assert_eq!(ctx.authority, AuthorityTier::OperatorTextFallback);
    let reading = ctx.reading.unwrap();
    assert_eq!(reading.speed_mph, 20.0);
    assert_eq!(reading.gust_mph, Some(30.0));
    assert_eq!(reading.direction_deg, Some(225.0));
}

#[tokio::test]
async fn test_nothing_available_is_labeled_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock.clone(), Some(zip_client(&server, clock).await));

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();

    assert_eq!(ctx.authority, AuthorityTier::Unavailable);
    assert!(ctx.reading.is_none());
    assert!(!ctx.source_label.is_empty());
    assert!(!ctx.explanation.is_empty());
    assert!(ctx
        .tiers_considered
        .iter()
        .any(|a| a.tier == AuthorityTier::LocalZipObservation && matches!(a.outcome, TierOutcome::Failed { .. })));
}

#[tokio::test]
async fn test_older_conditions_never_replace_newer() {
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock, None);
    wind.record_conditions(conditions(10, Some(12.0), None)).unwrap();

    let report = wind.record_conditions(conditions(50, Some(30.0), None)).unwrap();
    assert!(!report.reading_stored);

    let ctx = wind.context_for_scope(&wh_vh()).await.unwrap();
    assert_eq!(ctx.reading.unwrap().speed_mph, 12.0);
}

#[tokio::test]
async fn test_conditions_validation() {
    let clock = Arc::new(ManualClock::new(start()));
    let wind = service(clock, None);

    let mut payload = conditions(0, Some(12.0), None);
    payload.terminal = "atlantis".into();
    assert!(wind.record_conditions(payload).is_err());

    assert!(wind.record_conditions(conditions(0, None, None)).is_err());
    assert!(wind.record_conditions(conditions(0, Some(-3.0), None)).is_err());
}

#[tokio::test]
async fn test_zip_client_parses_observation() {
    let server = MockServer::start().await;
    mount_zip(&server, "02554", 5, 17.0).await;
    let clock = Arc::new(ManualClock::new(start()));
    let client = zip_client(&server, clock).await;

    let reading = client.observe("02554").await.unwrap();

    assert_eq!(reading.speed_mph, 17.0);
    assert_eq!(reading.gust_mph, Some(25.0));
    assert_eq!(reading.direction_deg, Some(200.0));
    assert_eq!(reading.observed_at, start() - Duration::minutes(5));
}

#[tokio::test]
async fn test_zip_client_serves_stale_reading_on_failure() {
    let server = MockServer::start().await;
    mount_zip(&server, "02601", 5, 17.0).await;
    let clock = Arc::new(ManualClock::new(start()));
    let client = zip_client(&server, clock.clone()).await;
    client.observe("02601").await.unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    clock.advance(Duration::minutes(15));

    let reading = client.observe("02601").await.unwrap();
    assert_eq!(reading.speed_mph, 17.0, "Cached reading must be served when refresh fails");
    assert_eq!(reading.observed_at, start() - Duration::minutes(5), "Stale reading keeps its own timestamp");
}

#[tokio::test]
async fn test_zip_client_errors_without_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let clock = Arc::new(ManualClock::new(start()));
    let client = zip_client(&server, clock).await;

    let err = client.observe("99999").await.unwrap_err();
    assert!(matches!(err, SourceError::Status(404)));
}

#[tokio::test]
async fn test_zip_client_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&server)
        .await;
    let clock = Arc::new(ManualClock::new(start()));
    let client = zip_client(&server, clock).await;

    let err = client.observe("02543").await.unwrap_err();
    assert!(matches!(err, SourceError::Http(_)));
}
