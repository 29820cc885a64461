//! Wind authority resolution.
//!
//! Picks exactly one "current conditions" reading per board by walking the
//! authority tiers in order. A forecast is never used here, readings are
//! never averaged, and every tier that was looked at is recorded with the
//! reason it was passed over.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use super::cache::TtlCache;
use super::clock::Clock;
use crate::config::{CorridorRegistry, WindThresholds};
use crate::models::board::BoardScope;
use crate::models::ingest::ConditionsPayload;
use crate::models::weather::{AuthorityTier, CompassPoint, TierAttempt, TierOutcome, WindContext, WindReading};
use crate::models::PortId;
use crate::sources::ObservationSource;

const KNOTS_TO_MPH: f64 = 1.150_78;

/// Free-text conditions as published by an operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextObservation {
    pub text: String,
    pub observed_at: DateTime<Utc>,
    pub station: String,
}

/// Everything the resolver may choose from. `zip` is `None` when no lookup
/// was possible and `Some(Err(_))` when the lookup failed.
#[derive(Debug, Clone, Default)]
pub struct WindCandidates {
    pub operator: Option<WindReading>,
    pub zip: Option<Result<WindReading, String>>,
    pub text: Option<TextObservation>,
}

fn age_minutes(observed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    // readings stamped in the future (clock skew) count as brand new
    (now - observed_at).num_minutes().max(0)
}

fn attempt(tier: AuthorityTier, outcome: TierOutcome) -> TierAttempt {
    TierAttempt { tier, outcome }
}

pub fn resolve(candidates: &WindCandidates, now: DateTime<Utc>, thresholds: &WindThresholds) -> WindContext {
    let mut trail = Vec::with_capacity(AuthorityTier::ORDER.len());

    let operator_age = candidates
        .operator
        .as_ref()
        .map(|r| age_minutes(r.observed_at, now));

    // operator_live
    match (&candidates.operator, operator_age) {
        (Some(reading), Some(age)) if age <= thresholds.live_max_minutes => {
            trail.push(attempt(AuthorityTier::OperatorLive, TierOutcome::Selected));
            return WindContext::selected(
                AuthorityTier::OperatorLive,
                reading.clone(),
                age,
                format!("Operator reported at {}", reading.station),
                format!(
                    "Operator reading is {age} min old, inside the {} min live window",
                    thresholds.live_max_minutes
                ),
                trail,
            );
        }
        (Some(_), Some(age)) => trail.push(attempt(
            AuthorityTier::OperatorLive,
            TierOutcome::TooOld { age_minutes: age },
        )),
        _ => trail.push(attempt(AuthorityTier::OperatorLive, TierOutcome::Missing)),
    }

    // operator_stale
    match (&candidates.operator, operator_age) {
        (Some(reading), Some(age)) if age <= thresholds.stale_max_minutes => {
            trail.push(attempt(AuthorityTier::OperatorStale, TierOutcome::Selected));
            return WindContext::selected(
                AuthorityTier::OperatorStale,
                reading.clone(),
                age,
                format!("Operator reported at {}, {age} min ago", reading.station),
                format!(
                    "No operator reading inside {} min; latest is {age} min old, inside the {} min stale window",
                    thresholds.live_max_minutes, thresholds.stale_max_minutes
                ),
                trail,
            );
        }
        (Some(_), Some(age)) => trail.push(attempt(
            AuthorityTier::OperatorStale,
            TierOutcome::TooOld { age_minutes: age },
        )),
        _ => trail.push(attempt(AuthorityTier::OperatorStale, TierOutcome::Missing)),
    }

    // local_zip_observation
    match &candidates.zip {
        Some(Ok(reading)) => {
            let age = age_minutes(reading.observed_at, now);
            if age <= thresholds.zip_max_minutes {
                trail.push(attempt(AuthorityTier::LocalZipObservation, TierOutcome::Selected));
                return WindContext::selected(
                    AuthorityTier::LocalZipObservation,
                    reading.clone(),
                    age,
                    format!("Local observation at {}", reading.station),
                    format!(
                        "No operator reading inside {} min; using nearby observed conditions {age} min old",
                        thresholds.stale_max_minutes
                    ),
                    trail,
                );
            }
            trail.push(attempt(
                AuthorityTier::LocalZipObservation,
                TierOutcome::TooOld { age_minutes: age },
            ));
        }
        Some(Err(error)) => trail.push(attempt(
            AuthorityTier::LocalZipObservation,
            TierOutcome::Failed { error: error.clone() },
        )),
        None => trail.push(attempt(AuthorityTier::LocalZipObservation, TierOutcome::Missing)),
    }

    // operator_text_fallback
    match &candidates.text {
        Some(text) => {
            let age = age_minutes(text.observed_at, now);
            if age > thresholds.text_max_minutes {
                trail.push(attempt(
                    AuthorityTier::OperatorTextFallback,
                    TierOutcome::TooOld { age_minutes: age },
                ));
            } else if let Some(reading) = parse_conditions_text(&text.text, text.observed_at, &text.station) {
                trail.push(attempt(AuthorityTier::OperatorTextFallback, TierOutcome::Selected));
                return WindContext::selected(
                    AuthorityTier::OperatorTextFallback,
                    reading,
                    age,
                    format!("Operator conditions text at {}", text.station),
                    format!("No numeric reading available; parsed from operator text {:?}", text.text),
                    trail,
                );
            } else {
                trail.push(attempt(AuthorityTier::OperatorTextFallback, TierOutcome::Unparseable));
            }
        }
        None => trail.push(attempt(AuthorityTier::OperatorTextFallback, TierOutcome::Missing)),
    }

    WindContext::unavailable(
        "No operator reading, local observation or parseable operator text is available".to_string(),
        trail,
    )
}

/// Splits a token such as `15-20`, `12kts` or `30mph` into its number and
/// any attached unit. Ranges resolve to their upper bound.
fn split_number(token: &str) -> Option<(f64, &str)> {
    let end = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(token.len());
    let (number, unit) = token.split_at(end);
    if number.is_empty() || !number.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let value = number
        .split('-')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?
        .into_iter()
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))?;
    Some((value, unit))
}

fn is_knots(unit: &str) -> bool {
    matches!(unit, "kt" | "kts" | "knot" | "knots")
}

/// Parses operator wording such as `"Winds SW 15-20 mph, gusts to 30"` or
/// `"NE 12 kts"`. Returns `None` when no speed can be found.
pub fn parse_conditions_text(text: &str, observed_at: DateTime<Utc>, station: &str) -> Option<WindReading> {
    let lower = text.to_ascii_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';' || c == '/')
        .map(|t| t.trim_matches(|c: char| c == '.' || c == ':' || c == '(' || c == ')'))
        .filter(|t| !t.is_empty())
        .collect();

    let mut direction = None;
    let mut speed = None;
    let mut gust = None;
    let mut knots = false;
    let mut expect_gust = false;

    for (i, token) in tokens.iter().enumerate() {
        if *token == "calm" {
            speed.get_or_insert(0.0);
            continue;
        }
        if token.starts_with("gust") {
            expect_gust = true;
            continue;
        }
        if is_knots(token) {
            knots = true;
            continue;
        }
        if direction.is_none() {
            if let Some(point) = CompassPoint::parse(token) {
                direction = Some(point.degrees());
                continue;
            }
        }
        // METAR-style gust, e.g. `g30`
        if let Some(rest) = token.strip_prefix('g') {
            if let Some((value, unit)) = split_number(rest) {
                knots |= is_knots(unit);
                gust = Some(value);
                continue;
            }
        }
        if let Some((value, unit)) = split_number(token) {
            if is_knots(unit) || tokens.get(i + 1).is_some_and(|next| is_knots(next)) {
                knots = true;
            }
            if expect_gust {
                gust = Some(value);
                expect_gust = false;
            } else if speed.is_none() {
                speed = Some(value);
            }
        }
    }

    let factor = if knots { KNOTS_TO_MPH } else { 1.0 };
    let speed_mph = speed? * factor;
    Some(WindReading {
        speed_mph,
        gust_mph: gust.map(|g| g * factor),
        direction_deg: direction,
        observed_at,
        station: station.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum ConditionsError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionsReport {
    pub terminal: PortId,
    pub reading_stored: bool,
    pub text_stored: bool,
}

pub struct WindService {
    registry: Arc<CorridorRegistry>,
    thresholds: WindThresholds,
    readings: TtlCache<PortId, WindReading>,
    texts: TtlCache<PortId, TextObservation>,
    observations: Option<Arc<dyn ObservationSource>>,
    fetch_timeout: std::time::Duration,
    clock: Arc<dyn Clock>,
}

impl WindService {
    pub fn new(
        registry: Arc<CorridorRegistry>,
        thresholds: WindThresholds,
        observations: Option<Arc<dyn ObservationSource>>,
        fetch_timeout: std::time::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retention = Duration::minutes(thresholds.stale_max_minutes.max(thresholds.text_max_minutes));
        Self {
            registry,
            readings: TtlCache::new(retention, clock.clone()),
            texts: TtlCache::new(retention, clock.clone()),
            thresholds,
            observations,
            fetch_timeout,
            clock,
        }
    }

    pub fn thresholds(&self) -> &WindThresholds {
        &self.thresholds
    }

    /// Stores an operator-reported reading and/or free text for a terminal.
    /// Older observations never replace newer ones.
    pub fn record_conditions(&self, payload: ConditionsPayload) -> Result<ConditionsReport, ConditionsError> {
        let invalid = |field: &'static str, message: String| ConditionsError::Invalid { field, message };

        if payload.source.trim().is_empty() {
            return Err(invalid("source", "must not be empty".into()));
        }
        let terminal = PortId::new(&payload.terminal);
        if self.registry.port(&terminal).is_none() {
            return Err(invalid("terminal", format!("unknown terminal {:?}", payload.terminal)));
        }
        if let Some(speed) = payload.wind_speed_mph {
            if !speed.is_finite() || !(0.0..=250.0).contains(&speed) {
                return Err(invalid("wind_speed_mph", format!("{speed} is out of range")));
            }
        }
        if let Some(gust) = payload.gust_mph {
            if !gust.is_finite() || !(0.0..=250.0).contains(&gust) {
                return Err(invalid("gust_mph", format!("{gust} is out of range")));
            }
        }
        if let Some(direction) = payload.direction_deg {
            if !direction.is_finite() || !(0.0..=360.0).contains(&direction) {
                return Err(invalid("direction_deg", format!("{direction} is outside [0, 360]")));
            }
        }
        let text = payload
            .conditions_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if payload.wind_speed_mph.is_none() && text.is_none() {
            return Err(invalid(
                "wind_speed_mph",
                "either wind_speed_mph or conditions_text is required".into(),
            ));
        }

        let station = format!("{} ({})", terminal, payload.source.trim());
        let mut report = ConditionsReport {
            terminal: terminal.clone(),
            reading_stored: false,
            text_stored: false,
        };

        if let Some(speed_mph) = payload.wind_speed_mph {
            let newer = self
                .readings
                .get_stale(&terminal)
                .map_or(true, |existing| existing.value.observed_at <= payload.observed_at);
            if newer {
                self.readings.insert(
                    terminal.clone(),
                    WindReading {
                        speed_mph,
                        gust_mph: payload.gust_mph,
                        direction_deg: payload.direction_deg.map(|d| d.rem_euclid(360.0)),
                        observed_at: payload.observed_at,
                        station: station.clone(),
                    },
                );
                report.reading_stored = true;
            }
        }

        if let Some(text) = text {
            let newer = self
                .texts
                .get_stale(&terminal)
                .map_or(true, |existing| existing.value.observed_at <= payload.observed_at);
            if newer {
                self.texts.insert(
                    terminal.clone(),
                    TextObservation {
                        text: text.to_string(),
                        observed_at: payload.observed_at,
                        station,
                    },
                );
                report.text_stored = true;
            }
        }

        tracing::info!(
            terminal = %terminal,
            source = %payload.source,
            reading_stored = report.reading_stored,
            text_stored = report.text_stored,
            "Operator conditions recorded"
        );
        Ok(report)
    }

    /// Resolves the wind context for a board scope. `None` when the scope
    /// names no known corridor or terminal.
    pub async fn context_for_scope(&self, scope: &BoardScope) -> Option<WindContext> {
        let ports: Vec<PortId> = match scope {
            BoardScope::Corridor(id) => self.registry.corridor(id)?.ports.to_vec(),
            BoardScope::Terminal(port) => {
                self.registry.port(port)?;
                vec![port.clone()]
            }
        };
        Some(self.context_for_ports(&ports).await)
    }

    pub async fn context_for_ports(&self, ports: &[PortId]) -> WindContext {
        let now = self.clock.now();

        let operator = ports
            .iter()
            .filter_map(|p| self.readings.get_stale(p).map(|c| c.value))
            .max_by_key(|r| r.observed_at);
        let text = ports
            .iter()
            .filter_map(|p| self.texts.get_stale(p).map(|c| c.value))
            .max_by_key(|t| t.observed_at);

        let operator_usable = operator
            .as_ref()
            .is_some_and(|r| age_minutes(r.observed_at, now) <= self.thresholds.stale_max_minutes);
        let zip = if operator_usable {
            None
        } else {
            self.observe_zip(ports).await
        };

        let context = resolve(&WindCandidates { operator, zip, text }, now, &self.thresholds);
        tracing::debug!(
            ports = ?ports.iter().map(PortId::as_str).collect::<Vec<_>>(),
            authority = %context.authority,
            age_minutes = ?context.age_minutes,
            "Wind authority resolved"
        );
        context
    }

    /// Looks up every port's ZIP concurrently and keeps the freshest reading.
    async fn observe_zip(&self, ports: &[PortId]) -> Option<Result<WindReading, String>> {
        let source = self.observations.as_ref()?;
        let zips: Vec<&str> = ports
            .iter()
            .filter_map(|p| self.registry.port(p))
            .filter_map(|p| p.observation_zip.as_deref())
            .collect();
        if zips.is_empty() {
            return None;
        }

        let lookups = zips.iter().map(|zip| async move {
            match tokio::time::timeout(self.fetch_timeout, source.observe(zip)).await {
                Ok(Ok(reading)) => Ok(reading),
                Ok(Err(err)) => {
                    tracing::warn!(zip = %zip, error = %err, "ZIP observation failed");
                    Err(format!("{zip}: {err}"))
                }
                Err(_) => {
                    tracing::warn!(zip = %zip, timeout_ms = self.fetch_timeout.as_millis() as u64, "ZIP observation timed out");
                    Err(format!("{zip}: timed out after {} ms", self.fetch_timeout.as_millis()))
                }
            }
        });
        let results = join_all(lookups).await;

        let mut errors = Vec::new();
        let mut best: Option<WindReading> = None;
        for result in results {
            match result {
                Ok(reading) => {
                    if best.as_ref().map_or(true, |b| reading.observed_at > b.observed_at) {
                        best = Some(reading);
                    }
                }
                Err(err) => errors.push(err),
            }
        }
        Some(best.ok_or_else(|| errors.join("; ")))
    }

    pub fn housekeeping(&self) -> usize {
        self.readings.purge_expired() + self.texts.purge_expired()
    }
}
