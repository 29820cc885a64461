//! Board assembly for a corridor or terminal.
//!
//! Sources are consulted concurrently and each reports how it fared; a
//! failing or slow source never holds up the others. A board is built from
//! exactly one schedule authority: operator rows when any exist for the
//! scope and date, the template schedule otherwise.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::clock::Clock;
use super::risk::{assess, wind_relation, FrequencyModel, HeuristicInputs, LikelihoodQuery};
use super::status::StatusService;
use super::wind::WindService;
use crate::config::corridors::Route;
use crate::config::CorridorRegistry;
use crate::models::board::{
    Board, BoardAuthority, BoardScope, RiskOverlay, SailingProvenance, SailingView, ScheduleOrigin, SourceOutcome,
    SourceReport,
};
use crate::models::weather::{AdvisoryLevel, AuthorityTier, TierAttempt, TierOutcome, WindContext};
use crate::models::{OperatorId, SailingKey, SailingStatus, StatusRecord};
use crate::sources::ScheduleSource;
use crate::utils::{local_to_utc, local_today};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("unknown {kind} {id}")]
    UnknownScope { kind: &'static str, id: String },
    #[error("unknown operator {0}")]
    UnknownOperator(String),
}

#[derive(Debug, Clone)]
pub struct BoardQuery {
    pub scope: BoardScope,
    pub date: Option<NaiveDate>,
    pub operator: Option<OperatorId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardResponse {
    pub board: Board,
    pub weather_context: WindContext,
}

struct TemplateFetch {
    report: SourceReport,
    rows: Vec<(SailingKey, ScheduleOrigin)>,
}

pub struct BoardService {
    registry: Arc<CorridorRegistry>,
    schedule: Arc<dyn ScheduleSource>,
    status: Arc<StatusService>,
    wind: Arc<WindService>,
    model: Arc<FrequencyModel>,
    clock: Arc<dyn Clock>,
    zone: Tz,
    fetch_timeout: Duration,
}

impl BoardService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<CorridorRegistry>,
        schedule: Arc<dyn ScheduleSource>,
        status: Arc<StatusService>,
        wind: Arc<WindService>,
        model: Arc<FrequencyModel>,
        clock: Arc<dyn Clock>,
        zone: Tz,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            schedule,
            status,
            wind,
            model,
            clock,
            zone,
            fetch_timeout,
        }
    }

    fn routes_in_scope(&self, scope: &BoardScope) -> Result<Vec<&Route>, BoardError> {
        match scope {
            BoardScope::Corridor(id) => {
                if self.registry.corridor(id).is_none() {
                    return Err(BoardError::UnknownScope {
                        kind: "corridor",
                        id: id.to_string(),
                    });
                }
                Ok(self.registry.routes_for_corridor(id))
            }
            BoardScope::Terminal(port) => {
                if self.registry.port(port).is_none() {
                    return Err(BoardError::UnknownScope {
                        kind: "terminal",
                        id: port.to_string(),
                    });
                }
                Ok(self.registry.routes_for_terminal(port))
            }
        }
    }

    async fn fetch_template(&self, route: &Route, date: NaiveDate) -> TemplateFetch {
        let source = format!("template:{}", route.id);
        let outcome = tokio::time::timeout(self.fetch_timeout, self.schedule.departures(&route.id, date)).await;
        match outcome {
            Ok(Ok(times)) if times.is_empty() => TemplateFetch {
                report: SourceReport {
                    source,
                    outcome: SourceOutcome::Empty,
                },
                rows: Vec::new(),
            },
            Ok(Ok(times)) => {
                let rows: Vec<(SailingKey, ScheduleOrigin)> = times
                    .into_iter()
                    .map(|time: NaiveTime| {
                        (
                            SailingKey {
                                corridor_id: route.corridor_id.clone(),
                                operator_id: route.operator_id.clone(),
                                origin: route.origin.clone(),
                                destination: route.destination.clone(),
                                scheduled_departure_local: date.and_time(time),
                            },
                            ScheduleOrigin::Template,
                        )
                    })
                    .collect();
                TemplateFetch {
                    report: SourceReport {
                        source,
                        outcome: SourceOutcome::Ok { rows: rows.len() },
                    },
                    rows,
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(route = %route.id, error = %err, "Template schedule fetch failed");
                TemplateFetch {
                    report: SourceReport {
                        source,
                        outcome: SourceOutcome::Failed { error: err.to_string() },
                    },
                    rows: Vec::new(),
                }
            }
            Err(_) => {
                tracing::warn!(route = %route.id, timeout_ms = self.fetch_timeout.as_millis() as u64, "Template schedule fetch timed out");
                TemplateFetch {
                    report: SourceReport {
                        source,
                        outcome: SourceOutcome::TimedOut {
                            after_ms: self.fetch_timeout.as_millis() as u64,
                        },
                    },
                    rows: Vec::new(),
                }
            }
        }
    }

    async fn fetch_wind(&self, scope: &BoardScope) -> (WindContext, SourceReport) {
        // the resolver bounds each lookup itself; this guards the whole pass
        let budget = self.fetch_timeout * 2;
        match tokio::time::timeout(budget, self.wind.context_for_scope(scope)).await {
            Ok(Some(context)) => {
                let outcome = if context.is_available() {
                    SourceOutcome::Ok { rows: 1 }
                } else {
                    SourceOutcome::Empty
                };
                (
                    context,
                    SourceReport {
                        source: "wind".into(),
                        outcome,
                    },
                )
            }
            Ok(None) => (
                WindContext::unavailable("Scope has no known terminals".into(), Vec::new()),
                SourceReport {
                    source: "wind".into(),
                    outcome: SourceOutcome::Empty,
                },
            ),
            Err(_) => {
                tracing::warn!(scope = %scope.label(), "Wind resolution timed out");
                let trail = AuthorityTier::ORDER[..4]
                    .iter()
                    .map(|tier| TierAttempt {
                        tier: *tier,
                        outcome: TierOutcome::Failed {
                            error: "resolution timed out".into(),
                        },
                    })
                    .collect();
                (
                    WindContext::unavailable(
                        format!("Wind sources did not answer within {} ms", budget.as_millis()),
                        trail,
                    ),
                    SourceReport {
                        source: "wind".into(),
                        outcome: SourceOutcome::TimedOut {
                            after_ms: budget.as_millis() as u64,
                        },
                    },
                )
            }
        }
    }

    pub async fn build(&self, query: BoardQuery) -> Result<BoardResponse, BoardError> {
        let routes = self.routes_in_scope(&query.scope)?;
        if let Some(operator) = &query.operator {
            if self.registry.operator(operator).is_none() {
                return Err(BoardError::UnknownOperator(operator.to_string()));
            }
        }

        let now = self.clock.now();
        let today = local_today(now, self.zone);
        let date = query.date.unwrap_or(today);

        let live = self.status.live_rows(&query.scope, date);
        let (templates, (weather_context, wind_report)) = tokio::join!(
            join_all(routes.iter().map(|route| self.fetch_template(route, date))),
            self.fetch_wind(&query.scope)
        );

        let mut sources: Vec<SourceReport> = Vec::with_capacity(templates.len() + 2);
        sources.push(SourceReport {
            source: "operator_live".into(),
            outcome: if live.is_empty() {
                SourceOutcome::Empty
            } else {
                SourceOutcome::Ok { rows: live.len() }
            },
        });
        let mut template_rows = Vec::new();
        for fetch in templates {
            sources.push(fetch.report);
            template_rows.extend(fetch.rows);
        }
        sources.push(wind_report);

        let (authority, authority_note, mut sailings) = if !live.is_empty() {
            let note = format!(
                "Operator reported {} sailings for {date}; template schedule excluded so the board never mixes schedule sources",
                live.len()
            );
            (BoardAuthority::OperatorOnly, note, self.live_views(live))
        } else if !template_rows.is_empty() {
            let note = format!(
                "No operator-reported sailings for {date}; showing the published template schedule with any known status overlaid"
            );
            (BoardAuthority::TemplateOnly, note, self.template_views(template_rows))
        } else {
            let note = format!("Neither operator reports nor a template schedule list sailings for {date}");
            (BoardAuthority::NoSchedule, note, Vec::new())
        };

        // stable: equal timestamps keep insertion order
        sailings.sort_by_key(|s| s.scheduled_departure_utc);

        let mut seen = HashSet::with_capacity(sailings.len());
        let before_dedup = sailings.len();
        sailings.retain(|s| {
            let fresh = seen.insert(s.dedup_key());
            if !fresh {
                tracing::warn!(
                    operator_id = %s.operator_id,
                    origin = %s.origin,
                    destination = %s.destination,
                    departure = %s.scheduled_departure_local,
                    "Dropped duplicate sailing"
                );
            }
            fresh
        });
        let duplicates_dropped = before_dedup - sailings.len();

        if let Some(operator) = &query.operator {
            let before_filter = sailings.len();
            sailings.retain(|s| &s.operator_id == operator);
            if before_filter > 0 && sailings.is_empty() {
                tracing::error!(
                    severity = "critical",
                    scope = %query.scope.label(),
                    operator_id = %operator,
                    sailings_before_filter = before_filter,
                    "Operator filter removed every sailing"
                );
            }
        }

        self.check_missing_cancellations(&query, date, &sailings);

        if date == today && weather_context.is_available() {
            self.attach_risk(&mut sailings, &weather_context, now).await;
        }

        let board = Board {
            scope: query.scope.clone(),
            service_date: date,
            generated_at: now,
            authority,
            authority_note,
            operator_filter: query.operator.clone(),
            sailings,
            duplicates_dropped,
            sources,
        };

        tracing::info!(
            scope = %query.scope.label(),
            service_date = %date,
            authority = ?board.authority,
            sailings = board.sailings.len(),
            duplicates_dropped,
            wind_authority = %weather_context.authority,
            "Board built"
        );

        Ok(BoardResponse {
            board,
            weather_context,
        })
    }

    fn view(&self, key: SailingKey, origin: ScheduleOrigin, record: Option<StatusRecord>) -> SailingView {
        let scheduled_departure_utc: DateTime<Utc> = local_to_utc(key.scheduled_departure_local, self.zone);
        let (status, reason, provenance) = match record {
            Some(record) => (
                record.status,
                record.reason,
                SailingProvenance {
                    schedule_source: origin,
                    status_overlay_applied: true,
                    status_source: Some(record.source),
                    status_observed_at: Some(record.observed_at),
                },
            ),
            None => (
                SailingStatus::Scheduled,
                None,
                SailingProvenance {
                    schedule_source: origin,
                    status_overlay_applied: false,
                    status_source: None,
                    status_observed_at: None,
                },
            ),
        };
        SailingView {
            sailing_id: key.sailing_id(),
            corridor_id: key.corridor_id,
            operator_id: key.operator_id,
            origin: key.origin,
            destination: key.destination,
            scheduled_departure_local: key.scheduled_departure_local,
            scheduled_departure_utc,
            status,
            reason,
            provenance,
            risk: None,
        }
    }

    fn live_views(&self, live: Vec<StatusRecord>) -> Vec<SailingView> {
        live.into_iter()
            .map(|record| self.view(record.key.clone(), ScheduleOrigin::OperatorLive, Some(record)))
            .collect()
    }

    fn template_views(&self, rows: Vec<(SailingKey, ScheduleOrigin)>) -> Vec<SailingView> {
        rows.into_iter()
            .map(|(key, origin)| {
                let record = self.status.current(&key);
                self.view(key, origin, record)
            })
            .collect()
    }

    /// Canceled sailings the ledger knows about must appear on the board.
    fn check_missing_cancellations(&self, query: &BoardQuery, date: NaiveDate, sailings: &[SailingView]) {
        let present: HashSet<SailingKey> = sailings.iter().map(SailingView::key).collect();
        for record in self.status.canceled_in_scope(&query.scope, date) {
            if query.operator.as_ref().is_some_and(|op| op != &record.key.operator_id) {
                continue;
            }
            if !present.contains(&record.key) {
                tracing::error!(
                    scope = %query.scope.label(),
                    sailing_id = %record.key.sailing_id(),
                    operator_id = %record.key.operator_id,
                    departure = %record.key.scheduled_departure_local,
                    reason = record.reason.as_deref().unwrap_or(""),
                    "Canceled sailing missing from board"
                );
            }
        }
    }

    async fn attach_risk(&self, sailings: &mut [SailingView], context: &WindContext, now: DateTime<Utc>) {
        let Some(reading) = &context.reading else {
            return;
        };
        for sailing in sailings.iter_mut() {
            if sailing.status == SailingStatus::Canceled {
                continue;
            }
            let Some(route) = self
                .registry
                .route_between(&sailing.operator_id, &sailing.origin, &sailing.destination)
            else {
                continue;
            };

            let risk = assess(&HeuristicInputs {
                wind_speed_mph: Some(reading.speed_mph),
                gust_mph: reading.gust_mph,
                direction_deg: reading.direction_deg,
                wave_height_ft: None,
                visibility_mi: None,
                advisory: AdvisoryLevel::None,
                route_bearing_deg: Some(route.bearing_deg),
                exposure: route.exposure.as_ref(),
                horizon: (sailing.scheduled_departure_utc - now).max(chrono::Duration::zero()),
            });

            let query = LikelihoodQuery {
                operator_id: sailing.operator_id.clone(),
                corridor_id: sailing.corridor_id.clone(),
                wind_speed_mph: reading.speed_mph,
                advisory: AdvisoryLevel::None,
                relation: reading.direction_deg.map(|d| wind_relation(d, route.bearing_deg)),
            };
            let likelihood = match self.model.estimate(&query).await {
                Ok(estimate) => Some(estimate),
                Err(err) => {
                    tracing::warn!(sailing_id = %sailing.sailing_id, error = %err, "Likelihood unavailable");
                    None
                }
            };

            sailing.risk = Some(RiskOverlay { risk, likelihood });
        }
    }
}
