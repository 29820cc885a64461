//! Static base schedule, one list of local departure times per route.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::SourceError;
use crate::config::CorridorRegistry;
use crate::models::RouteId;
use crate::utils::normalize_departure_time;

const DEFAULT_TEMPLATES: &str = include_str!("../../config/templates.json");

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Local departure times for `route` on `date`, ascending. A route
    /// without a schedule yields an empty list.
    async fn departures(&self, route: &RouteId, date: NaiveDate) -> Result<Vec<NaiveTime>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    routes: HashMap<String, RouteTemplate>,
}

#[derive(Debug, Deserialize)]
struct RouteTemplate {
    departures: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateSchedule {
    routes: HashMap<RouteId, Vec<NaiveTime>>,
}

impl TemplateSchedule {
    pub fn load(path: Option<&Path>, registry: &CorridorRegistry) -> Result<Self, SourceError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_json(&raw, registry)
            }
            None => Self::from_json(DEFAULT_TEMPLATES, registry),
        }
    }

    pub fn from_json(raw: &str, registry: &CorridorRegistry) -> Result<Self, SourceError> {
        let file: TemplateFile = serde_json::from_str(raw).map_err(|e| SourceError::Malformed {
            what: "template schedule",
            detail: e.to_string(),
        })?;

        let mut routes = HashMap::with_capacity(file.routes.len());
        for (raw_id, template) in file.routes {
            let id = RouteId::new(&raw_id);
            if registry.route(&id).is_none() {
                return Err(SourceError::Malformed {
                    what: "template schedule",
                    detail: format!("unknown route {raw_id}"),
                });
            }
            let mut times = template
                .departures
                .iter()
                .map(|t| normalize_departure_time(t))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| SourceError::Malformed {
                    what: "template schedule",
                    detail: format!("route {raw_id}: {e}"),
                })?;
            times.sort();
            times.dedup();
            routes.insert(id, times);
        }

        let missing: Vec<&str> = registry
            .routes()
            .iter()
            .filter(|r| !routes.contains_key(&r.id))
            .map(|r| r.id.as_str())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(routes = ?missing, "Routes without a template schedule");
        }

        Ok(Self { routes })
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

#[async_trait]
impl ScheduleSource for TemplateSchedule {
    async fn departures(&self, route: &RouteId, _date: NaiveDate) -> Result<Vec<NaiveTime>, SourceError> {
        Ok(self.routes.get(route).cloned().unwrap_or_default())
    }
}
