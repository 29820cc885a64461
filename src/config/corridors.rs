//! Corridor registry: terminals, operators, routes and their geometry.
//!
//! Loaded once at startup and validated eagerly; a corridor missing bearing
//! data or referencing an unknown terminal stops the process.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::geo::{haversine_km, initial_bearing_deg};
use crate::models::weather::CompassPoint;
use crate::models::{CorridorId, OperatorId, PortId, RouteId};

const DEFAULT_REGISTRY: &str = include_str!("../../config/corridors.json");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("route {route}: unknown terminal {port}")]
    UnknownPort { route: String, port: String },
    #[error("route {route}: unknown operator {operator}")]
    UnknownOperator { route: String, operator: String },
    #[error("route {route}: origin and destination are the same terminal")]
    LoopRoute { route: String },
    #[error("route {route}: bearing {bearing} outside [0, 360)")]
    InvalidBearing { route: String, bearing: f64 },
    #[error("route {route}: length {km:.1} km outside expected [{min}, {max}]")]
    DistanceOutOfRange { route: String, km: f64, min: f64, max: f64 },
    #[error("route {route}: exposure profile missing direction {direction}")]
    IncompleteExposure { route: String, direction: &'static str },
    #[error("route {route}: exposure for {direction} must be within [0, 1], got {value}")]
    InvalidExposure { route: String, direction: &'static str, value: f64 },
    #[error("route {route} belongs to no corridor")]
    OrphanRoute { route: String },
    #[error("corridor {corridor} lacks a route from {origin} to {destination}")]
    MissingDirection { corridor: String, origin: String, destination: String },
    #[error("duplicate {kind} id {id}")]
    Duplicate { kind: &'static str, id: String },
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    ports: Vec<PortSpec>,
    operators: Vec<OperatorSpec>,
    routes: Vec<RouteSpec>,
    corridors: Vec<CorridorSpec>,
}

#[derive(Debug, Deserialize)]
struct PortSpec {
    id: String,
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    observation_zip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperatorSpec {
    id: String,
    name: String,
    #[serde(default)]
    peers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DistanceBounds {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct RouteSpec {
    id: String,
    operator: String,
    origin: String,
    destination: String,
    #[serde(default)]
    bearing_deg: Option<f64>,
    #[serde(default)]
    expected_km: Option<DistanceBounds>,
    #[serde(default)]
    exposure: Option<BTreeMap<CompassPoint, f64>>,
}

#[derive(Debug, Deserialize)]
struct CorridorSpec {
    id: String,
    name: String,
    ports: [String; 2],
}

#[derive(Debug, Clone)]
pub struct Port {
    pub id: PortId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub observation_zip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
    /// Operators whose history may stand in when this one's is thin.
    pub peers: Vec<OperatorId>,
}

/// Open-water ratio per wind-from compass point (1.0 open, 0.0 sheltered).
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureProfile {
    by_direction: BTreeMap<CompassPoint, f64>,
}

impl ExposureProfile {
    pub fn exposure_from(&self, wind_from_deg: f64) -> f64 {
        let point = CompassPoint::from_degrees(wind_from_deg);
        self.by_direction.get(&point).copied().unwrap_or(0.5)
    }
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: RouteId,
    pub operator_id: OperatorId,
    pub corridor_id: CorridorId,
    pub origin: PortId,
    pub destination: PortId,
    pub bearing_deg: f64,
    pub distance_km: f64,
    pub exposure: Option<ExposureProfile>,
}

#[derive(Debug, Clone)]
pub struct Corridor {
    pub id: CorridorId,
    pub name: String,
    pub ports: [PortId; 2],
}

impl Corridor {
    pub fn connects(&self, a: &PortId, b: &PortId) -> bool {
        (&self.ports[0] == a && &self.ports[1] == b) || (&self.ports[0] == b && &self.ports[1] == a)
    }
}

#[derive(Debug, Clone)]
pub struct CorridorRegistry {
    ports: HashMap<PortId, Port>,
    operators: HashMap<OperatorId, Operator>,
    corridors: HashMap<CorridorId, Corridor>,
    routes: Vec<Route>,
}

impl CorridorRegistry {
    /// Loads the registry from `path`, or the built-in Cape & Islands
    /// corridors when no path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self, RegistryError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_json(&raw)
            }
            None => Self::from_json(DEFAULT_REGISTRY),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        Self::build(file)
    }

    fn build(file: RegistryFile) -> Result<Self, RegistryError> {
        let mut ports = HashMap::new();
        for spec in file.ports {
            let id = PortId::new(&spec.id);
            let port = Port {
                id: id.clone(),
                name: spec.name,
                lat: spec.lat,
                lon: spec.lon,
                observation_zip: spec.observation_zip,
            };
            if ports.insert(id.clone(), port).is_some() {
                return Err(RegistryError::Duplicate { kind: "port", id: id.to_string() });
            }
        }

        let mut operators = HashMap::new();
        for spec in file.operators {
            let id = OperatorId::new(&spec.id);
            let operator = Operator {
                id: id.clone(),
                name: spec.name,
                peers: spec.peers.iter().map(|p| OperatorId::new(p)).collect(),
            };
            if operators.insert(id.clone(), operator).is_some() {
                return Err(RegistryError::Duplicate { kind: "operator", id: id.to_string() });
            }
        }

        let mut corridors = HashMap::new();
        for spec in file.corridors {
            let id = CorridorId::new(&spec.id);
            for port in &spec.ports {
                if !ports.contains_key(&PortId::new(port)) {
                    return Err(RegistryError::UnknownPort {
                        route: format!("corridor {}", spec.id),
                        port: port.clone(),
                    });
                }
            }
            let corridor = Corridor {
                id: id.clone(),
                name: spec.name,
                ports: [PortId::new(&spec.ports[0]), PortId::new(&spec.ports[1])],
            };
            if corridors.insert(id.clone(), corridor).is_some() {
                return Err(RegistryError::Duplicate { kind: "corridor", id: id.to_string() });
            }
        }

        let mut routes = Vec::with_capacity(file.routes.len());
        for spec in file.routes {
            routes.push(build_route(spec, &ports, &operators, &corridors)?);
        }

        for corridor in corridors.values() {
            let [a, b] = &corridor.ports;
            for (origin, destination) in [(a, b), (b, a)] {
                let covered = routes.iter().any(|r| {
                    r.corridor_id == corridor.id && &r.origin == origin && &r.destination == destination
                });
                if !covered {
                    return Err(RegistryError::MissingDirection {
                        corridor: corridor.id.to_string(),
                        origin: origin.to_string(),
                        destination: destination.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            ports = ports.len(),
            operators = operators.len(),
            corridors = corridors.len(),
            routes = routes.len(),
            "Corridor registry validated"
        );

        Ok(Self { ports, operators, corridors, routes })
    }

    pub fn port(&self, id: &PortId) -> Option<&Port> {
        self.ports.get(id)
    }

    pub fn operator(&self, id: &OperatorId) -> Option<&Operator> {
        self.operators.get(id)
    }

    pub fn corridor(&self, id: &CorridorId) -> Option<&Corridor> {
        self.corridors.get(id)
    }

    pub fn corridors(&self) -> impl Iterator<Item = &Corridor> {
        self.corridors.values()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, id: &RouteId) -> Option<&Route> {
        self.routes.iter().find(|r| &r.id == id)
    }

    /// Both directions of every operator serving the corridor.
    pub fn routes_for_corridor(&self, corridor: &CorridorId) -> Vec<&Route> {
        self.routes.iter().filter(|r| &r.corridor_id == corridor).collect()
    }

    /// Every route departing from or arriving at the terminal.
    pub fn routes_for_terminal(&self, port: &PortId) -> Vec<&Route> {
        self.routes
            .iter()
            .filter(|r| &r.origin == port || &r.destination == port)
            .collect()
    }

    pub fn route_between(&self, operator: &OperatorId, origin: &PortId, destination: &PortId) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| &r.operator_id == operator && &r.origin == origin && &r.destination == destination)
    }

    pub fn peers(&self, operator: &OperatorId) -> &[OperatorId] {
        self.operators
            .get(operator)
            .map(|o| o.peers.as_slice())
            .unwrap_or(&[])
    }
}

fn build_route(
    spec: RouteSpec,
    ports: &HashMap<PortId, Port>,
    operators: &HashMap<OperatorId, Operator>,
    corridors: &HashMap<CorridorId, Corridor>,
) -> Result<Route, RegistryError> {
    let route_id = spec.id.clone();
    let origin_id = PortId::new(&spec.origin);
    let destination_id = PortId::new(&spec.destination);

    let origin = ports.get(&origin_id).ok_or_else(|| RegistryError::UnknownPort {
        route: route_id.clone(),
        port: spec.origin.clone(),
    })?;
    let destination = ports.get(&destination_id).ok_or_else(|| RegistryError::UnknownPort {
        route: route_id.clone(),
        port: spec.destination.clone(),
    })?;
    if origin_id == destination_id {
        return Err(RegistryError::LoopRoute { route: route_id });
    }

    let operator_id = OperatorId::new(&spec.operator);
    if !operators.contains_key(&operator_id) {
        return Err(RegistryError::UnknownOperator {
            route: route_id,
            operator: spec.operator,
        });
    }

    let bearing_deg = spec
        .bearing_deg
        .unwrap_or_else(|| initial_bearing_deg(origin.lat, origin.lon, destination.lat, destination.lon));
    if !(0.0..360.0).contains(&bearing_deg) || bearing_deg.is_nan() {
        return Err(RegistryError::InvalidBearing { route: route_id, bearing: bearing_deg });
    }

    let distance_km = haversine_km(origin.lat, origin.lon, destination.lat, destination.lon);
    if let Some(bounds) = &spec.expected_km {
        if distance_km < bounds.min || distance_km > bounds.max {
            return Err(RegistryError::DistanceOutOfRange {
                route: route_id,
                km: distance_km,
                min: bounds.min,
                max: bounds.max,
            });
        }
    }

    let exposure = match spec.exposure {
        Some(by_direction) => {
            for direction in CompassPoint::ALL {
                match by_direction.get(&direction) {
                    None => {
                        return Err(RegistryError::IncompleteExposure {
                            route: route_id,
                            direction: direction.as_str(),
                        })
                    }
                    Some(value) if !(0.0..=1.0).contains(value) => {
                        return Err(RegistryError::InvalidExposure {
                            route: route_id,
                            direction: direction.as_str(),
                            value: *value,
                        })
                    }
                    Some(_) => {}
                }
            }
            Some(ExposureProfile { by_direction })
        }
        None => None,
    };

    let corridor_id = corridors
        .values()
        .find(|c| c.connects(&origin_id, &destination_id))
        .map(|c| c.id.clone())
        .ok_or_else(|| RegistryError::OrphanRoute { route: route_id.clone() })?;

    Ok(Route {
        id: RouteId::new(&spec.id),
        operator_id,
        corridor_id,
        origin: origin_id,
        destination: destination_id,
        bearing_deg,
        distance_km,
        exposure,
    })
}
