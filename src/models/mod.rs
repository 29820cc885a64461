pub mod board;
pub mod ids;
pub mod ingest;
pub mod prediction;
pub mod sailing;
pub mod weather;

pub use ids::{CorridorId, OperatorId, PortId, RouteId};
pub use sailing::{SailingEvent, SailingKey, SailingStatus, StatusRecord};
