//! Upstream data the service reads but does not own.

pub mod schedule;
pub mod weather;

use thiserror::Error;

pub use schedule::{ScheduleSource, TemplateSchedule};
pub use weather::{ObservationSource, ZipObservationClient};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream answered {0}")]
    Status(u16),
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("failed to read {0}")]
    Io(#[from] std::io::Error),
}
