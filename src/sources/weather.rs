//! Local weather observations looked up by ZIP code.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use super::SourceError;
use crate::models::weather::WindReading;
use crate::services::cache::TtlCache;
use crate::services::clock::Clock;

/// A provider of current observed wind near a ZIP code.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn observe(&self, zip: &str) -> Result<WindReading, SourceError>;
}

#[derive(Debug, Deserialize)]
struct ObservationBody {
    station: Option<String>,
    observed_at: DateTime<Utc>,
    wind_speed_mph: Option<f64>,
    #[serde(default)]
    wind_gust_mph: Option<f64>,
    #[serde(default)]
    wind_direction_deg: Option<f64>,
}

pub struct ZipObservationClient {
    client: Client,
    base_url: String,
    cache: TtlCache<String, WindReading>,
}

impl ZipObservationClient {
    pub fn new(
        base_url: &str,
        timeout: std::time::Duration,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: TtlCache::new(cache_ttl, clock),
        })
    }

    async fn fetch(&self, zip: &str) -> Result<WindReading, SourceError> {
        let url = format!("{}/observations/{}", self.base_url, zip);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let body: ObservationBody = response.json().await?;
        let speed_mph = body
            .wind_speed_mph
            .ok_or_else(|| SourceError::Malformed {
                what: "observation",
                detail: "wind_speed_mph missing".into(),
            })?;
        if !speed_mph.is_finite() || speed_mph < 0.0 {
            return Err(SourceError::Malformed {
                what: "observation",
                detail: format!("wind_speed_mph {speed_mph}"),
            });
        }

        Ok(WindReading {
            speed_mph,
            gust_mph: body.wind_gust_mph.filter(|g| g.is_finite() && *g >= 0.0),
            direction_deg: body.wind_direction_deg.map(|d| d.rem_euclid(360.0)),
            observed_at: body.observed_at,
            station: body.station.unwrap_or_else(|| format!("zip:{zip}")),
        })
    }
}

#[async_trait]
impl ObservationSource for ZipObservationClient {
    async fn observe(&self, zip: &str) -> Result<WindReading, SourceError> {
        let key = zip.to_string();
        // read without evicting so an expired entry can still serve as fallback
        let cached = self.cache.get_stale(&key);
        if let Some(fresh) = cached.as_ref().filter(|c| c.age < self.cache.ttl()) {
            return Ok(fresh.value.clone());
        }

        match self.fetch(zip).await {
            Ok(reading) => {
                self.cache.insert(key, reading.clone());
                Ok(reading)
            }
            Err(err) => match cached {
                // the reading keeps its own observed_at, so the resolver still ages it honestly
                Some(stale) => {
                    tracing::warn!(zip = %zip, error = %err, cached_age_secs = stale.age.num_seconds(), "ZIP observation refresh failed, serving cached reading");
                    Ok(stale.value)
                }
                None => Err(err),
            },
        }
    }
}
