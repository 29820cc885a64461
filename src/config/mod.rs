pub mod corridors;
pub mod database;

use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use corridors::CorridorRegistry;

/// Age thresholds for the wind authority tiers, in minutes.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindThresholds {
    pub live_max_minutes: i64,
    pub stale_max_minutes: i64,
    pub zip_max_minutes: i64,
    pub text_max_minutes: i64,
}

impl Default for WindThresholds {
    fn default() -> Self {
        Self {
            live_max_minutes: 60,
            stale_max_minutes: 180,
            zip_max_minutes: 180,
            text_max_minutes: 180,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    /// Shared bearer secret for the observer agent. Authenticated routes
    /// answer 500 while it is unset.
    pub observer_secret: Option<String>,
    pub json_logs: bool,
    /// IANA zone of the corridors' wall clocks; schedules and service
    /// dates are read in it.
    pub timezone: String,
    pub status_cache_ttl_secs: i64,
    pub ingest_interval_secs: i64,
    pub fetch_timeout_ms: u64,
    pub wind: WindThresholds,
    pub zip_observation_url: Option<String>,
    pub zip_cache_ttl_secs: i64,
    pub corridors_path: Option<PathBuf>,
    pub templates_path: Option<PathBuf>,
    pub model_version: String,
    pub forecast_horizon_days: u32,
    pub ledger_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            observer_secret: None,
            json_logs: false,
            timezone: "America/New_York".to_string(),
            status_cache_ttl_secs: 900,
            ingest_interval_secs: 60,
            fetch_timeout_ms: 3_000,
            wind: WindThresholds::default(),
            zip_observation_url: None,
            zip_cache_ttl_secs: 600,
            corridors_path: None,
            templates_path: None,
            model_version: "heuristic-v2+freq-v1".to_string(),
            forecast_horizon_days: 14,
            ledger_retention_days: 3,
        }
    }
}

impl Config {
    /// Layers defaults, an optional `ferrywatch.toml`, an explicit file and
    /// `FERRYWATCH_*` environment variables (nested keys use `__`).
    pub fn load(explicit_file: Option<&Path>) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("ferrywatch").required(false));

        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("FERRYWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status_cache_ttl_secs <= 0 {
            anyhow::bail!("status_cache_ttl_secs must be positive");
        }
        if self.ingest_interval_secs < 0 {
            anyhow::bail!("ingest_interval_secs must not be negative");
        }
        if self.fetch_timeout_ms == 0 {
            anyhow::bail!("fetch_timeout_ms must be positive");
        }
        if self.wind.live_max_minutes <= 0 || self.wind.live_max_minutes >= self.wind.stale_max_minutes {
            anyhow::bail!(
                "wind thresholds must satisfy 0 < live ({}) < stale ({})",
                self.wind.live_max_minutes,
                self.wind.stale_max_minutes
            );
        }
        if self.wind.zip_max_minutes <= 0 || self.wind.text_max_minutes <= 0 {
            anyhow::bail!("zip and text wind thresholds must be positive");
        }
        if !(1..=14).contains(&self.forecast_horizon_days) {
            anyhow::bail!("forecast_horizon_days must be within 1..=14");
        }
        self.local_zone()?;
        Ok(())
    }

    pub fn local_zone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {e}", self.timezone))
    }
}
