//! Configuration layering and validation.
//!
//! Coverage:
//! - TOML file values override defaults
//! - `FERRYWATCH_*` environment variables override the file, including nested keys
//! - Invalid settings are rejected at load time

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

use ferrywatch::config::Config;

const ENV_KEYS: &[&str] = &[
    "FERRYWATCH_PORT",
    "FERRYWATCH_WIND__LIVE_MAX_MINUTES",
    "FERRYWATCH_OBSERVER_SECRET",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
#[serial]
fn test_file_values_override_defaults() {
    clear_env();
    let file = toml_file(
        r#"
port = 9191
observer_secret = "from-file"
timezone = "America/Chicago"

[wind]
live_max_minutes = 45
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.port, 9191);
    assert_eq!(config.observer_secret.as_deref(), Some("from-file"));
    assert_eq!(config.timezone, "America/Chicago");
    assert_eq!(config.local_zone().unwrap(), chrono_tz::America::Chicago);
    assert_eq!(config.wind.live_max_minutes, 45);
    assert_eq!(config.wind.stale_max_minutes, 180, "Unset nested keys keep their defaults");
    assert_eq!(config.ingest_interval_secs, 60);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let file = toml_file("port = 9191\n");
    std::env::set_var("FERRYWATCH_PORT", "7000");
    std::env::set_var("FERRYWATCH_WIND__LIVE_MAX_MINUTES", "30");

    let config = Config::load(Some(file.path()));
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.port, 7000);
    assert_eq!(config.wind.live_max_minutes, 30);
}

#[test]
#[serial]
fn test_inverted_wind_thresholds_fail_to_load() {
    clear_env();
    let file = toml_file(
        r#"
[wind]
live_max_minutes = 240
stale_max_minutes = 180
"#,
    );

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("wind thresholds"), "got: {err}");
}

#[test]
#[serial]
fn test_forecast_horizon_is_bounded() {
    clear_env();
    let file = toml_file("forecast_horizon_days = 21\n");

    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    assert!(Config::load(Some(&missing)).is_err());
}
