use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized departure time: {0:?}")]
pub struct TimeParseError(pub String);

/// Lowercases and collapses a terminal/operator name into a slug.
///
/// `"Woods Hole"`, `"woods_hole"` and `" WOODS-HOLE "` all become `woods-hole`.
pub fn normalize_slug(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '_' || ch == '-' || ch == '/' {
            pending_dash = true;
        }
        // other punctuation is dropped
    }

    slug
}

/// Parses the departure time formats seen in operator feeds and templates.
///
/// Accepts 12-hour forms (`6:00 AM`, `6:00am`, `6:00 a.m.`, `6 pm`) and
/// 24-hour forms (`06:00`, `18:30`, `18:30:00`).
pub fn normalize_departure_time(raw: &str) -> Result<NaiveTime, TimeParseError> {
    let err = || TimeParseError(raw.to_string());

    let compact: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect();
    if compact.is_empty() {
        return Err(err());
    }

    let (clock, meridiem) = if let Some(rest) = compact.strip_suffix("am") {
        (rest, Some(false))
    } else if let Some(rest) = compact.strip_suffix("pm") {
        (rest, Some(true))
    } else {
        (compact.as_str(), None)
    };

    let mut parts = clock.split(':');
    let hour: u32 = parts
        .next()
        .filter(|h| !h.is_empty())
        .and_then(|h| h.parse().ok())
        .ok_or_else(err)?;
    let minute: u32 = match parts.next() {
        Some(m) => m.parse().map_err(|_| err())?,
        None => 0,
    };
    // seconds, when present, are ignored but must be numeric
    if let Some(s) = parts.next() {
        s.parse::<u32>().map_err(|_| err())?;
    }
    if parts.next().is_some() {
        return Err(err());
    }

    let hour = match meridiem {
        Some(is_pm) => {
            if !(1..=12).contains(&hour) {
                return Err(err());
            }
            match (hour, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
        None => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(err)
}

/// `HH:MM` rendering used in natural keys.
pub fn natural_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Converts a corridor-local wall-clock time to UTC.
///
/// A time repeated by the autumn change resolves to its first occurrence.
/// A time skipped by the spring change is read with the offset in force
/// just before the gap, so 02:30 becomes 03:30 daylight time.
pub fn local_to_utc(local: NaiveDateTime, zone: Tz) -> DateTime<Utc> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => zone
            .from_local_datetime(&(local - Duration::hours(1)))
            .earliest()
            .map(|before| before.with_timezone(&Utc) + Duration::hours(1))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local)),
    }
}

pub fn utc_to_local(at: DateTime<Utc>, zone: Tz) -> NaiveDateTime {
    at.with_timezone(&zone).naive_local()
}

pub fn local_today(now: DateTime<Utc>, zone: Tz) -> NaiveDate {
    utc_to_local(now, zone).date()
}

/// Re-expresses a wall-clock time from one zone in another.
pub fn rezone(local: NaiveDateTime, from: Tz, to: Tz) -> NaiveDateTime {
    if from == to {
        return local;
    }
    utc_to_local(local_to_utc(local, from), to)
}

/// Short, stable hex digest of a pipe-joined key.
pub fn stable_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
