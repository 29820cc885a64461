use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use super::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after_secs: i64,
}

/// A granted write slot. Dropping it keeps the slot consumed; call
/// [`IngestRateLimiter::release`] to hand it back when the write was not
/// accepted.
#[derive(Debug)]
#[must_use]
pub struct Permit {
    source: String,
    granted_at: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
}

/// One accepted write per source per fixed interval. Excess requests are
/// rejected with a wait time rather than queued.
pub struct IngestRateLimiter {
    last_accepted: DashMap<String, DateTime<Utc>>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl IngestRateLimiter {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            last_accepted: DashMap::new(),
            interval,
            clock,
        }
    }

    pub fn try_acquire(&self, source: &str) -> Result<Permit, RateLimited> {
        let now = self.clock.now();
        match self.last_accepted.entry(source.to_string()) {
            Entry::Occupied(mut slot) => {
                let elapsed = now - *slot.get();
                if elapsed < self.interval {
                    let wait = self.interval - elapsed;
                    // round partial seconds up so a client never retries early
                    let retry_after_secs = (wait.num_milliseconds() + 999) / 1000;
                    return Err(RateLimited {
                        retry_after_secs: retry_after_secs.max(1),
                    });
                }
                let previous = slot.insert(now);
                Ok(Permit {
                    source: source.to_string(),
                    granted_at: now,
                    previous: Some(previous),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                Ok(Permit {
                    source: source.to_string(),
                    granted_at: now,
                    previous: None,
                })
            }
        }
    }

    /// Returns an unused slot, restoring the previous acceptance time.
    /// A slot taken by a later write since the permit was granted is left alone.
    pub fn release(&self, permit: Permit) {
        let Entry::Occupied(mut slot) = self.last_accepted.entry(permit.source) else {
            return;
        };
        if *slot.get() != permit.granted_at {
            return;
        }
        match permit.previous {
            Some(previous) => {
                slot.insert(previous);
            }
            None => {
                slot.remove();
            }
        }
    }
}
