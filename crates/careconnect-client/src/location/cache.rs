use careconnect_core::Coordinate;
use chrono::{DateTime, Duration, Utc};

/// Default reuse window for an acquired coordinate.
pub const DEFAULT_MAX_AGE_MS: i64 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheEntry {
    coordinate: Coordinate,
    acquired_at: DateTime<Utc>,
}

/// Holds the most recent device coordinate and when it was acquired.
#[derive(Debug, Clone)]
pub struct LocationCache {
    entry: Option<CacheEntry>,
    max_age: Duration,
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_MAX_AGE_MS))
    }
}

impl LocationCache {
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self {
            entry: None,
            max_age,
        }
    }

    /// The cached coordinate, if one exists and is no older than `max_age` at `now`.
    #[must_use]
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<Coordinate> {
        self.entry
            .filter(|entry| now - entry.acquired_at <= self.max_age)
            .map(|entry| entry.coordinate)
    }

    /// True when a coordinate was cached but has aged out.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.entry.is_some() && self.fresh(now).is_none()
    }

    pub fn store(&mut self, coordinate: Coordinate, acquired_at: DateTime<Utc>) {
        self.entry = Some(CacheEntry {
            coordinate,
            acquired_at,
        });
    }
}
