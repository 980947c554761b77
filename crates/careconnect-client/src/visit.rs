//! Cold-start splash gating.
//!
//! The backend may be asleep on first contact, so the client shows a
//! "waking up the server" splash. It is skipped when the same session has
//! already visited within the last five minutes. Only the session marker
//! and the last-visit time are persisted.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_VISIT_WINDOW_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplashDecision {
    Show,
    Skip,
}

#[derive(Debug, Serialize, Deserialize)]
struct VisitRecord {
    session: String,
    last_visit_ms: i64,
}

#[derive(Debug, Clone)]
pub struct VisitTracker {
    path: PathBuf,
    session: String,
    window: Duration,
}

impl VisitTracker {
    pub fn new(path: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session: session.into(),
            window: Duration::milliseconds(DEFAULT_VISIT_WINDOW_MS),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decides whether to show the splash at `now`, recording the visit when it is shown.
    ///
    /// An unreadable or corrupt record counts as no previous visit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the visit record cannot be written.
    pub fn check_in(&self, now: DateTime<Utc>) -> io::Result<SplashDecision> {
        if let Some(record) = self.load() {
            let visited_this_session = record.session == self.session;
            let since = now.timestamp_millis() - record.last_visit_ms;
            if visited_this_session && since < self.window.num_milliseconds() {
                tracing::debug!(since_ms = since, "recent visit, skipping splash");
                return Ok(SplashDecision::Skip);
            }
        }

        self.store(&VisitRecord {
            session: self.session.clone(),
            last_visit_ms: now.timestamp_millis(),
        })?;
        Ok(SplashDecision::Show)
    }

    fn load(&self) -> Option<VisitRecord> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt visit record");
                None
            }
        }
    }

    fn store(&self, record: &VisitRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let body = serde_json::to_string(record).map_err(io::Error::other)?;
        std::fs::write(&self.path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn first_visit_shows_splash_and_records_it() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VisitTracker::new(dir.path().join("state/last-visit"), "tty1");

        assert_eq!(tracker.check_in(t0()).unwrap(), SplashDecision::Show);
        assert!(tracker.path().exists());
    }

    #[test]
    fn repeat_visit_in_same_session_skips_splash() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VisitTracker::new(dir.path().join("last-visit"), "tty1");

        tracker.check_in(t0()).unwrap();
        let again = tracker.check_in(t0() + Duration::minutes(4)).unwrap();
        assert_eq!(again, SplashDecision::Skip);
    }

    #[test]
    fn visit_after_window_shows_splash_again() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VisitTracker::new(dir.path().join("last-visit"), "tty1");

        tracker.check_in(t0()).unwrap();
        let later = tracker.check_in(t0() + Duration::minutes(5)).unwrap();
        assert_eq!(later, SplashDecision::Show);
    }

    #[test]
    fn skipped_visit_does_not_extend_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = VisitTracker::new(dir.path().join("last-visit"), "tty1");

        tracker.check_in(t0()).unwrap();
        tracker.check_in(t0() + Duration::minutes(3)).unwrap();
        let after = tracker.check_in(t0() + Duration::minutes(6)).unwrap();
        assert_eq!(after, SplashDecision::Show);
    }

    #[test]
    fn custom_window_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let tracker =
            VisitTracker::new(dir.path().join("last-visit"), "tty1").with_window(Duration::seconds(30));

        tracker.check_in(t0()).unwrap();
        let later = tracker.check_in(t0() + Duration::seconds(31)).unwrap();
        assert_eq!(later, SplashDecision::Show);
    }

    #[test]
    fn other_session_shows_splash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last-visit");

        VisitTracker::new(&path, "tty1").check_in(t0()).unwrap();
        let other = VisitTracker::new(&path, "tty2")
            .check_in(t0() + Duration::seconds(10))
            .unwrap();
        assert_eq!(other, SplashDecision::Show);
    }

    #[test]
    fn corrupt_record_counts_as_first_visit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last-visit");
        std::fs::write(&path, "not json").unwrap();

        let tracker = VisitTracker::new(&path, "tty1");
        assert_eq!(tracker.check_in(t0()).unwrap(), SplashDecision::Show);
        assert_eq!(
            tracker.check_in(t0() + Duration::seconds(1)).unwrap(),
            SplashDecision::Skip
        );
    }
}
