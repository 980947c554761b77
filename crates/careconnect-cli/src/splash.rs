//! Cold-start notice shown while the first connection is being opened.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use careconnect_client::{Clock, SplashDecision, SystemClock, VisitTracker};
use careconnect_core::AppConfig;

const MESSAGE: &str = "Waking up the server... This won't take long!";
const STEPS: usize = 20;

/// Awaits `connecting`, showing the notice alongside it unless this terminal
/// session saw it recently.
pub async fn while_connecting<F, T>(config: &AppConfig, connecting: F) -> T
where
    F: Future<Output = T>,
{
    let tracker = VisitTracker::new(&config.state_path, session_marker());
    let decision = tracker.check_in(SystemClock.now()).unwrap_or_else(|e| {
        tracing::warn!(path = %tracker.path().display(), error = %e, "could not record visit");
        SplashDecision::Show
    });
    if decision == SplashDecision::Skip {
        return connecting.await;
    }
    let (result, ()) = tokio::join!(connecting, show(config.splash_duration()));
    result
}

async fn show(duration: Duration) {
    eprintln!("{MESSAGE}");
    if duration.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval(duration / u32::try_from(STEPS).unwrap_or(1));
    let mut err = std::io::stderr();
    for step in 0..=STEPS {
        ticker.tick().await;
        let _ = write!(err, "\r{}", progress_bar(step));
        let _ = err.flush();
    }
    let _ = writeln!(err);
}

fn progress_bar(step: usize) -> String {
    let done = step.min(STEPS);
    format!("[{}{}]", "#".repeat(done), " ".repeat(STEPS - done))
}

/// Identifies the terminal session; `CARECONNECT_SESSION` wins when set.
fn session_marker() -> String {
    match std::env::var("CARECONNECT_SESSION") {
        Ok(marker) if !marker.trim().is_empty() => marker,
        _ => default_marker(),
    }
}

#[cfg(unix)]
fn default_marker() -> String {
    format!("ppid-{}", std::os::unix::process::parent_id())
}

#[cfg(not(unix))]
fn default_marker() -> String {
    "local".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_up() {
        assert_eq!(progress_bar(0), format!("[{}]", " ".repeat(STEPS)));
        assert_eq!(progress_bar(STEPS), format!("[{}]", "#".repeat(STEPS)));
        assert_eq!(progress_bar(STEPS + 5), progress_bar(STEPS));
    }

    #[tokio::test(start_paused = true)]
    async fn splash_does_not_delay_past_its_duration() {
        let started = tokio::time::Instant::now();
        show(Duration::from_secs(5)).await;
        assert!(started.elapsed() <= Duration::from_secs(6));
    }
}
