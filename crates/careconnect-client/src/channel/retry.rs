//! Retry with exponential back-off and jitter for opening the realtime channel.
//!
//! Only the initial connect is retried. Once a connection is up, a dropped
//! socket is reported as a `disconnect` event instead.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Longest pause between two connect attempts.
    pub const MAX_DELAY_MS: u64 = 30_000;

    /// A single attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 0,
        }
    }

    /// Pause before retry number `retry` (1-based), before jitter.
    ///
    /// Doubles from `backoff_base_ms` and never exceeds [`Self::MAX_DELAY_MS`].
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(10);
        let ms = self
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(Self::MAX_DELAY_MS);
        Duration::from_millis(ms)
    }
}

/// Spreads `delay` uniformly over ±25 %.
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(rand::random::<f64>() * 0.5 + 0.75)
}

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:** the backend is not listening yet, or the connection was
/// reset or timed out while opening (a cold-starting server).
///
/// **Not retriable:** encoding failures and a closed channel.
pub(crate) fn is_retriable(err: &ChannelError) -> bool {
    match err {
        ChannelError::Io(e) => matches!(
            e.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut
                | ErrorKind::NotConnected
                | ErrorKind::Interrupted
        ),
        ChannelError::Encode { .. } | ChannelError::Closed => false,
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// transient errors.
///
/// Back-off schedule with `backoff_base_ms = 500`:
///
/// | Attempt | Sleep before next attempt   |
/// |---------|-----------------------------|
/// | 1       | 500 ms × 2⁰ ± 25 % jitter   |
/// | 2       | 500 ms × 2¹ ± 25 % jitter   |
/// | 3       | 500 ms × 2² ± 25 % jitter   |
///
/// Delays come from [`RetryPolicy::delay_for`], capped at 30 s. Non-retriable
/// errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ChannelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChannelError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= policy.max_retries {
            return Err(err);
        }
        attempt += 1;
        let delay = jittered(policy.delay_for(attempt));
        tracing::warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "server not reachable, retrying after back-off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn refused() -> ChannelError {
        ChannelError::Io(io::Error::from(ErrorKind::ConnectionRefused))
    }

    fn instant(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base_ms: 0,
        }
    }

    #[test]
    fn delay_doubles_from_the_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 20,
            backoff_base_ms: 500,
        };
        assert_eq!(policy.delay_for(7), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let base = Duration::from_millis(1_000);
        for _ in 0..100 {
            let delay = jittered(base);
            assert!(delay >= Duration::from_millis(750) && delay <= Duration::from_millis(1_250));
        }
    }

    #[test]
    fn refused_connection_is_retriable() {
        assert!(is_retriable(&refused()));
    }

    #[test]
    fn closed_channel_is_not_retriable() {
        assert!(!is_retriable(&ChannelError::Closed));
    }

    #[test]
    fn permission_denied_socket_is_not_retriable() {
        let err = ChannelError::Io(io::Error::from(ErrorKind::PermissionDenied));
        assert!(!is_retriable(&err));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(instant(3), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ChannelError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(instant(3), || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(refused())
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99, "should succeed after retries");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "should have been called 3 times (2 failures + 1 success)"
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(instant(2), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(refused())
            }
        })
        .await;
        assert!(matches!(result, Err(ChannelError::Io(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 try + 2 retries");
    }

    #[tokio::test]
    async fn does_not_retry_closed_channel() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(instant(3), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ChannelError::Closed)
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Closed must not be retried");
        assert!(matches!(result, Err(ChannelError::Closed)));
    }
}
