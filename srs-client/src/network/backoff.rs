//! Reconnect backoff
//!
//! Delays start at one audio frame and grow by √2 per failed attempt, capped
//! at one minute.

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use super::constants::{BACKOFF_INITIAL, BACKOFF_MAX};

/// Exponential backoff schedule
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Create a schedule with explicit bounds
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial.min(max),
            attempts: 0,
        }
    }

    /// Delay to wait after the current failure; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.mul_f64(std::f64::consts::SQRT_2).min(self.max);
        self.attempts += 1;
        delay
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.next = self.initial.min(self.max);
        self.attempts = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

/// Run `attempt` until it succeeds or `cancel` fires
///
/// Sleeps according to `backoff` between failures. Returns `None` only on
/// cancellation. The schedule is left where it is on success; the caller
/// resets it once the result has proven itself.
pub async fn retry<T, E, F, Fut>(
    backoff: &mut Backoff,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Option<T>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = attempt() => result,
        };

        match result {
            Ok(value) => return Some(value),
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    "attempt {} failed: {e}; retrying in {delay:?}",
                    backoff.attempts()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn close(a: Duration, b: Duration) -> bool {
        a.abs_diff(b) < Duration::from_micros(10)
    }

    #[test]
    fn test_schedule_grows_by_sqrt2() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_millis(40));
        assert!(close(backoff.next_delay(), Duration::from_secs_f64(0.040 * 2f64.sqrt())));
        assert!(close(backoff.next_delay(), Duration::from_millis(80)));
        assert!(close(backoff.next_delay(), Duration::from_secs_f64(0.080 * 2f64.sqrt())));
        assert!(close(backoff.next_delay(), Duration::from_millis(160)));
    }

    #[test]
    fn test_schedule_is_capped() {
        let mut backoff = Backoff::default();
        let mut last = Duration::ZERO;
        for _ in 0..64 {
            let delay = backoff.next_delay();
            assert!(delay >= last);
            assert!(delay <= BACKOFF_MAX);
            last = delay;
        }
        assert_eq!(last, BACKOFF_MAX);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), BACKOFF_INITIAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_between_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let mut backoff = Backoff::default();
        let start = Instant::now();

        let result = retry(&mut backoff, &cancel, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 3 { Err("refused") } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 40ms + 40√2ms + 80ms
        let expected = Duration::from_secs_f64(0.040 + 0.040 * 2f64.sqrt() + 0.080);
        assert!(start.elapsed() >= expected - Duration::from_millis(1));
        assert!(start.elapsed() < expected + Duration::from_millis(5));
        assert_eq!(backoff.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_single_success() {
        let cancel = CancellationToken::new();
        let mut backoff = Backoff::default();
        let result: Option<u8> =
            retry(&mut backoff, &cancel, || async { Ok::<_, String>(7) }).await;
        assert_eq!(result, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cancelled() {
        let cancel = CancellationToken::new();
        let mut backoff = Backoff::default();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let result: Option<()> =
            retry(&mut backoff, &cancel, || async { Err::<(), _>("refused") }).await;
        assert!(result.is_none());
        assert!(backoff.attempts() > 5);
    }
}
