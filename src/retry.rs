//! Retry helpers and cooperative cancellation
//!
//! Two retry flavours are used by the bot:
//! - bounded exponential backoff for JSON-RPC reads and broadcasts
//! - unbounded jittered pacing for campaign HTTP calls, which only stop on
//!   success, a non-transient error, or cancellation

use crate::metrics::metrics;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

/// Marker error produced when a retry loop observes cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry schedule
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// `max_attempts` total attempts, delays doubling from `base_delay` up to `max_delay`
    Bounded {
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
    },
    /// Retry until success, sleeping a uniform random delay in `[min_delay, max_delay]`
    Forever {
        min_delay: Duration,
        max_delay: Duration,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Bounded {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn bounded(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::Bounded {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn forever(min_delay: Duration, max_delay: Duration) -> Self {
        Self::Forever {
            min_delay: min_delay.min(max_delay),
            max_delay: max_delay.max(min_delay),
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::bounded(1, Duration::ZERO, Duration::ZERO)
    }

    /// Iterator over the sleeps between attempts. Exhaustion means give up.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match *self {
            Self::Bounded {
                max_attempts,
                base_delay,
                max_delay,
            } => {
                // from_millis(2) yields 2, 4, 8, ... so factor = base / 2 gives base * 2^n
                let factor = (base_delay.as_millis() as u64 / 2).max(1);
                Box::new(
                    ExponentialBackoff::from_millis(2)
                        .factor(factor)
                        .max_delay(max_delay)
                        .map(jitter_ten_percent)
                        .take(max_attempts.saturating_sub(1) as usize),
                )
            }
            Self::Forever {
                min_delay,
                max_delay,
            } => Box::new(std::iter::repeat_with(move || {
                if min_delay == max_delay {
                    min_delay
                } else {
                    rand::thread_rng().gen_range(min_delay..=max_delay)
                }
            })),
        }
    }
}

/// +/-10% jitter to prevent thundering herd across accounts
fn jitter_ten_percent(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let spread = millis * 0.1;
    if spread < 1.0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(-spread..=spread);
    Duration::from_millis((millis + jitter).max(0.0) as u64)
}

/// Execute an operation with retries according to `policy`.
///
/// Non-retryable errors are returned immediately. Cancellation is checked
/// before every attempt and interrupts the sleep between attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancelSignal,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + From<Cancelled> + Display,
{
    let mut delays = policy.delays();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                debug!(operation = operation_name, attempt, error = %err, "Permanent error, not retrying");
                return Err(err);
            }
            Err(err) => {
                let Some(delay) = delays.next() else {
                    warn!(operation = operation_name, attempt, error = %err, "Retries exhausted");
                    return Err(err);
                };

                metrics()
                    .retries_total
                    .with_label_values(&[operation_name])
                    .inc();
                debug!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient error, retrying"
                );

                if !cancellable_sleep(delay, cancel).await {
                    return Err(Cancelled.into());
                }
            }
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns false on cancellation.
pub async fn cancellable_sleep(duration: Duration, cancel: &CancelSignal) -> bool {
    tokio::select! {
        _ = sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Sending half of the run-wide cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half, cheap to clone into every account task
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // sender dropped without cancelling
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("permanent")]
        Permanent,
        #[error("cancelled")]
        Cancelled,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    #[test]
    fn test_bounded_delays_grow_and_stop() {
        let policy = RetryPolicy::bounded(4, Duration::from_millis(100), Duration::from_secs(10));
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays.len(), 3);
        // 100ms, 200ms, 400ms each within 10%
        assert!(delays[0] >= Duration::from_millis(90) && delays[0] <= Duration::from_millis(110));
        assert!(delays[1] >= Duration::from_millis(180) && delays[1] <= Duration::from_millis(220));
        assert!(delays[2] >= Duration::from_millis(360) && delays[2] <= Duration::from_millis(440));
    }

    #[test]
    fn test_forever_delays_within_bounds() {
        let policy = RetryPolicy::forever(Duration::from_secs(600), Duration::from_secs(800));
        for delay in policy.delays().take(50) {
            assert!(delay >= Duration::from_secs(600) && delay <= Duration::from_secs(800));
        }
    }

    #[test]
    fn test_none_policy_has_no_delays() {
        assert_eq!(RetryPolicy::none().delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy::bounded(5, Duration::from_millis(10), Duration::from_millis(100));

        let result: Result<u32, TestError> =
            retry_with_backoff("test", &policy, &CancelSignal::never(), || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::Transient)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), TestError> =
            retry_with_backoff("test", &RetryPolicy::default(), &CancelSignal::never(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Permanent)
                }
            })
            .await;

        assert!(matches!(result, Err(TestError::Permanent)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retries_exhaust() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy::bounded(3, Duration::from_millis(10), Duration::from_millis(50));

        let result: Result<(), TestError> =
            retry_with_backoff("test", &policy, &CancelSignal::never(), || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Transient)
                }
            })
            .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_forever_retry() {
        let (handle, signal) = cancel_pair();
        let policy = RetryPolicy::forever(Duration::from_secs(600), Duration::from_secs(800));

        let task = tokio::spawn(async move {
            retry_with_backoff::<_, _, (), TestError>("test", &policy, &signal, || async {
                Err(TestError::Transient)
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TestError::Cancelled)));
    }

    #[tokio::test]
    async fn test_never_signal_stays_quiet() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(fired.is_err());
    }
}
