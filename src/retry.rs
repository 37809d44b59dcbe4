use crate::clock::Clock;
use crate::error::CaptureError;
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added on top of each backoff
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait after the `attempt`-th failure
    /// (1-based): `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Full wait after the `attempt`-th failure, jitter included.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        self.delay_after(attempt) + jitter
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. `op` receives the 1-based attempt number.
pub fn retry<T, C, F>(
    policy: &RetryPolicy,
    clock: &C,
    what: &str,
    mut op: F,
) -> Result<T, CaptureError>
where
    C: Clock,
    F: FnMut(u32) -> Result<T, CaptureError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let wait = policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    kind = e.kind(),
                    "{} failed: {}; retrying in {:.1}s",
                    what,
                    e,
                    wait.as_secs_f64()
                );
                clock.sleep(wait);
                attempt += 1;
            }
        }
    }
}
