//! Ownership and recycling of the expensive resource behind a frame source.
//!
//! A [`Lifecycle`] holds at most one live session. Before every capture it
//! decides whether that session is still worth using; if not, the old one is
//! released (best effort) and a new one is acquired through the driver.

use crate::error::CaptureError;
use std::fmt;
use std::time::{Duration, Instant};

/// Source-specific procedures for standing up, using and tearing down a
/// session.
pub trait SessionDriver {
    type Session;

    /// Build a fresh session, including any warm-up.
    fn acquire(&mut self) -> Result<Self::Session, CaptureError>;

    /// Produce one encoded image using a live session.
    fn capture(&mut self, session: &mut Self::Session) -> Result<Vec<u8>, CaptureError>;

    /// Release a session. Failures are logged by the caller and never
    /// propagated.
    fn release(&mut self, session: Self::Session) -> Result<(), CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecyclePolicy {
    /// Sessions are replaced once they reach this age
    pub max_age: Duration,
    /// Sessions are replaced after this many consecutive failed captures
    pub max_failures: u32,
}

impl Default for RecyclePolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(12 * 60 * 60),
            max_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleReason {
    FirstUse,
    Expired,
    TooManyFailures,
    Unusable,
}

impl fmt::Display for RecycleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FirstUse => "first use",
            Self::Expired => "max age reached",
            Self::TooManyFailures => "too many consecutive failures",
            Self::Unusable => "session unusable",
        };
        f.write_str(s)
    }
}

struct Tracked<S> {
    session: S,
    id: u64,
    created: Instant,
    failures: u32,
    unusable: bool,
}

pub struct Lifecycle<D: SessionDriver> {
    label: String,
    driver: D,
    policy: RecyclePolicy,
    current: Option<Tracked<D::Session>>,
    next_id: u64,
}

impl<D: SessionDriver> Lifecycle<D> {
    pub fn new(label: impl Into<String>, driver: D, policy: RecyclePolicy) -> Self {
        Self {
            label: label.into(),
            driver,
            policy,
            current: None,
            next_id: 1,
        }
    }

    /// Why the current session must be replaced before the next capture, if
    /// it must.
    pub fn recycle_reason(&self, now: Instant) -> Option<RecycleReason> {
        let Some(tracked) = self.current.as_ref() else {
            return Some(RecycleReason::FirstUse);
        };

        if tracked.unusable {
            Some(RecycleReason::Unusable)
        } else if tracked.failures >= self.policy.max_failures {
            Some(RecycleReason::TooManyFailures)
        } else if now.saturating_duration_since(tracked.created) >= self.policy.max_age {
            Some(RecycleReason::Expired)
        } else {
            None
        }
    }

    /// Make sure a usable session exists, recycling if the policy says so.
    /// Returns the id of the session the next capture will use.
    pub fn ensure_fresh(&mut self, now: Instant) -> Result<u64, CaptureError> {
        if let Some(reason) = self.recycle_reason(now) {
            if let Some(old) = self.current.take() {
                tracing::info!(
                    source = %self.label,
                    session = old.id,
                    failures = old.failures,
                    "Recycling session: {}",
                    reason
                );
                self.release(old);
            }

            tracing::debug!(source = %self.label, "Acquiring session ({})", reason);
            let session = self.driver.acquire()?;

            let id = self.next_id;
            self.next_id += 1;
            tracing::info!(source = %self.label, session = id, "Session ready");

            self.current = Some(Tracked {
                session,
                id,
                created: now,
                failures: 0,
                unusable: false,
            });
        }

        self.session_id()
            .ok_or_else(|| CaptureError::SessionDead("no session after acquisition".into()))
    }

    /// Capture with the current session and record the outcome against it.
    pub fn capture(&mut self) -> Result<Vec<u8>, CaptureError> {
        let Some(tracked) = self.current.as_mut() else {
            return Err(CaptureError::SessionDead("no active session".into()));
        };

        match self.driver.capture(&mut tracked.session) {
            Ok(bytes) => {
                tracked.failures = 0;
                Ok(bytes)
            }
            Err(e) => {
                tracked.failures += 1;
                if e.forces_recycle() {
                    tracked.unusable = true;
                }
                Err(e)
            }
        }
    }

    /// Release the current session, if any.
    pub fn shutdown(&mut self) {
        if let Some(old) = self.current.take() {
            tracing::info!(source = %self.label, session = old.id, "Releasing session");
            self.release(old);
        }
    }

    pub fn session_id(&self) -> Option<u64> {
        self.current.as_ref().map(|t| t.id)
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.current.as_ref().map_or(0, |t| t.failures)
    }

    #[cfg(test)]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn release(&mut self, old: Tracked<D::Session>) {
        if let Err(e) = self.driver.release(old.session) {
            tracing::warn!(
                source = %self.label,
                session = old.id,
                "Failed to release session: {}",
                e
            );
        }
    }
}

impl<D: SessionDriver> Drop for Lifecycle<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Driver with scripted capture results. Sessions are numbered by
    /// acquisition order.
    #[derive(Default)]
    pub struct ScriptedDriver {
        pub captures: VecDeque<Result<Vec<u8>, CaptureError>>,
        pub acquire_failures: u32,
        pub fail_release: bool,
        pub acquired: u32,
        pub released: Vec<u32>,
        pub captured_with: Vec<u32>,
    }

    impl ScriptedDriver {
        pub fn with_captures(
            captures: impl IntoIterator<Item = Result<Vec<u8>, CaptureError>>,
        ) -> Self {
            Self {
                captures: captures.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl SessionDriver for ScriptedDriver {
        type Session = u32;

        fn acquire(&mut self) -> Result<u32, CaptureError> {
            if self.acquire_failures > 0 {
                self.acquire_failures -= 1;
                return Err(CaptureError::AcquisitionFailed("scripted".into()));
            }
            self.acquired += 1;
            Ok(self.acquired)
        }

        fn capture(&mut self, session: &mut u32) -> Result<Vec<u8>, CaptureError> {
            self.captured_with.push(*session);
            self.captures
                .pop_front()
                .unwrap_or_else(|| Ok(vec![0xAB]))
        }

        fn release(&mut self, session: u32) -> Result<(), CaptureError> {
            self.released.push(session);
            if self.fail_release {
                Err(CaptureError::SessionDead("already gone".into()))
            } else {
                Ok(())
            }
        }
    }
}
