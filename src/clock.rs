use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Source of time for the capture loop.
///
/// Slot scheduling runs on the monotonic clock; snapshot names come from the
/// wall clock.
pub trait Clock {
    fn now(&self) -> Instant;

    fn wall(&self) -> DateTime<Local>;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn wall(&self) -> DateTime<Local> {
        (**self).wall()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Virtual clock for tests: sleeping advances time instantly.
#[cfg(test)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Local>,
    offset: std::cell::Cell<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        use chrono::TimeZone;

        Self {
            origin: Instant::now(),
            wall_origin: Local
                .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
                .earliest()
                .unwrap(),
            offset: std::cell::Cell::new(Duration::ZERO),
        }
    }

    /// Simulate time spent doing work.
    pub fn advance(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn wall(&self) -> DateTime<Local> {
        self.wall_origin + chrono::Duration::from_std(self.offset.get()).unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
