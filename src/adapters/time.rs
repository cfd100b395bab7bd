//! Wall-clock adapters.
//!
//! Reading reference times and stall detection both depend on "now".
//! The core asks a [`Clock`] instead of calling `SystemTime::now()` so
//! host tests can step time by hand.
//!
//! - **`SystemClock`**: the real system clock.
//! - **`ManualClock`**: a shared, manually advanced clock for tests and
//!   capture replay.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current wall-clock time.
pub trait Clock {
    fn now(&self) -> SystemTime;
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock that only moves when told to.  Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<SystemTime>>,
}

impl ManualClock {
    /// Start at `secs` seconds past the Unix epoch.
    pub fn at_secs(secs: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(UNIX_EPOCH + Duration::from_secs(secs))),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: SystemTime) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}
