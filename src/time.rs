//! Time keeping for command and data timeouts

use core::cell::Cell;
use cortex_m::peripheral::DWT;
use fugit::{TimerDurationU64, TimerInstantU64};

/// Microsecond instant
pub type Instant = TimerInstantU64<1_000_000>;

/// Microsecond duration
pub type Duration = TimerDurationU64<1_000_000>;

/// A monotonic microsecond clock
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<T: Clock> Clock for &T {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Point in time after which a wait gives up
#[derive(Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Start a deadline `timeout` from now
    pub fn start<C: Clock>(clock: &C, timeout: Duration) -> Self {
        Self {
            start: clock.now(),
            timeout,
        }
    }

    /// Returns true once the timeout has elapsed
    pub fn expired<C: Clock>(&self, clock: &C) -> bool {
        match clock.now().checked_duration_since(self.start) {
            Some(elapsed) => elapsed >= self.timeout,
            // The clock went backwards, which only happens on a wrap
            None => true,
        }
    }
}

/// Busy wait for `duration`
pub fn delay<C: Clock>(clock: &C, duration: Duration) {
    let deadline = Deadline::start(clock, duration);

    while !deadline.expired(clock) {}
}

/// Clock built on the DWT cycle counter
///
/// The counter must already be enabled (`DCB::enable_trace` and
/// `DWT::enable_cycle_counter`). The 32-bit counter is extended in software,
/// so [`Clock::now`] has to be called at least once per counter wrap.
pub struct DwtClock {
    cycles_per_us: u32,
    last: Cell<u32>,
    high: Cell<u64>,
}

impl DwtClock {
    pub fn new(sysclk_hz: u32) -> Self {
        Self {
            cycles_per_us: (sysclk_hz / 1_000_000).max(1),
            last: Cell::new(DWT::cycle_count()),
            high: Cell::new(0),
        }
    }
}

impl Clock for DwtClock {
    fn now(&self) -> Instant {
        let count = DWT::cycle_count();

        if count < self.last.get() {
            self.high.set(self.high.get() + (1 << 32));
        }
        self.last.set(count);

        let cycles = self.high.get() | count as u64;

        Instant::from_ticks(cycles / self.cycles_per_us as u64)
    }
}
