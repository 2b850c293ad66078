//! Microsecond pulse clock.
//!
//! Both the capture and transmit contexts read the same clock. Handles carry
//! no mutable state, so they can be shared freely without locking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::Error;

/// How close to the deadline `SystemClock` switches from sleeping to spinning.
const SPIN_WINDOW_US: u64 = 300;

/// Longest uninterrupted sleep chunk, so cancellation is observed promptly.
const SLEEP_CHUNK_US: u64 = 5_000;

/// Cooperative cancellation flag, shared between a sleeper and its canceller.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Monotonic microsecond time source with a blocking sleep.
pub trait PulseClock: Send + Sync {
    /// Microseconds since an arbitrary origin. Never decreases.
    fn now_us(&self) -> u64;

    /// Block until `deadline_us`. Returns `false` if `cancel` fired first.
    fn sleep_until(&self, deadline_us: u64, cancel: &CancelToken) -> bool;
}

/// Wall clock backed by the OS monotonic timer.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Probes the monotonic source. A timer that never advances would make
    /// every pulse duration zero, so that is fatal here rather than later.
    pub fn new() -> Result<Self, Error> {
        let origin = Instant::now();
        let mut spins: u32 = 0;
        while Instant::now() == origin {
            spins += 1;
            if spins > 10_000_000 {
                return Err(Error::ClockUnavailable);
            }
        }
        Ok(SystemClock { origin })
    }
}

impl PulseClock for SystemClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep_until(&self, deadline_us: u64, cancel: &CancelToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = self.now_us();
            if now >= deadline_us {
                return true;
            }
            let remaining = deadline_us - now;
            if remaining > SPIN_WINDOW_US {
                let chunk = (remaining - SPIN_WINDOW_US).min(SLEEP_CHUNK_US);
                thread::sleep(Duration::from_micros(chunk));
            } else {
                // Sub-millisecond residue: OS sleep granularity is too
                // coarse, spin the rest.
                std::hint::spin_loop();
            }
        }
    }
}

/// Virtual clock for tests: a sleep lands on the deadline instantly.
#[derive(Default)]
pub struct SimClock {
    now: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }
}

impl PulseClock for SimClock {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, deadline_us: u64, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.now.fetch_max(deadline_us, Ordering::SeqCst);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new().unwrap();
        let mut prev = clock.now_us();
        for _ in 0..10_000 {
            let now = clock.now_us();
            assert!(now >= prev);
            prev = now;
        }
    }

    #[test]
    fn system_clock_sleep_reaches_deadline() {
        let clock = SystemClock::new().unwrap();
        let cancel = CancelToken::new();
        let deadline = clock.now_us() + 2_000;
        assert!(clock.sleep_until(deadline, &cancel));
        assert!(clock.now_us() >= deadline);
    }

    #[test]
    fn cancelled_sleep_returns_early() {
        let clock = SystemClock::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let deadline = clock.now_us() + 60_000_000;
        assert!(!clock.sleep_until(deadline, &cancel));
    }

    #[test]
    fn sim_clock_advances_to_deadline() {
        let clock = SimClock::new();
        let cancel = CancelToken::new();
        assert!(clock.sleep_until(1_234, &cancel));
        assert_eq!(clock.now_us(), 1_234);
        // Sleeping into the past must not move time backwards.
        assert!(clock.sleep_until(1_000, &cancel));
        assert_eq!(clock.now_us(), 1_234);
    }
}
