//! GPIO line abstractions.
//!
//! The transmit and receive lines are physically separate pins, so the two
//! sides get separate traits. Edge delivery is reframed from the hardware
//! callback style into a bounded channel: the driver context enqueues
//! timestamped edges and the capture context drains them at its own pace.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use crate::error::Error;
use crate::signal::RawCapture;

/// Depth of the edge channel. A remote frame is at most a few hundred
/// edges; anything beyond this means the consumer has stalled.
pub const EDGE_QUEUE_DEPTH: usize = 1024;

/// A single transition on the receive line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Pulse-clock timestamp of the transition, microseconds.
    pub timestamp_us: u64,
    /// Line level after the transition.
    pub rising: bool,
}

/// The transmit line. Implementations drive the pin synchronously; the
/// scheduler owns all timing unless the backend claims whole frames.
pub trait TxLine: Send {
    fn set_active(&mut self, active: bool);

    /// Emit a whole frame with backend-paced timing, blocking until it is
    /// on the air. Returning `false` means there is no such path and the
    /// scheduler drives the line through `set_active`. Remote daemons
    /// implement this because per-toggle round trips cannot keep up with
    /// a carrier half-period.
    fn send_frame(&mut self, _frame: &RawCapture, _carrier_khz: u32) -> bool {
        false
    }
}

/// The receive line as a stream of edges.
pub trait EdgeSource: Send {
    /// Start edge delivery. At most one subscriber may exist at a time;
    /// a second subscribe without an unsubscribe fails with
    /// [`Error::AlreadyRegistered`].
    fn subscribe(&mut self) -> Result<Receiver<Edge>, Error>;

    /// Stop edge delivery and release the subscription slot.
    fn unsubscribe(&mut self);
}

/// In-memory implementations used by tests and offline decoding.
pub mod sim {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::clock::PulseClock;

    /// Records transmit-line transitions against a shared clock.
    pub struct SimTxLine {
        clock: Arc<dyn PulseClock>,
        log: Arc<Mutex<Vec<(u64, bool)>>>,
        level: bool,
    }

    impl SimTxLine {
        pub fn new(clock: Arc<dyn PulseClock>) -> Self {
            SimTxLine {
                clock,
                log: Arc::new(Mutex::new(Vec::new())),
                level: false,
            }
        }

        /// Handle for reading transitions after the line has been moved
        /// into a scheduler.
        pub fn transitions(&self) -> TransitionLog {
            TransitionLog(self.log.clone())
        }
    }

    /// Shared view of a [`SimTxLine`]'s recorded transitions.
    #[derive(Clone)]
    pub struct TransitionLog(Arc<Mutex<Vec<(u64, bool)>>>);

    impl TransitionLog {
        pub fn snapshot(&self) -> Vec<(u64, bool)> {
            self.0.lock().unwrap().clone()
        }

        /// Final recorded line level, false when nothing was driven.
        pub fn last_level(&self) -> bool {
            self.0.lock().unwrap().last().map(|&(_, l)| l).unwrap_or(false)
        }

        /// Rebuild mark/space durations from the transition log. Inactive
        /// gaps shorter than a carrier cycle are folded back into the
        /// surrounding mark, so a modulated mark reads as one solid pulse.
        pub fn durations(&self) -> Vec<u32> {
            const CARRIER_GAP_US: u64 = 50;

            let log = self.0.lock().unwrap();
            let mut iter = log.iter();
            let (mut since, mut level) = match iter.next() {
                Some(&(t, l)) => (t, l),
                None => return Vec::new(),
            };

            let mut spans: Vec<(bool, u64)> = Vec::new();
            for &(ts, l) in iter {
                let d = ts - since;
                match spans.last_mut() {
                    Some((pl, pd)) if *pl == level => *pd += d,
                    Some((pl, pd)) if *pl && !level && d < CARRIER_GAP_US => *pd += d,
                    _ => spans.push((level, d)),
                }
                since = ts;
                level = l;
            }
            if spans.first().map(|&(l, _)| !l).unwrap_or(false) {
                spans.remove(0);
            }
            spans.into_iter().map(|(_, d)| d as u32).collect()
        }
    }

    impl TxLine for SimTxLine {
        fn set_active(&mut self, active: bool) {
            if active == self.level {
                return;
            }
            self.level = active;
            self.log.lock().unwrap().push((self.clock.now_us(), active));
        }
    }

    /// Edge source fed by tests or by offline file playback.
    #[derive(Default)]
    pub struct SimEdgeSource {
        sender: Option<SyncSender<Edge>>,
    }

    impl SimEdgeSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Deliver one edge to the subscriber, if any. Returns false when
        /// there is no subscriber or the queue is full.
        pub fn feed(&self, edge: Edge) -> bool {
            match &self.sender {
                Some(tx) => tx.try_send(edge).is_ok(),
                None => false,
            }
        }

        /// Deliver a pulse train starting at `start_us`, mark first, on an
        /// active-low line (demodulator output rests high).
        pub fn feed_pulses(&self, start_us: u64, durations: &[u32]) {
            let mut ts = start_us;
            // falling edge starts the first mark
            self.feed(Edge { timestamp_us: ts, rising: false });
            let mut rising = true;
            for &d in durations {
                ts += u64::from(d);
                self.feed(Edge { timestamp_us: ts, rising });
                rising = !rising;
            }
        }
    }

    impl EdgeSource for SimEdgeSource {
        fn subscribe(&mut self) -> Result<Receiver<Edge>, Error> {
            if self.sender.is_some() {
                return Err(Error::AlreadyRegistered);
            }
            let (tx, rx) = sync_channel(EDGE_QUEUE_DEPTH);
            self.sender = Some(tx);
            Ok(rx)
        }

        fn unsubscribe(&mut self) {
            self.sender = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sim::*;
    use super::*;
    use crate::clock::{CancelToken, PulseClock, SimClock};
    use std::sync::Arc;

    #[test]
    fn second_subscribe_fails() {
        let mut src = SimEdgeSource::new();
        let _rx = src.subscribe().unwrap();
        assert_eq!(src.subscribe().unwrap_err(), Error::AlreadyRegistered);
        src.unsubscribe();
        assert!(src.subscribe().is_ok());
    }

    #[test]
    fn feed_without_subscriber_is_dropped() {
        let src = SimEdgeSource::new();
        assert!(!src.feed(Edge { timestamp_us: 0, rising: true }));
    }

    #[test]
    fn sim_tx_line_records_transitions() {
        let clock = Arc::new(SimClock::new());
        let cancel = CancelToken::new();
        let mut line = SimTxLine::new(clock.clone());
        let log = line.transitions();

        line.set_active(true);
        clock.sleep_until(500, &cancel);
        line.set_active(false);
        clock.sleep_until(1_000, &cancel);
        line.set_active(true);
        clock.sleep_until(1_560, &cancel);
        line.set_active(false);

        assert_eq!(log.durations(), vec![500, 500, 560]);
        assert!(!log.last_level());
    }
}
