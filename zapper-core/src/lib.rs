//! IR signal codec and timed GPIO engine.
//!
//! The receive side turns edge interrupts into mark/space pulse trains and
//! classifies them against a registry of protocol matchers; the transmit
//! side regenerates carrier-modulated pulse trains on a dedicated worker.
//! Hardware sits behind the [`gpio`] traits, the pigpiod client in the
//! front-end crate being the stock implementation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use zapper_core::clock::SystemClock;
//! use zapper_core::gpio::sim::{SimEdgeSource, SimTxLine};
//! use zapper_core::{CaptureConfig, Transceiver};
//!
//! let clock = Arc::new(SystemClock::new()?);
//! let mut trx = Transceiver::new(
//!     clock.clone(),
//!     Box::new(SimEdgeSource::new()),
//!     Box::new(SimTxLine::new(clock)),
//!     CaptureConfig::default(),
//! )?;
//! let signal = trx.capture_signal(Some(std::time::Duration::from_secs(10)))?;
//! trx.transmit_signal(&signal, 1)?;
//! # Ok::<(), zapper_core::Error>(())
//! ```

pub mod capture;
pub mod clock;
pub mod codec;
pub mod error;
pub mod gpio;
pub mod registry;
pub mod sched;
pub mod signal;

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

pub use capture::{CaptureConfig, PulseCapturer};
pub use error::Error;
pub use registry::{MemRegistry, SignalRegistry};
pub use signal::{DecodedSignal, Level, Protocol, PulseEvent, RawCapture, TransmitJob};

use clock::PulseClock;
use gpio::{Edge, EdgeSource, TxLine};
use sched::Scheduler;
use signal::DEFAULT_FRAME_GAP_US;

/// Capture and transmit engine bound to one receive and one transmit line.
pub struct Transceiver {
    clock: Arc<dyn PulseClock>,
    capturer: PulseCapturer,
    edges: Receiver<Edge>,
    source: Box<dyn EdgeSource>,
    scheduler: Scheduler,
}

impl Transceiver {
    /// Subscribes to the edge source and spawns the transmit worker.
    pub fn new(
        clock: Arc<dyn PulseClock>,
        mut source: Box<dyn EdgeSource>,
        tx_line: Box<dyn TxLine>,
        capture_cfg: CaptureConfig,
    ) -> Result<Self, Error> {
        let edges = source.subscribe()?;
        let scheduler = Scheduler::new(clock.clone(), tx_line);
        Ok(Transceiver {
            clock,
            capturer: PulseCapturer::new(capture_cfg),
            edges,
            source,
            scheduler,
        })
    }

    /// One raw capture session. `None` waits for a signal indefinitely.
    pub fn capture_raw(&mut self, timeout: Option<Duration>) -> Result<RawCapture, Error> {
        let capture = self
            .capturer
            .next_capture(self.clock.as_ref(), &self.edges, timeout)?;
        if !capture.complete {
            return Err(Error::CaptureOverflow);
        }
        Ok(capture)
    }

    /// Capture one signal and classify it.
    pub fn capture_signal(&mut self, timeout: Option<Duration>) -> Result<DecodedSignal, Error> {
        self.capture_raw(timeout).map(codec::decode)
    }

    /// Arm a transmission. Returns as soon as the job is accepted; use
    /// [`Transceiver::wait_idle`] to block for completion.
    pub fn transmit_signal(&self, signal: &DecodedSignal, repeat_count: u32) -> Result<(), Error> {
        self.scheduler.submit(TransmitJob {
            signal: signal.clone(),
            repeat_count,
            inter_frame_gap_us: DEFAULT_FRAME_GAP_US,
        })
    }

    pub fn cancel_transmit(&self) {
        self.scheduler.cancel();
    }

    pub fn wait_idle(&self) {
        self.scheduler.wait_idle();
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        self.source.unsubscribe();
    }
}
