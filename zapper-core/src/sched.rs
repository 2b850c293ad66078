//! Transmission scheduler.
//!
//! A dedicated worker thread owns the transmit line; jobs are validated and
//! encoded before anything touches the hardware, then handed over through a
//! one-deep channel. Once a frame starts the worker must not be preempted
//! for longer than the shortest pulse of the active protocol, so deployments
//! give this thread real-time priority where the kernel allows it.
//!
//! Cancellation lands between pulses: the pulse in flight always completes,
//! so the line is never cut mid-mark, and it is driven inactive before the
//! worker goes back to idle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::{CancelToken, PulseClock};
use crate::codec;
use crate::error::Error;
use crate::gpio::TxLine;
use crate::signal::{Level, RawCapture, TransmitJob};

/// Carriers above this have a sub-2 us period the software carrier loop
/// cannot pace; IR remotes live in the 30..60 kHz band anyway.
pub const MAX_CARRIER_KHZ: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    Idle = 0,
    Armed = 1,
    Transmitting = 2,
    Cooldown = 3,
}

impl TxState {
    fn from_u8(v: u8) -> TxState {
        match v {
            1 => TxState::Armed,
            2 => TxState::Transmitting,
            3 => TxState::Cooldown,
            _ => TxState::Idle,
        }
    }
}

/// A validated, pre-encoded job. Encoding happens in [`Scheduler::submit`]
/// so a bad job is rejected before any hardware side effect.
struct Plan {
    frame: RawCapture,
    repeat_frame: Option<RawCapture>,
    repeat_count: u32,
    gap_us: u32,
    carrier_khz: u32,
}

pub struct Scheduler {
    jobs: Option<SyncSender<Plan>>,
    state: Arc<AtomicU8>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn PulseClock>, line: Box<dyn TxLine>) -> Self {
        let (tx, rx) = sync_channel::<Plan>(1);
        let state = Arc::new(AtomicU8::new(TxState::Idle as u8));
        let cancel = CancelToken::new();

        let worker_state = state.clone();
        let worker_cancel = cancel.clone();
        let worker = thread::Builder::new()
            .name("ir-tx".into())
            .spawn(move || worker_loop(clock, line, rx, worker_state, worker_cancel))
            .expect("failed to spawn transmit worker");

        Scheduler {
            jobs: Some(tx),
            state,
            cancel,
            worker: Some(worker),
        }
    }

    /// Arm a job. Fails with [`Error::LineBusy`] while another job is in
    /// flight and [`Error::InvalidJob`] before any hardware side effect.
    pub fn submit(&self, job: TransmitJob) -> Result<(), Error> {
        if job.repeat_count < 1 {
            return Err(Error::InvalidJob("repeat_count must be at least 1"));
        }
        // The software carrier needs a whole microsecond per half-period.
        if job.signal.carrier_khz > MAX_CARRIER_KHZ {
            return Err(Error::InvalidJob("carrier frequency too high"));
        }
        let frame = codec::encode(&job.signal)?;
        if frame.is_empty() {
            return Err(Error::InvalidJob("empty signal"));
        }
        let plan = Plan {
            frame,
            repeat_frame: codec::encode_repeat(&job.signal),
            repeat_count: job.repeat_count,
            gap_us: job.inter_frame_gap_us,
            carrier_khz: job.signal.carrier_khz,
        };

        self.state
            .compare_exchange(
                TxState::Idle as u8,
                TxState::Armed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| Error::LineBusy)?;

        // A cancel issued while idle applies to nothing.
        self.cancel.reset();

        let jobs = self.jobs.as_ref().expect("scheduler already shut down");
        if jobs.try_send(plan).is_err() {
            self.state.store(TxState::Idle as u8, Ordering::SeqCst);
            return Err(Error::LineBusy);
        }
        Ok(())
    }

    /// Abort the in-flight job after the current pulse. No-op when idle.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> TxState {
        TxState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Block until the worker has drained the current job.
    pub fn wait_idle(&self) {
        while self.state() != TxState::Idle {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    clock: Arc<dyn PulseClock>,
    mut line: Box<dyn TxLine>,
    jobs: Receiver<Plan>,
    state: Arc<AtomicU8>,
    cancel: CancelToken,
) {
    while let Ok(plan) = jobs.recv() {
        run_plan(clock.as_ref(), line.as_mut(), &plan, &state, &cancel);
        state.store(TxState::Idle as u8, Ordering::SeqCst);
    }
    line.set_active(false);
}

fn run_plan(
    clock: &dyn PulseClock,
    line: &mut dyn TxLine,
    plan: &Plan,
    state: &AtomicU8,
    cancel: &CancelToken,
) {
    state.store(TxState::Transmitting as u8, Ordering::SeqCst);
    log::debug!(
        "transmitting {} pulses x{} at {} kHz",
        plan.frame.len(),
        plan.repeat_count,
        plan.carrier_khz
    );

    for n in 0..plan.repeat_count {
        if cancel.is_cancelled() {
            log::debug!("job cancelled after {} frames", n);
            break;
        }
        let frame = match (&plan.repeat_frame, n) {
            (Some(repeat), n) if n > 0 => repeat,
            _ => &plan.frame,
        };
        if !emit_frame(clock, line, frame, plan.carrier_khz, cancel) {
            break;
        }
        if n + 1 < plan.repeat_count {
            state.store(TxState::Cooldown as u8, Ordering::SeqCst);
            let gap_end = clock.now_us() + u64::from(plan.gap_us);
            if !clock.sleep_until(gap_end, cancel) {
                break;
            }
            state.store(TxState::Transmitting as u8, Ordering::SeqCst);
        }
    }

    // Whatever happened above, the line ends inactive.
    line.set_active(false);
}

/// Emit one frame. Returns false when cancelled; the current pulse always
/// runs to completion first.
fn emit_frame(
    clock: &dyn PulseClock,
    line: &mut dyn TxLine,
    frame: &RawCapture,
    carrier_khz: u32,
    cancel: &CancelToken,
) -> bool {
    if line.send_frame(frame, carrier_khz) {
        // Backend paced the whole frame; cancel applies from here on.
        return !cancel.is_cancelled();
    }

    // In-pulse sleeps use an inert token: a pulse is never truncated.
    let inert = CancelToken::new();
    let mut t = clock.now_us();

    for pulse in frame.pulses.iter() {
        let deadline = t + u64::from(pulse.duration_us);
        match pulse.level {
            Level::Mark if carrier_khz > 0 => {
                // carrier_khz <= MAX_CARRIER_KHZ, so period >= 2 and the
                // edge cursor always advances.
                let period = u64::from(1_000 / carrier_khz);
                let half = period / 2;
                let mut edge = t;
                while edge < deadline {
                    line.set_active(true);
                    clock.sleep_until((edge + half).min(deadline), &inert);
                    line.set_active(false);
                    edge += period;
                    clock.sleep_until(edge.min(deadline), &inert);
                }
            }
            Level::Mark => {
                line.set_active(true);
                clock.sleep_until(deadline, &inert);
                line.set_active(false);
            }
            Level::Space => {
                line.set_active(false);
                clock.sleep_until(deadline, &inert);
            }
        }
        t = deadline;
        if cancel.is_cancelled() {
            line.set_active(false);
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SimClock, SystemClock};
    use crate::gpio::sim::SimTxLine;
    use crate::signal::{DecodedSignal, Protocol};

    fn nec_signal() -> DecodedSignal {
        DecodedSignal::new(Protocol::Nec, Some(0x00), 0x0A)
    }

    #[test]
    fn emitted_waveform_matches_encoder() {
        let clock: Arc<SimClock> = Arc::new(SimClock::new());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock, Box::new(line));

        let mut signal = nec_signal();
        signal.carrier_khz = 0; // unmodulated, transition log is exact
        sched.submit(TransmitJob::once(signal.clone())).unwrap();
        sched.wait_idle();

        let expected: Vec<u32> = codec::encode(&signal).unwrap().durations().collect();
        assert_eq!(log.durations(), expected);
        assert!(!log.last_level());
    }

    #[test]
    fn carrier_modulates_marks() {
        let clock: Arc<SimClock> = Arc::new(SimClock::new());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock, Box::new(line));

        // One solid 260 us mark at 38 kHz: ten 26 us carrier cycles.
        let signal = DecodedSignal::raw(RawCapture::from_durations(&[260]));
        sched.submit(TransmitJob::once(signal)).unwrap();
        sched.wait_idle();

        assert_eq!(log.snapshot().len(), 20);
        let durations = log.durations();
        assert_eq!(durations.len(), 1);
        assert!(durations[0] >= 234 && durations[0] <= 260);
        assert!(!log.last_level());
    }

    #[test]
    fn repeat_uses_hold_frame_and_gap() {
        let clock: Arc<SimClock> = Arc::new(SimClock::new());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock, Box::new(line));

        let mut signal = nec_signal();
        signal.carrier_khz = 0;
        let job = TransmitJob {
            signal: signal.clone(),
            repeat_count: 3,
            inter_frame_gap_us: 40_000,
        };
        sched.submit(job).unwrap();
        sched.wait_idle();

        let full: Vec<u32> = codec::encode(&signal).unwrap().durations().collect();
        let hold: Vec<u32> = codec::encode_repeat(&signal).unwrap().durations().collect();
        let emitted = log.durations();
        // full frame, gap+hold, gap+hold
        assert_eq!(emitted.len(), full.len() + 2 * hold.len() + 2);
        assert_eq!(&emitted[..full.len()], &full[..]);
        assert!(emitted[full.len()] >= 40_000);
        assert_eq!(
            &emitted[full.len() + 1..full.len() + 1 + hold.len()],
            &hold[..]
        );
    }

    #[test]
    fn busy_rejection_leaves_job_running() {
        let clock = Arc::new(SystemClock::new().unwrap());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock, Box::new(line));

        let signal = DecodedSignal::raw(RawCapture::from_durations(&[500, 20_000, 500]));
        let job = TransmitJob {
            signal: signal.clone(),
            repeat_count: 3,
            inter_frame_gap_us: 10_000,
        };
        sched.submit(job).unwrap();
        assert_eq!(
            sched.submit(TransmitJob::once(signal)),
            Err(Error::LineBusy)
        );
        sched.wait_idle();
        // Three full frames made it out despite the rejected submit.
        assert_eq!(log.durations().len(), 3 * 3 + 2);
    }

    #[test]
    fn cancel_leaves_line_inactive() {
        let clock = Arc::new(SystemClock::new().unwrap());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock.clone(), Box::new(line));

        let signal = DecodedSignal::raw(RawCapture::from_durations(&[
            1_000, 20_000, 1_000, 20_000, 1_000,
        ]));
        let job = TransmitJob {
            signal,
            repeat_count: 50,
            inter_frame_gap_us: 20_000,
        };
        let started = clock.now_us();
        sched.submit(job).unwrap();
        thread::sleep(Duration::from_millis(5));
        sched.cancel();
        sched.wait_idle();

        assert!(!log.last_level());
        // Nowhere near the ~2 s the full job would take.
        assert!(clock.now_us() - started < 500_000);
    }

    #[test]
    fn backend_frame_path_is_preferred() {
        use std::sync::Mutex;

        struct FrameLine(Arc<Mutex<Vec<(usize, u32)>>>);
        impl TxLine for FrameLine {
            fn set_active(&mut self, _active: bool) {}
            fn send_frame(&mut self, frame: &RawCapture, carrier_khz: u32) -> bool {
                self.0.lock().unwrap().push((frame.len(), carrier_khz));
                true
            }
        }

        let frames = Arc::new(Mutex::new(Vec::new()));
        let clock: Arc<SimClock> = Arc::new(SimClock::new());
        let sched = Scheduler::new(clock, Box::new(FrameLine(frames.clone())));

        let job = TransmitJob {
            signal: nec_signal(),
            repeat_count: 3,
            inter_frame_gap_us: 1_000,
        };
        sched.submit(job).unwrap();
        sched.wait_idle();

        // Full frame then two hold frames, all at the NEC carrier.
        assert_eq!(*frames.lock().unwrap(), vec![(67, 38), (3, 38), (3, 38)]);
    }

    #[test]
    fn out_of_range_carrier_rejected_before_hardware() {
        let clock: Arc<SimClock> = Arc::new(SimClock::new());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock, Box::new(line));

        let mut signal = DecodedSignal::raw(RawCapture::from_durations(&[260]));
        signal.carrier_khz = 2_000;
        assert_eq!(
            sched.submit(TransmitJob::once(signal)),
            Err(Error::InvalidJob("carrier frequency too high"))
        );
        assert_eq!(sched.state(), TxState::Idle);
        assert!(log.snapshot().is_empty());
    }

    #[test]
    fn zero_repeats_rejected_before_hardware() {
        let clock: Arc<SimClock> = Arc::new(SimClock::new());
        let line = SimTxLine::new(clock.clone());
        let log = line.transitions();
        let sched = Scheduler::new(clock, Box::new(line));

        let job = TransmitJob {
            signal: nec_signal(),
            repeat_count: 0,
            inter_frame_gap_us: 0,
        };
        assert!(matches!(sched.submit(job), Err(Error::InvalidJob(_))));
        assert!(log.snapshot().is_empty());
    }
}
