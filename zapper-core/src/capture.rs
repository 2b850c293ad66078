//! Pulse capture: edge timestamps in, mark/space durations out.
//!
//! A session opens on the first edge after the line has been idle for at
//! least the idle threshold and closes when the line goes idle again or the
//! buffer fills. The trailing idle stretch is the inter-frame gap, not part
//! of the signal, so it is never recorded; a capture always ends on a mark.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::clock::PulseClock;
use crate::error::Error;
use crate::gpio::Edge;
use crate::signal::{Level, PulseEvent, RawCapture};

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Idle time that opens and closes a session.
    pub idle_threshold_us: u64,
    /// Edges closer together than this are treated as receiver glitches
    /// and merged away.
    pub glitch_us: u32,
    /// Sessions with fewer pulses than this are rejected as noise.
    pub min_pulses: usize,
    /// Demodulator output rests high and pulls low during a mark.
    pub active_low: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            idle_threshold_us: 5_000,
            glitch_us: 100,
            min_pulses: 3,
            active_low: true,
        }
    }
}

pub struct PulseCapturer {
    cfg: CaptureConfig,
    /// Opening edge of the next frame, seen while sealing the previous one.
    pending: Option<Edge>,
}

impl PulseCapturer {
    pub fn new(cfg: CaptureConfig) -> Self {
        PulseCapturer { cfg, pending: None }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.cfg
    }

    /// Block on the edge stream until one session completes.
    ///
    /// `timeout` bounds the whole call against `clock`; `None` waits
    /// forever. A closed edge stream finishes the in-progress session (the
    /// line is idle from our point of view) before reporting
    /// [`Error::SourceClosed`] on the next call.
    pub fn next_capture(
        &mut self,
        clock: &dyn PulseClock,
        edges: &Receiver<Edge>,
        timeout: Option<Duration>,
    ) -> Result<RawCapture, Error> {
        let deadline = timeout.map(|t| clock.now_us() + t.as_micros() as u64);
        let active_low = self.cfg.active_low;
        let mut session: Option<Session> =
            self.pending.take().map(|e| Session::start(e, active_low));

        loop {
            if let Some(deadline) = deadline {
                if clock.now_us() >= deadline {
                    return Err(Error::CaptureTimeout);
                }
            }

            let wait = Duration::from_micros(self.cfg.idle_threshold_us);
            match edges.recv_timeout(wait) {
                Ok(edge) => match session.as_mut() {
                    None => session = Some(Session::start(edge, active_low)),
                    Some(s) => {
                        let gap = edge.timestamp_us.saturating_sub(s.last_ts);
                        // Only a space-level interval can be idle line; a
                        // long mark (NEC's 9000 us header) stays in-frame.
                        let was_space = edge.rising != self.cfg.active_low;
                        if was_space && gap >= self.cfg.idle_threshold_us {
                            // This edge opens the next frame; keep it for
                            // the next call and seal the current session.
                            self.pending = Some(edge);
                            let done = session.take().unwrap();
                            return self.seal(done);
                        }
                        if self.record(s, edge) {
                            let done = session.take().unwrap();
                            return self.seal(done);
                        }
                    }
                },
                Err(RecvTimeoutError::Timeout) => {
                    // Silence with the line held at mark is a long mark
                    // still running, not idle line.
                    if session.as_ref().map(|s| s.at_rest).unwrap_or(false) {
                        let done = session.take().unwrap();
                        return self.seal(done);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return match session.take() {
                        Some(done) => self.seal(done),
                        None => Err(Error::SourceClosed),
                    };
                }
            }
        }
    }

    /// Add one edge to the session. Returns true when the buffer filled
    /// and the session must end.
    fn record(&self, s: &mut Session, edge: Edge) -> bool {
        let duration = edge.timestamp_us.saturating_sub(s.last_ts) as u32;
        s.last_ts = edge.timestamp_us;

        // The edge closes the interval that ran at the pre-edge level.
        let mark_ended = edge.rising == self.cfg.active_low;
        let level = if mark_ended { Level::Mark } else { Level::Space };
        s.at_rest = mark_ended;

        if duration < self.cfg.glitch_us {
            // Glitch: extend whatever came before instead of recording a
            // sub-glitch pulse. The follow-up same-level merge in
            // RawCapture::push re-joins the split pulse.
            if let Some(last) = s.capture.pulses.last_mut() {
                last.duration_us += duration;
            }
            return false;
        }

        if s.capture.is_empty() && level == Level::Space {
            // A session must open with a mark; a leading space means the
            // baseline was mid-pulse. Re-anchor on this edge.
            return false;
        }

        !s.capture.push(PulseEvent { level, duration_us: duration })
    }

    fn seal(&self, s: Session) -> Result<RawCapture, Error> {
        let mut capture = s.capture;

        // The final mark's end is the edge before the idle stretch; a
        // trailing space would be the gap itself, so it never appears.
        while capture.pulses.last().map(|p| p.level) == Some(Level::Space) {
            capture.pulses.pop();
        }

        if capture.len() < self.cfg.min_pulses {
            return Err(Error::CaptureTooShort(capture.len()));
        }
        if !capture.complete {
            log::warn!("capture truncated at {} pulses", capture.len());
        }
        Ok(capture)
    }
}

struct Session {
    capture: RawCapture,
    last_ts: u64,
    /// Line level after the last edge; only a resting line can go idle.
    at_rest: bool,
}

impl Session {
    /// The opening edge starts the first mark; nothing is recorded yet.
    fn start(edge: Edge, active_low: bool) -> Self {
        Session {
            capture: RawCapture::new(),
            last_ts: edge.timestamp_us,
            at_rest: edge.rising == active_low,
        }
    }
}
