//! Signal types shared by the capture, codec and transmit paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capture buffer bound. A full NEC frame is 67 pulses; this leaves room
/// for long raw air-conditioner style frames.
pub const MAX_PULSES: usize = 512;

/// Default inter-frame gap when the caller does not specify one.
pub const DEFAULT_FRAME_GAP_US: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Carrier on, IR LED emitting.
    Mark,
    /// Carrier off, line idle.
    Space,
}

impl Level {
    pub fn flipped(self) -> Level {
        match self {
            Level::Mark => Level::Space,
            Level::Space => Level::Mark,
        }
    }
}

/// One mark or space interval of a pulse train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseEvent {
    pub level: Level,
    pub duration_us: u32,
}

/// An ordered mark/space sequence as seen on the receive line.
///
/// Levels strictly alternate and always begin with a mark; durations are
/// never zero. `complete` is false when the buffer filled before the line
/// went idle (the tail is truncated, never the middle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCapture {
    pub pulses: heapless::Vec<PulseEvent, MAX_PULSES>,
    pub complete: bool,
}

impl Default for RawCapture {
    fn default() -> Self {
        RawCapture {
            pulses: heapless::Vec::new(),
            complete: true,
        }
    }
}

impl RawCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a capture from alternating durations, mark first.
    /// Durations beyond [`MAX_PULSES`] are dropped and the capture is
    /// flagged incomplete.
    pub fn from_durations(durations: &[u32]) -> Self {
        let mut cap = RawCapture::new();
        let mut level = Level::Mark;
        for &duration_us in durations {
            if !cap.push(PulseEvent { level, duration_us }) {
                break;
            }
            level = level.flipped();
        }
        cap
    }

    /// Appends a pulse, merging consecutive same-level events. Returns
    /// false once the buffer is full (and flags the capture incomplete).
    pub fn push(&mut self, event: PulseEvent) -> bool {
        if event.duration_us == 0 {
            return true;
        }
        if let Some(last) = self.pulses.last_mut() {
            if last.level == event.level {
                last.duration_us = last.duration_us.saturating_add(event.duration_us);
                return true;
            }
        }
        if self.pulses.push(event).is_err() {
            self.complete = false;
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    pub fn durations(&self) -> impl Iterator<Item = u32> + '_ {
        self.pulses.iter().map(|p| p.duration_us)
    }

    /// Collapse near-equal durations to their average, marks and spaces
    /// separately. Receivers report the "same" pulse with a spread of
    /// tens of microseconds; averaging removes that before a raw signal
    /// is stored for replay.
    pub fn normalise(&mut self, tolerance_pct: u32) {
        for base in 0..2 {
            self.normalise_stride(base, tolerance_pct);
        }
    }

    fn normalise_stride(&mut self, base: usize, tolerance_pct: u32) {
        let n = self.pulses.len();
        let mut done = vec![false; n];
        let mut i = base;
        while i < n {
            if !done[i] {
                let v = u64::from(self.pulses[i].duration_us);
                let mut total = v;
                let mut count = 1u64;
                let mut j = i + 2;
                while j < n {
                    if !done[j] && similar(v, u64::from(self.pulses[j].duration_us), tolerance_pct)
                    {
                        total += u64::from(self.pulses[j].duration_us);
                        count += 1;
                    }
                    j += 2;
                }
                let avg = ((total + count / 2) / count) as u32;
                self.pulses[i].duration_us = avg;
                done[i] = true;
                let mut j = i + 2;
                while j < n {
                    if !done[j] && similar(v, u64::from(self.pulses[j].duration_us), tolerance_pct)
                    {
                        self.pulses[j].duration_us = avg;
                        done[j] = true;
                    }
                    j += 2;
                }
            }
            i += 2;
        }
    }

    /// True when both captures have the same shape and every duration is
    /// within `tolerance_pct`. On success this capture becomes the
    /// pairwise average of the two, so a confirmed recording is cleaner
    /// than either press alone.
    pub fn merge_matching(&mut self, other: &RawCapture, tolerance_pct: u32) -> bool {
        if self.pulses.len() != other.pulses.len() {
            return false;
        }
        for (a, b) in self.pulses.iter().zip(other.pulses.iter()) {
            if a.level != b.level
                || !similar(
                    u64::from(a.duration_us),
                    u64::from(b.duration_us),
                    tolerance_pct,
                )
            {
                return false;
            }
        }
        for (a, b) in self.pulses.iter_mut().zip(other.pulses.iter()) {
            a.duration_us = (a.duration_us + b.duration_us + 1) / 2;
        }
        true
    }
}

fn similar(a: u64, b: u64, tolerance_pct: u32) -> bool {
    let tol = u64::from(tolerance_pct);
    a * 100 >= b * (100 - tol) && a * 100 <= b * (100 + tol)
}

/// Known protocol families plus the raw fallback. Closed set: matchers are
/// tried in priority order, longest header first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Nec,
    NecSamsung,
    Sirc,
    Rc5,
    /// No matcher claimed the capture; the pulse train is kept verbatim.
    Raw,
}

impl Protocol {
    pub fn carrier_khz(self) -> u32 {
        match self {
            Protocol::Nec | Protocol::NecSamsung => 38,
            Protocol::Sirc => 40,
            Protocol::Rc5 => 36,
            Protocol::Raw => 38,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Nec => "nec",
            Protocol::NecSamsung => "nes",
            Protocol::Sirc => "sirc",
            Protocol::Rc5 => "rc5",
            Protocol::Raw => "raw",
        };
        f.write_str(s)
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nec" => Ok(Protocol::Nec),
            "nes" => Ok(Protocol::NecSamsung),
            "sirc" => Ok(Protocol::Sirc),
            "rc5" => Ok(Protocol::Rc5),
            _ => Err(()),
        }
    }
}

/// A decoded (or raw) IR signal.
///
/// Invariant: `protocol == Raw` implies `raw_fallback` is populated, so
/// every received signal stays replayable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedSignal {
    pub protocol: Protocol,
    pub address: Option<u16>,
    pub command: u32,
    pub repeat: bool,
    pub carrier_khz: u32,
    pub raw_fallback: Option<RawCapture>,
}

impl DecodedSignal {
    pub fn new(protocol: Protocol, address: Option<u16>, command: u32) -> Self {
        DecodedSignal {
            protocol,
            address,
            command,
            repeat: false,
            carrier_khz: protocol.carrier_khz(),
            raw_fallback: None,
        }
    }

    pub fn raw(capture: RawCapture) -> Self {
        DecodedSignal {
            protocol: Protocol::Raw,
            address: None,
            command: 0,
            repeat: false,
            carrier_khz: Protocol::Raw.carrier_khz(),
            raw_fallback: Some(capture),
        }
    }

    /// Protocol identity, ignoring timing detail: two signals are the same
    /// button if these fields agree.
    pub fn same_command(&self, other: &DecodedSignal) -> bool {
        self.protocol == other.protocol
            && self.address == other.address
            && self.command == other.command
            && self.repeat == other.repeat
    }
}

/// One scheduler job: a signal and how often to emit it.
#[derive(Debug, Clone)]
pub struct TransmitJob {
    pub signal: DecodedSignal,
    pub repeat_count: u32,
    pub inter_frame_gap_us: u32,
}

impl TransmitJob {
    pub fn once(signal: DecodedSignal) -> Self {
        TransmitJob {
            signal,
            repeat_count: 1,
            inter_frame_gap_us: DEFAULT_FRAME_GAP_US,
        }
    }
}
