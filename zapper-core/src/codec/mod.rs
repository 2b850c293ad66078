//! IR codec: raw pulse trains to structured signals and back.
//!
//! Decoding tries a fixed registry of protocol matchers in priority order,
//! longest header first, so overlapping tolerance windows resolve to the
//! most specific matcher. A matcher whose header fits but whose bit stream
//! fails validation falls through to the next one; if nothing claims the
//! capture it is classified as raw with the pulse train kept verbatim, so
//! every received signal stays replayable.

mod nec;
mod rc5;
mod sirc;

use crate::error::Error;
use crate::signal::{DecodedSignal, Protocol, PulseEvent, RawCapture};

/// Consumer IR hardware is imprecise; a quarter either way is the usual
/// acceptance window.
pub const DEFAULT_TOLERANCE_PCT: u32 = 25;

/// Symmetric tolerance check: `actual` within ±`tol_pct`% of `nominal`.
pub(crate) fn near(actual: u32, nominal: u32, tol_pct: u32) -> bool {
    let actual = u64::from(actual) * 100;
    let nominal = u64::from(nominal);
    let tol = u64::from(tol_pct);
    actual >= nominal * (100 - tol) && actual <= nominal * (100 + tol)
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
    Nec,
    NecSamsung,
    Sirc,
    Rc5,
}

const REGISTRY: [Matcher; 4] = [
    Matcher::Nec,        // 9000 us header
    Matcher::NecSamsung, // 4500 us header
    Matcher::Sirc,       // 2400 us header
    Matcher::Rc5,        // 889 us first mark
];

impl Matcher {
    fn try_decode(self, pulses: &[PulseEvent], tol: u32) -> Option<DecodedSignal> {
        match self {
            Matcher::Nec => nec::decode(pulses, tol),
            Matcher::NecSamsung => nec::decode_samsung(pulses, tol),
            Matcher::Sirc => sirc::decode(pulses, tol),
            Matcher::Rc5 => rc5::decode(pulses, tol),
        }
    }
}

/// Classify a capture with the default tolerance. Never fails; takes the
/// capture by value so the raw fallback can be attached without a copy.
pub fn decode(capture: RawCapture) -> DecodedSignal {
    decode_with_tolerance(capture, DEFAULT_TOLERANCE_PCT)
}

pub fn decode_with_tolerance(capture: RawCapture, tolerance_pct: u32) -> DecodedSignal {
    for matcher in &REGISTRY {
        if let Some(signal) = matcher.try_decode(&capture.pulses, tolerance_pct) {
            log::debug!("decoded {:?} as {:?}", matcher, signal.protocol);
            return signal;
        }
    }
    log::debug!("no matcher claimed {} pulses, keeping raw", capture.len());
    DecodedSignal::raw(capture)
}

/// Regenerate the full pulse train for a signal.
///
/// Raw signals replay their captured pulses verbatim; a raw signal without
/// pulse data violates the fallback invariant and is rejected.
pub fn encode(signal: &DecodedSignal) -> Result<RawCapture, Error> {
    match signal.protocol {
        Protocol::Nec => Ok(nec::encode(signal)),
        Protocol::NecSamsung => Ok(nec::encode_samsung(signal)),
        Protocol::Sirc => Ok(sirc::encode(signal)),
        Protocol::Rc5 => Ok(rc5::encode(signal)),
        Protocol::Raw => signal
            .raw_fallback
            .clone()
            .ok_or(Error::InvalidJob("raw signal without pulse data")),
    }
}

/// The protocol's distinct hold frame, where one exists. Protocols without
/// one repeat the full frame.
pub fn encode_repeat(signal: &DecodedSignal) -> Option<RawCapture> {
    match signal.protocol {
        Protocol::Nec => Some(nec::encode_repeat_frame()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(signal: DecodedSignal) {
        let frame = encode(&signal).unwrap();
        let decoded = decode(frame);
        assert!(
            decoded.same_command(&signal),
            "expected {:?}, got {:?}",
            signal,
            decoded
        );
    }

    #[test]
    fn every_protocol_round_trips() {
        round_trip(DecodedSignal::new(Protocol::Nec, Some(0x00), 0x0A));
        round_trip(DecodedSignal::new(Protocol::Nec, Some(0xEF00), 0x45));
        round_trip(DecodedSignal::new(Protocol::NecSamsung, Some(0x07), 0x63));
        round_trip(DecodedSignal::new(Protocol::Sirc, Some(0x10), 0x74));
        round_trip(DecodedSignal::new(Protocol::Rc5, Some(0x14), 0x0C));
        let mut hold = DecodedSignal::new(Protocol::Nec, None, 0);
        hold.repeat = true;
        round_trip(hold);
    }

    #[test]
    fn perturbed_frame_still_decodes() {
        let signal = DecodedSignal::new(Protocol::Nec, Some(0x5A), 0x3B);
        let mut frame = encode(&signal).unwrap();
        // Stretch and shrink alternate pulses by 20%, inside the window.
        for (i, p) in frame.pulses.iter_mut().enumerate() {
            let d = u64::from(p.duration_us);
            let skewed = if i % 2 == 0 { d * 120 / 100 } else { d * 80 / 100 };
            p.duration_us = skewed as u32;
        }
        let decoded = decode(frame);
        assert!(decoded.same_command(&signal));
    }

    #[test]
    fn unmatched_capture_keeps_raw_fallback() {
        let capture = RawCapture::from_durations(&[3_000, 3_000, 1_000, 2_000, 1_000]);
        let signal = decode(capture.clone());
        assert_eq!(signal.protocol, Protocol::Raw);
        assert_eq!(signal.raw_fallback.as_ref(), Some(&capture));
        // Replaying a raw signal reproduces the capture exactly.
        assert_eq!(encode(&signal).unwrap(), capture);
    }

    #[test]
    fn corrupt_checksum_falls_through_to_raw() {
        let mut frame = encode(&DecodedSignal::new(Protocol::Nec, Some(0x04), 0x08)).unwrap();
        // Invert the spaces of the ~command byte so the complement breaks
        // while the header still matches.
        for i in 24..32 {
            let idx = 2 + 2 * i + 1;
            frame.pulses[idx].duration_us = if frame.pulses[idx].duration_us > 1_000 {
                560
            } else {
                1_690
            };
        }
        let signal = decode(frame);
        assert_eq!(signal.protocol, Protocol::Raw);
        assert!(signal.raw_fallback.is_some());
    }

    #[test]
    fn raw_signal_without_pulses_is_invalid() {
        let mut signal = DecodedSignal::raw(RawCapture::new());
        signal.raw_fallback = None;
        assert_eq!(
            encode(&signal),
            Err(Error::InvalidJob("raw signal without pulse data"))
        );
    }
}
