//! Philips RC5 bi-phase coding.
//!
//! 14 bits at 889 us per half-bit, MSB-first: start bit, field bit (extended
//! RC5 reuses it as inverted command bit 6), toggle bit, 5 address bits,
//! 6 command bits. A one is space-then-mark, a zero mark-then-space. The
//! first half of the start bit and any trailing space halves are idle line,
//! invisible on the wire; decoding reconstructs them.
//!
//! The toggle bit flips per key press and carries no command identity, so
//! near-identical captures intentionally decode to the same signal; encode
//! always emits it cleared.

use super::near;
use crate::signal::{DecodedSignal, Level, Protocol, PulseEvent, RawCapture};

const HALF_US: u32 = 889;
const BITS: usize = 14;
const HALVES: usize = BITS * 2;

pub(super) fn decode(pulses: &[PulseEvent], tol: u32) -> Option<DecodedSignal> {
    if pulses.is_empty() || pulses[0].level != Level::Mark {
        return None;
    }

    // Expand pulses into half-bit units; the invisible first half of the
    // start bit is a space.
    let mut halves: Vec<Level> = Vec::with_capacity(HALVES);
    halves.push(Level::Space);
    for p in pulses {
        let units = if near(p.duration_us, HALF_US, tol) {
            1
        } else if near(p.duration_us, 2 * HALF_US, tol) {
            2
        } else {
            return None;
        };
        for _ in 0..units {
            halves.push(p.level);
        }
    }
    if halves.len() > HALVES {
        return None;
    }
    // Trailing space halves of a frame ending in zero bits are idle line.
    while halves.len() < HALVES {
        halves.push(Level::Space);
    }

    let mut bits = [false; BITS];
    for (i, bit) in bits.iter_mut().enumerate() {
        let first = halves[2 * i];
        let second = halves[2 * i + 1];
        if first == second {
            return None;
        }
        *bit = second == Level::Mark;
    }
    if !bits[0] {
        // Start bit must be one.
        return None;
    }

    let field = bits[1];
    let address = bits[3..8].iter().fold(0u16, |a, &b| a << 1 | u16::from(b));
    let low = bits[8..14].iter().fold(0u32, |a, &b| a << 1 | u32::from(b));
    let command = if field { low } else { low | 0x40 };

    Some(DecodedSignal::new(Protocol::Rc5, Some(address), command))
}

pub(super) fn encode(signal: &DecodedSignal) -> RawCapture {
    let address = signal.address.unwrap_or(0) & 0x1F;
    let command = signal.command & 0x7F;

    let mut bits = [false; BITS];
    bits[0] = true;
    bits[1] = command & 0x40 == 0;
    bits[2] = false; // toggle
    for i in 0..5 {
        bits[3 + i] = address >> (4 - i) & 1 == 1;
    }
    for i in 0..6 {
        bits[8 + i] = command >> (5 - i) & 1 == 1;
    }

    let mut halves: Vec<Level> = Vec::with_capacity(HALVES);
    for &bit in &bits {
        if bit {
            halves.push(Level::Space);
            halves.push(Level::Mark);
        } else {
            halves.push(Level::Mark);
            halves.push(Level::Space);
        }
    }
    // Idle halves at either end never reach the wire.
    while halves.first() == Some(&Level::Space) {
        halves.remove(0);
    }
    while halves.last() == Some(&Level::Space) {
        halves.pop();
    }

    let mut durations: Vec<u32> = Vec::new();
    let mut run_level = halves[0];
    let mut run = 0u32;
    for &h in &halves {
        if h == run_level {
            run += HALF_US;
        } else {
            durations.push(run);
            run_level = h;
            run = HALF_US;
        }
    }
    durations.push(run);
    RawCapture::from_durations(&durations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_TOLERANCE_PCT as TOL;

    #[test]
    fn round_trips() {
        let sig = DecodedSignal::new(Protocol::Rc5, Some(0x05), 0x35);
        let frame = encode(&sig);
        assert_eq!(frame.pulses[0].level, Level::Mark);
        let decoded = decode(&frame.pulses, TOL).unwrap();
        assert_eq!(decoded.protocol, Protocol::Rc5);
        assert_eq!(decoded.address, Some(0x05));
        assert_eq!(decoded.command, 0x35);
    }

    #[test]
    fn extended_command_uses_field_bit() {
        let sig = DecodedSignal::new(Protocol::Rc5, Some(0x00), 0x4A);
        let decoded = decode(&encode(&sig).pulses, TOL).unwrap();
        assert_eq!(decoded.command, 0x4A);
    }

    #[test]
    fn frame_ending_in_zero_bit_round_trips() {
        // Command 0x02: last bit is zero, trailing space is invisible.
        let sig = DecodedSignal::new(Protocol::Rc5, Some(0x1F), 0x02);
        let decoded = decode(&encode(&sig).pulses, TOL).unwrap();
        assert_eq!(decoded.address, Some(0x1F));
        assert_eq!(decoded.command, 0x02);
    }

    #[test]
    fn non_biphase_timing_is_rejected() {
        let frame = RawCapture::from_durations(&[2_400, 600, 600, 600, 1_200]);
        assert!(decode(&frame.pulses, TOL).is_none());
    }
}
