//! NEC pulse-distance coding, plus the Samsung header variant.
//!
//! Frame: 9000/4500 header, 32 bits LSB-first (address, ~address, command,
//! ~command), 560 us trailer mark. Holding a button emits the distinct
//! 9000/2250/560 repeat frame instead of the full frame. Extended NEC
//! drops the address complement in favour of a 16-bit address; the command
//! complement always holds and is the checksum used here.

use super::near;
use crate::signal::{DecodedSignal, Level, Protocol, PulseEvent, RawCapture};

const HDR_MARK: u32 = 9_000;
const HDR_SPACE: u32 = 4_500;
const SAMSUNG_HDR_MARK: u32 = 4_500;
const BIT_MARK: u32 = 560;
const ZERO_SPACE: u32 = 560;
const ONE_SPACE: u32 = 1_690;
const REPEAT_SPACE: u32 = 2_250;

const BITS: usize = 32;
/// Header pair, one mark/space pair per bit, trailer mark.
const FRAME_PULSES: usize = 2 + BITS * 2 + 1;
const REPEAT_PULSES: usize = 3;

pub(super) fn decode(pulses: &[PulseEvent], tol: u32) -> Option<DecodedSignal> {
    if !header_matches(pulses, HDR_MARK, tol) {
        return None;
    }
    if pulses.len() == REPEAT_PULSES
        && near(pulses[1].duration_us, REPEAT_SPACE, tol)
        && near(pulses[2].duration_us, BIT_MARK, tol)
    {
        let mut sig = DecodedSignal::new(Protocol::Nec, None, 0);
        sig.repeat = true;
        return Some(sig);
    }
    if !near(pulses[1].duration_us, HDR_SPACE, tol) {
        return None;
    }
    let word = read_bits(&pulses[2..], tol)?;
    let [b0, b1, b2, b3] = word.to_le_bytes();
    if b3 != !b2 {
        // Command complement failed: not an NEC frame we trust.
        return None;
    }
    let address = if b1 == !b0 {
        u16::from(b0)
    } else {
        u16::from_le_bytes([b0, b1])
    };
    Some(DecodedSignal::new(
        Protocol::Nec,
        Some(address),
        u32::from(b2),
    ))
}

pub(super) fn decode_samsung(pulses: &[PulseEvent], tol: u32) -> Option<DecodedSignal> {
    if !header_matches(pulses, SAMSUNG_HDR_MARK, tol)
        || !near(pulses[1].duration_us, HDR_SPACE, tol)
    {
        return None;
    }
    let word = read_bits(&pulses[2..], tol)?;
    let [b0, b1, b2, b3] = word.to_le_bytes();
    if b3 != !b2 {
        return None;
    }
    // Samsung sends the address byte twice.
    let address = if b1 == b0 {
        u16::from(b0)
    } else {
        u16::from_le_bytes([b0, b1])
    };
    Some(DecodedSignal::new(
        Protocol::NecSamsung,
        Some(address),
        u32::from(b2),
    ))
}

fn header_matches(pulses: &[PulseEvent], hdr_mark: u32, tol: u32) -> bool {
    pulses.len() >= REPEAT_PULSES
        && pulses[0].level == Level::Mark
        && near(pulses[0].duration_us, hdr_mark, tol)
}

/// Reads the 32 data bits plus trailer from a pulse-distance bit stream.
fn read_bits(pulses: &[PulseEvent], tol: u32) -> Option<u32> {
    if pulses.len() != FRAME_PULSES - 2 {
        return None;
    }
    let mut word = 0u32;
    for i in 0..BITS {
        let mark = pulses[2 * i];
        let space = pulses[2 * i + 1];
        if mark.level != Level::Mark || !near(mark.duration_us, BIT_MARK, tol) {
            return None;
        }
        if near(space.duration_us, ONE_SPACE, tol) {
            word |= 1 << i;
        } else if !near(space.duration_us, ZERO_SPACE, tol) {
            return None;
        }
    }
    let trailer = pulses[BITS * 2];
    if !near(trailer.duration_us, BIT_MARK, tol) {
        return None;
    }
    Some(word)
}

pub(super) fn encode(signal: &DecodedSignal) -> RawCapture {
    if signal.repeat {
        return encode_repeat_frame();
    }
    let address = signal.address.unwrap_or(0);
    let [a0, a1] = address.to_le_bytes();
    let (b0, b1) = if address <= 0xFF { (a0, !a0) } else { (a0, a1) };
    encode_word(HDR_MARK, b0, b1, signal.command as u8)
}

pub(super) fn encode_samsung(signal: &DecodedSignal) -> RawCapture {
    let address = signal.address.unwrap_or(0);
    let [a0, a1] = address.to_le_bytes();
    let (b0, b1) = if address <= 0xFF { (a0, a0) } else { (a0, a1) };
    encode_word(SAMSUNG_HDR_MARK, b0, b1, signal.command as u8)
}

fn encode_word(hdr_mark: u32, b0: u8, b1: u8, cmd: u8) -> RawCapture {
    let word = u32::from_le_bytes([b0, b1, cmd, !cmd]);
    let mut durations = Vec::with_capacity(FRAME_PULSES);
    durations.push(hdr_mark);
    durations.push(HDR_SPACE);
    for i in 0..BITS {
        durations.push(BIT_MARK);
        durations.push(if word >> i & 1 == 1 { ONE_SPACE } else { ZERO_SPACE });
    }
    durations.push(BIT_MARK);
    RawCapture::from_durations(&durations)
}

pub(super) fn encode_repeat_frame() -> RawCapture {
    RawCapture::from_durations(&[HDR_MARK, REPEAT_SPACE, BIT_MARK])
}
