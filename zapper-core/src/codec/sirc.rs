//! Sony SIRC-12 pulse-length coding.
//!
//! Frame: 2400/600 header, then 12 bits LSB-first, 7 command + 5 address.
//! Bit value lives in the mark width (1200 us one, 600 us zero) with a
//! fixed 600 us space between bits. There is no checksum; the bit count is
//! the only validation. The last bit ends on its mark, the inter-bit space
//! after it being indistinguishable from the frame gap.

use super::near;
use crate::signal::{DecodedSignal, Level, Protocol, PulseEvent, RawCapture};

const HDR_MARK: u32 = 2_400;
const BIT_SPACE: u32 = 600;
const ZERO_MARK: u32 = 600;
const ONE_MARK: u32 = 1_200;

const BITS: usize = 12;
const CMD_BITS: usize = 7;
/// Header pair plus one mark/space pair per bit, trailing space absent.
const FRAME_PULSES: usize = 2 + BITS * 2 - 1;

pub(super) fn decode(pulses: &[PulseEvent], tol: u32) -> Option<DecodedSignal> {
    if pulses.len() != FRAME_PULSES
        || pulses[0].level != Level::Mark
        || !near(pulses[0].duration_us, HDR_MARK, tol)
        || !near(pulses[1].duration_us, BIT_SPACE, tol)
    {
        return None;
    }

    let mut word = 0u16;
    for i in 0..BITS {
        let mark = pulses[2 + 2 * i];
        if mark.level != Level::Mark {
            return None;
        }
        if near(mark.duration_us, ONE_MARK, tol) {
            word |= 1 << i;
        } else if !near(mark.duration_us, ZERO_MARK, tol) {
            return None;
        }
        if i + 1 < BITS && !near(pulses[3 + 2 * i].duration_us, BIT_SPACE, tol) {
            return None;
        }
    }

    let command = u32::from(word) & ((1 << CMD_BITS) - 1);
    let address = word >> CMD_BITS;
    Some(DecodedSignal::new(Protocol::Sirc, Some(address), command))
}

pub(super) fn encode(signal: &DecodedSignal) -> RawCapture {
    let word = (signal.command as u16 & 0x7F)
        | ((signal.address.unwrap_or(0) & 0x1F) << CMD_BITS);

    let mut durations = Vec::with_capacity(FRAME_PULSES);
    durations.push(HDR_MARK);
    durations.push(BIT_SPACE);
    for i in 0..BITS {
        durations.push(if word >> i & 1 == 1 { ONE_MARK } else { ZERO_MARK });
        if i + 1 < BITS {
            durations.push(BIT_SPACE);
        }
    }
    RawCapture::from_durations(&durations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_TOLERANCE_PCT as TOL;

    #[test]
    fn round_trips() {
        let sig = DecodedSignal::new(Protocol::Sirc, Some(0x01), 0x15);
        let frame = encode(&sig);
        assert_eq!(frame.len(), FRAME_PULSES);
        let decoded = decode(&frame.pulses, TOL).unwrap();
        assert_eq!(decoded.protocol, Protocol::Sirc);
        assert_eq!(decoded.address, Some(0x01));
        assert_eq!(decoded.command, 0x15);
    }

    #[test]
    fn wrong_bit_count_is_rejected() {
        let frame = encode(&DecodedSignal::new(Protocol::Sirc, Some(1), 1));
        assert!(decode(&frame.pulses[..FRAME_PULSES - 2], TOL).is_none());
    }
}
