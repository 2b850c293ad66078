//! Interactive recording of named signals.
//!
//! Each key is captured once and, unless confirmation is disabled, must be
//! pressed a second time. Two presses that decode to the same command, or
//! whose raw pulse trains agree within tolerance, are accepted; raw pairs
//! are averaged so the stored train is cleaner than either press alone.

use std::time::Duration;

use zapper_core::{codec, DecodedSignal, Error, Protocol, SignalRegistry, Transceiver};

/// irrp-style comparison window between two presses of the same key.
const CONFIRM_TOLERANCE_PCT: u32 = 15;

/// Give up waiting for a key press after this long.
const PRESS_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_TRIES: u32 = 3;

pub fn command_record(
    trx: &mut Transceiver,
    registry: &mut dyn SignalRegistry,
    ids: &[String],
    confirm: bool,
) -> anyhow::Result<()> {
    println!("Recording");

    for id in ids {
        println!("Press key for '{}'", id);
        let first = capture_press(trx)?;

        if !confirm {
            registry.store(id, &first)?;
            println!("Okay");
            continue;
        }

        let mut tries = 0;
        loop {
            println!("Press key for '{}' to confirm", id);
            let second = capture_press(trx)?;

            if let Some(agreed) = reconcile(&first, &second) {
                registry.store(id, &agreed)?;
                println!("Okay");
                break;
            }

            tries += 1;
            if tries >= MAX_TRIES {
                println!("Giving up on key '{}'", id);
                break;
            }
            println!("No match");
        }
    }

    Ok(())
}

/// One keypress worth of signal: noise and hold frames are skipped, the
/// raw fallback of an unknown signal is normalised before use.
fn capture_press(trx: &mut Transceiver) -> Result<DecodedSignal, Error> {
    loop {
        match trx.capture_signal(Some(PRESS_TIMEOUT)) {
            Ok(signal) if signal.repeat => {
                log::debug!("hold frame, waiting for a fresh press");
            }
            Ok(mut signal) => {
                if let Some(raw) = signal.raw_fallback.as_mut() {
                    raw.normalise(codec::DEFAULT_TOLERANCE_PCT);
                }
                return Ok(signal);
            }
            Err(Error::CaptureTooShort(n)) => {
                log::debug!("short code ({} pulses), probably a repeat, try again", n);
            }
            Err(err) => return Err(err),
        }
    }
}

/// The signal to store when two presses agree, `None` when they do not.
fn reconcile(first: &DecodedSignal, second: &DecodedSignal) -> Option<DecodedSignal> {
    if first.protocol != Protocol::Raw || second.protocol != Protocol::Raw {
        return if first.same_command(second) {
            Some(first.clone())
        } else {
            None
        };
    }

    let mut merged = first.raw_fallback.clone()?;
    if !merged.merge_matching(second.raw_fallback.as_ref()?, CONFIRM_TOLERANCE_PCT) {
        return None;
    }
    Some(DecodedSignal::raw(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zapper_core::RawCapture;

    #[test]
    fn decoded_presses_must_match_exactly() {
        let a = DecodedSignal::new(Protocol::Nec, Some(1), 2);
        let b = DecodedSignal::new(Protocol::Nec, Some(1), 2);
        let c = DecodedSignal::new(Protocol::Nec, Some(1), 3);
        assert_eq!(reconcile(&a, &b), Some(a.clone()));
        assert_eq!(reconcile(&a, &c), None);
    }

    #[test]
    fn raw_presses_average_within_tolerance() {
        let a = DecodedSignal::raw(RawCapture::from_durations(&[1_000, 500, 1_000]));
        let b = DecodedSignal::raw(RawCapture::from_durations(&[1_040, 480, 1_000]));
        let merged = reconcile(&a, &b).unwrap();
        let durations: Vec<u32> = merged.raw_fallback.unwrap().durations().collect();
        assert_eq!(durations, vec![1_020, 490, 1_000]);
    }

    #[test]
    fn raw_presses_outside_tolerance_do_not_match() {
        let a = DecodedSignal::raw(RawCapture::from_durations(&[1_000, 500, 1_000]));
        let b = DecodedSignal::raw(RawCapture::from_durations(&[1_400, 500, 1_000]));
        assert_eq!(reconcile(&a, &b), None);
    }
}
