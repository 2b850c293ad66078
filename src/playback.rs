//! Offline decoding of previously captured vcd files.

use std::path::Path;
use std::sync::mpsc;

use zapper_core::clock::SimClock;
use zapper_core::gpio::Edge;
use zapper_core::{codec, CaptureConfig, Error, Protocol, PulseCapturer};

use crate::vcdutils::vcdfile_to_vec;

pub fn command(path: &Path) -> anyhow::Result<()> {
    let changes = vcdfile_to_vec(path)?;
    log::info!("{}: {} value changes", path.display(), changes.len());

    // Replay the file through the normal capture pipeline. The vcd wire is
    // carrier-on = high, so the line is not active-low here.
    let (tx, rx) = mpsc::channel::<Edge>();
    for (timestamp_us, rising) in changes {
        tx.send(Edge { timestamp_us, rising })?;
    }
    drop(tx);

    let clock = SimClock::new();
    let mut capturer = PulseCapturer::new(CaptureConfig {
        active_low: false,
        ..CaptureConfig::default()
    });

    loop {
        match capturer.next_capture(&clock, &rx, None) {
            Ok(capture) => {
                let signal = codec::decode(capture);
                match signal.protocol {
                    Protocol::Raw => println!("No protocol matched"),
                    protocol => println!(
                        "{}\tAddr: {}\tCmd: {}{}",
                        protocol,
                        signal.address.map(i64::from).unwrap_or(-1),
                        signal.command,
                        if signal.repeat { "\t(repeat)" } else { "" },
                    ),
                }
            }
            Err(Error::CaptureTooShort(n)) => log::debug!("skipped {} pulses of noise", n),
            Err(Error::SourceClosed) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}
