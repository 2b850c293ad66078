use std::fs::File;

use zapper_core::{codec, Error, Protocol, Transceiver};

use crate::vcdutils::VcdWriter;

pub fn command_capture(
    trx: &mut Transceiver,
    verbose: bool,
    mut capture_file: Option<File>,
) -> anyhow::Result<()> {
    log::info!("Capturing");

    let mut vcd = capture_file.as_mut().map(VcdWriter::new);

    if let Some(vcd) = vcd.as_mut() {
        vcd.init()?;
    }

    loop {
        match trx.capture_raw(None) {
            Ok(capture) => {
                log::debug!("got {} pulses", capture.len());

                if verbose {
                    println!(
                        "len: {}\ndata: {:?}",
                        capture.len(),
                        capture.durations().collect::<Vec<_>>()
                    );
                }

                if let Some(vcd) = vcd.as_mut() {
                    vcd.write_capture(&capture)?;
                }

                let signal = codec::decode(capture);
                match signal.protocol {
                    Protocol::Raw => {
                        let pulses = signal.raw_fallback.as_ref().map(|c| c.len()).unwrap_or(0);
                        println!("No protocol matched, kept {} raw pulses", pulses);
                    }
                    protocol => {
                        println!(
                            "{}\tAddr: {}\tCmd: {}{}",
                            protocol,
                            signal.address.map(i64::from).unwrap_or(-1),
                            signal.command,
                            if signal.repeat { "\t(repeat)" } else { "" },
                        );
                    }
                }
            }
            Err(Error::CaptureTooShort(n)) => {
                log::debug!("discarded {} pulses of noise", n);
            }
            Err(Error::CaptureOverflow) => {
                log::warn!("capture overflowed, signal too long");
            }
            Err(err) => return Err(err.into()),
        }
    }
}
