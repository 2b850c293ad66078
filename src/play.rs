//! Replay of named signals from the registry.

use std::thread;
use std::time::Duration;

use zapper_core::{SignalRegistry, Transceiver};

pub fn command_play(
    trx: &Transceiver,
    registry: &dyn SignalRegistry,
    ids: &[String],
    gap_ms: u64,
) -> anyhow::Result<()> {
    for (i, id) in ids.iter().enumerate() {
        let signal = registry.load(id)?;

        if i > 0 {
            thread::sleep(Duration::from_millis(gap_ms));
        }

        log::info!("sending '{}' ({:?})", id, signal.protocol);
        trx.transmit_signal(&signal, 1)?;
        trx.wait_idle();
    }

    Ok(())
}
