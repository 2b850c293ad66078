use zapper_core::{DecodedSignal, Protocol, Transceiver};

pub fn transmit(
    trx: &Transceiver,
    protocol: Protocol,
    addr: u16,
    cmd: u32,
    repeats: u32,
) -> anyhow::Result<()> {
    let signal = DecodedSignal::new(protocol, Some(addr), cmd);

    log::info!("Sending command: {:?}", signal);

    trx.transmit_signal(&signal, repeats)?;
    trx.wait_idle();
    log::info!("Done");

    Ok(())
}
