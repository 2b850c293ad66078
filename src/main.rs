use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use structopt::StructOpt;

mod capture;
mod irsend;
mod pigpio;
mod play;
mod playback;
mod record;
mod registry;
mod vcdutils;

use zapper_core::clock::SystemClock;
use zapper_core::{CaptureConfig, Protocol, SignalRegistry, Transceiver};

use crate::pigpio::{PigpioEdgeSource, PigpioTxLine};
use crate::registry::JsonRegistry;

#[derive(Debug, StructOpt)]
#[structopt(name = "zapper", about = "Record and replay infrared remote signals")]
struct Opt {
    /// pigpiod address
    #[structopt(long = "gpiod", default_value = "localhost:8888")]
    gpiod: String,
    /// Receiver GPIO (BCM numbering)
    #[structopt(long = "rx-gpio", default_value = "4")]
    rx_gpio: u8,
    /// Transmitter GPIO (BCM numbering)
    #[structopt(long = "tx-gpio", default_value = "17")]
    tx_gpio: u8,
    /// Signal registry file
    #[structopt(short = "f", long = "file", default_value = "codes.json", parse(from_os_str))]
    file: PathBuf,
    #[structopt(short, long)]
    debug: bool,
    #[structopt(subcommand)]
    cmd: CliCommand,
}

#[derive(StructOpt, Debug)]
enum CliCommand {
    /// Record named signals into the registry
    Record {
        /// Store the first press without asking for a confirming one
        #[structopt(long = "no-confirm")]
        no_confirm: bool,
        ids: Vec<String>,
    },
    /// Transmit named signals from the registry
    Play {
        /// Gap between signals in milliseconds
        #[structopt(long, default_value = "100")]
        gap: u64,
        ids: Vec<String>,
    },
    /// Capture live and print decodes. Optionally write a vcd file
    Capture {
        #[structopt(parse(from_os_str))]
        path: Option<PathBuf>,
    },
    /// Synthesize and transmit one command
    Transmit {
        /// nec nes sirc rc5
        protocol: String,
        addr: u16,
        cmd: u32,
        #[structopt(long, default_value = "1")]
        repeats: u32,
    },
    /// Decode a previously captured vcd file
    PlaybackVcd {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },
    /// List registry contents
    List,
}

fn main() -> anyhow::Result<()> {
    let Opt {
        gpiod,
        rx_gpio,
        tx_gpio,
        file,
        debug,
        cmd,
    } = Opt::from_args();

    let loglevel = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(loglevel)
        .init();

    match cmd {
        CliCommand::Record { no_confirm, ids } => {
            let mut trx = transceiver(&gpiod, rx_gpio, tx_gpio)?;
            let mut registry = JsonRegistry::new(&file);
            record::command_record(&mut trx, &mut registry, &ids, !no_confirm)
        }
        CliCommand::Play { gap, ids } => {
            let trx = transceiver(&gpiod, rx_gpio, tx_gpio)?;
            let registry = JsonRegistry::new(&file);
            play::command_play(&trx, &registry, &ids, gap)
        }
        CliCommand::Capture { path } => {
            let mut trx = transceiver(&gpiod, rx_gpio, tx_gpio)?;
            let out = path.map(File::create).transpose()?;
            capture::command_capture(&mut trx, debug, out)
        }
        CliCommand::Transmit {
            protocol,
            addr,
            cmd,
            repeats,
        } => {
            let protocol: Protocol = protocol
                .parse()
                .map_err(|_| anyhow!("unknown protocol '{}'", protocol))?;
            let trx = transceiver(&gpiod, rx_gpio, tx_gpio)?;
            irsend::transmit(&trx, protocol, addr, cmd, repeats)
        }
        CliCommand::PlaybackVcd { path } => playback::command(&path),
        CliCommand::List => {
            for name in JsonRegistry::new(&file).list()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn transceiver(gpiod: &str, rx_gpio: u8, tx_gpio: u8) -> anyhow::Result<Transceiver> {
    let clock = Arc::new(SystemClock::new()?);
    let cfg = CaptureConfig::default();

    let source = PigpioEdgeSource::new(gpiod, rx_gpio, cfg.glitch_us);
    let line = PigpioTxLine::new(gpiod, tx_gpio)?;

    Ok(Transceiver::new(
        clock,
        Box::new(source),
        Box::new(line),
        cfg,
    )?)
}
