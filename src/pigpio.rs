//! pigpiod socket client.
//!
//! The daemon speaks 16-byte little-endian `{cmd, p1, p2, p3}` commands,
//! each answered by a 16-byte echo whose last word is the result. Edge
//! reports arrive on a second connection opened with NOIB: 12-byte
//! `{seqno, flags, tick, level}` records where `tick` is the daemon's
//! microsecond clock. That tick feeds the core's edge channel directly, so
//! receive timing does not depend on local socket latency.
//!
//! Transmission goes the other way entirely: a 38 kHz carrier has a 13 us
//! half-period, far below a socket round trip, so frames are flattened
//! into daemon waveforms (WVAG/WVCRE/WVTX) and the daemon paces them.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};

use zapper_core::gpio::{Edge, EdgeSource, TxLine, EDGE_QUEUE_DEPTH};
use zapper_core::{Error, Level, RawCapture};

const CMD_MODES: u32 = 0;
const CMD_READ: u32 = 3;
const CMD_WRITE: u32 = 4;
const CMD_NB: u32 = 19;
const CMD_NC: u32 = 21;
const CMD_WVCLR: u32 = 27;
const CMD_WVAG: u32 = 28;
const CMD_WVBSY: u32 = 32;
const CMD_WVCRE: u32 = 49;
const CMD_WVDEL: u32 = 50;
const CMD_WVTX: u32 = 51;
const CMD_FG: u32 = 97;
const CMD_NOIB: u32 = 99;

/// Pulses per WVAG call, keeping each extension payload under 16 KiB.
const WAVE_CHUNK_PULSES: usize = 1_024;

const MODE_INPUT: u32 = 0;
const MODE_OUTPUT: u32 = 1;

/// Watchdog and event reports carry flags; level reports have none.
const NTFY_FLAGS: u16 = 0xffe0;

struct Daemon {
    stream: TcpStream,
}

impl Daemon {
    fn connect(addr: &str) -> anyhow::Result<Daemon> {
        let stream = TcpStream::connect(addr)
            .with_context(|| format!("connecting to pigpiod at {}", addr))?;
        stream.set_nodelay(true)?;
        Ok(Daemon { stream })
    }

    fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> anyhow::Result<i32> {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&cmd.to_le_bytes());
        buf[4..8].copy_from_slice(&p1.to_le_bytes());
        buf[8..12].copy_from_slice(&p2.to_le_bytes());
        self.stream.write_all(&buf)?;

        let mut reply = [0u8; 16];
        self.stream.read_exact(&mut reply)?;
        let res = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
        if res < 0 && cmd != CMD_NOIB {
            bail!("pigpiod command {} failed: {}", cmd, res);
        }
        Ok(res)
    }

    /// Command with an extension payload; `p3` carries the payload size.
    fn command_ext(&mut self, cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> anyhow::Result<i32> {
        let mut buf = Vec::with_capacity(16 + ext.len());
        buf.extend_from_slice(&cmd.to_le_bytes());
        buf.extend_from_slice(&p1.to_le_bytes());
        buf.extend_from_slice(&p2.to_le_bytes());
        buf.extend_from_slice(&(ext.len() as u32).to_le_bytes());
        buf.extend_from_slice(ext);
        self.stream.write_all(&buf)?;

        let mut reply = [0u8; 16];
        self.stream.read_exact(&mut reply)?;
        let res = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
        if res < 0 {
            bail!("pigpiod command {} failed: {}", cmd, res);
        }
        Ok(res)
    }
}

/// Transmit line on one GPIO, driven over the command socket.
pub struct PigpioTxLine {
    daemon: Daemon,
    gpio: u8,
}

impl PigpioTxLine {
    pub fn new(addr: &str, gpio: u8) -> anyhow::Result<PigpioTxLine> {
        let mut daemon = Daemon::connect(addr)?;
        daemon.command(CMD_MODES, u32::from(gpio), MODE_OUTPUT)?;
        daemon.command(CMD_WRITE, u32::from(gpio), 0)?;
        Ok(PigpioTxLine { daemon, gpio })
    }

    /// Hand a whole frame to the daemon as one waveform and block until it
    /// has been sent.
    fn send_wave(&mut self, frame: &RawCapture, carrier_khz: u32) -> anyhow::Result<()> {
        let pulses = wave_pulses(self.gpio, frame, carrier_khz);

        self.daemon.command(CMD_WVCLR, 0, 0)?;
        for chunk in pulses.chunks(WAVE_CHUNK_PULSES) {
            self.daemon.command_ext(CMD_WVAG, 0, 0, &encode_wave(chunk))?;
        }
        let wave_id = self.daemon.command(CMD_WVCRE, 0, 0)? as u32;
        self.daemon.command(CMD_WVTX, wave_id, 0)?;
        while self.daemon.command(CMD_WVBSY, 0, 0)? != 0 {
            thread::sleep(Duration::from_millis(2));
        }
        self.daemon.command(CMD_WVDEL, wave_id, 0)?;
        Ok(())
    }
}

impl TxLine for PigpioTxLine {
    fn set_active(&mut self, active: bool) {
        let level = if active { 1 } else { 0 };
        if let Err(err) = self.daemon.command(CMD_WRITE, u32::from(self.gpio), level) {
            log::error!("tx write failed: {}", err);
        }
    }

    // Per-toggle writes cannot pace a carrier over a socket; the frame
    // always goes out as a daemon waveform.
    fn send_frame(&mut self, frame: &RawCapture, carrier_khz: u32) -> bool {
        if let Err(err) = self.send_wave(frame, carrier_khz) {
            log::error!("waveform transmit failed: {}", err);
        }
        true
    }
}

/// One daemon wave pulse: set mask, clear mask, delay in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WavePulse {
    on: u32,
    off: u32,
    delay: u32,
}

/// Flatten a frame into wave pulses, modulating marks at `carrier_khz`.
fn wave_pulses(gpio: u8, frame: &RawCapture, carrier_khz: u32) -> Vec<WavePulse> {
    let mask = 1u32 << gpio;
    let mut wf = Vec::new();
    for pulse in frame.pulses.iter() {
        match pulse.level {
            Level::Mark if carrier_khz > 0 => {
                carrier(mask, carrier_khz, pulse.duration_us, &mut wf)
            }
            Level::Mark => wf.push(WavePulse { on: mask, off: 0, delay: pulse.duration_us }),
            Level::Space => wf.push(WavePulse { on: 0, off: mask, delay: pulse.duration_us }),
        }
    }
    // An unmodulated trailing mark would leave the pin high after the wave.
    if wf.last().map(|p| p.on != 0).unwrap_or(false) {
        wf.push(WavePulse { on: 0, off: mask, delay: 1 });
    }
    wf
}

/// Carrier square wave for one mark. Each cycle's off time is fitted to a
/// cumulative target so rounding never drifts over a long mark.
fn carrier(mask: u32, khz: u32, micros: u32, wf: &mut Vec<WavePulse>) {
    let khz = u64::from(khz);
    let cycles = (u64::from(micros) * khz + 500) / 1_000;
    let on = ((500 + khz / 2) / khz) as u32;
    let mut sofar = 0u64;
    for c in 1..=cycles {
        let target = (c * 1_000 + khz / 2) / khz;
        sofar += u64::from(on);
        let off = target.saturating_sub(sofar) as u32;
        sofar = target;
        wf.push(WavePulse { on: mask, off: 0, delay: on });
        wf.push(WavePulse { on: 0, off: mask, delay: off });
    }
}

/// WVAG extension payload: three little-endian words per pulse.
fn encode_wave(pulses: &[WavePulse]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pulses.len() * 12);
    for p in pulses {
        bytes.extend_from_slice(&p.on.to_le_bytes());
        bytes.extend_from_slice(&p.off.to_le_bytes());
        bytes.extend_from_slice(&p.delay.to_le_bytes());
    }
    bytes
}

impl Drop for PigpioTxLine {
    fn drop(&mut self) {
        let _ = self.daemon.command(CMD_WRITE, u32::from(self.gpio), 0);
    }
}

/// Receive line on one GPIO, fed by a pigpiod notification stream.
pub struct PigpioEdgeSource {
    addr: String,
    gpio: u8,
    glitch_us: u32,
    control: Option<(Daemon, u32)>,
}

impl PigpioEdgeSource {
    pub fn new(addr: &str, gpio: u8, glitch_us: u32) -> PigpioEdgeSource {
        PigpioEdgeSource {
            addr: addr.to_owned(),
            gpio,
            glitch_us,
            control: None,
        }
    }

    fn open_notify(&mut self, sender: SyncSender<Edge>) -> anyhow::Result<()> {
        let mut control = Daemon::connect(&self.addr)?;
        control.command(CMD_MODES, u32::from(self.gpio), MODE_INPUT)?;
        control.command(CMD_FG, u32::from(self.gpio), self.glitch_us)?;

        // The daemon only reports level changes, so the resting level has
        // to be read up front or the first edge would be misread.
        let level = control.command(CMD_READ, u32::from(self.gpio), 0)?;

        // The notification handle belongs to the connection that issued
        // NOIB; reports then arrive on that same connection.
        let mut notify = Daemon::connect(&self.addr)?;
        let handle = notify.command(CMD_NOIB, 0, 0)?;
        if handle < 0 {
            bail!("pigpiod NOIB failed: {}", handle);
        }
        control.command(CMD_NB, handle as u32, 1u32 << self.gpio)?;

        let mut tracker = EdgeTracker::new(self.gpio, level != 0);
        let mut stream = notify.stream;
        thread::Builder::new()
            .name("pigpio-notify".into())
            .spawn(move || {
                if let Err(err) = report_loop(&mut stream, &mut tracker, &sender) {
                    log::warn!("notification stream ended: {}", err);
                }
            })
            .context("spawning notification reader")?;

        self.control = Some((control, handle as u32));
        Ok(())
    }
}

impl EdgeSource for PigpioEdgeSource {
    fn subscribe(&mut self) -> Result<Receiver<Edge>, Error> {
        if self.control.is_some() {
            return Err(Error::AlreadyRegistered);
        }
        let (tx, rx) = sync_channel(EDGE_QUEUE_DEPTH);
        self.open_notify(tx).map_err(|e| Error::Gpio(e.to_string()))?;
        Ok(rx)
    }

    fn unsubscribe(&mut self) {
        if let Some((mut control, handle)) = self.control.take() {
            let _ = control.command(CMD_NC, handle, 0);
        }
    }
}

impl Drop for PigpioEdgeSource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Turns 12-byte level reports into edges. Ticks are u32 microseconds
/// wrapping every ~72 minutes; the wrap is unfolded into a monotonic u64.
/// The line level is seeded from a READ at subscribe time, so the very
/// first change report already counts as an edge.
struct EdgeTracker {
    mask: u32,
    last_level: bool,
    last_tick: Option<u32>,
    clock_us: u64,
}

impl EdgeTracker {
    fn new(gpio: u8, initial_level: bool) -> EdgeTracker {
        EdgeTracker {
            mask: 1u32 << gpio,
            last_level: initial_level,
            last_tick: None,
            clock_us: 0,
        }
    }

    fn update(&mut self, flags: u16, tick: u32, level: u32) -> Option<Edge> {
        let prev = self.last_tick.replace(tick).unwrap_or(tick);
        self.clock_us += u64::from(tick.wrapping_sub(prev));

        if flags & NTFY_FLAGS != 0 {
            // Watchdog or keep-alive, not a level change.
            return None;
        }

        let rising = level & self.mask != 0;
        if rising == self.last_level {
            return None;
        }
        self.last_level = rising;

        Some(Edge {
            timestamp_us: self.clock_us,
            rising,
        })
    }
}

fn report_loop(
    stream: &mut TcpStream,
    tracker: &mut EdgeTracker,
    sender: &SyncSender<Edge>,
) -> std::io::Result<()> {
    loop {
        let mut report = [0u8; 12];
        stream.read_exact(&mut report)?;

        let flags = u16::from_le_bytes([report[2], report[3]]);
        let tick = u32::from_le_bytes([report[4], report[5], report[6], report[7]]);
        let level = u32::from_le_bytes([report[8], report[9], report[10], report[11]]);

        if let Some(edge) = tracker.update(flags, tick, level) {
            match sender.try_send(edge) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => log::warn!("edge queue full, dropping edge"),
                Err(TrySendError::Disconnected(_)) => return Ok(()),
            }
        }
    }
}
