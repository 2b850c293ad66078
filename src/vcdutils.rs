//! VCD dump and replay of captured pulse trains.

use std::fs::File;
use std::io;
use std::io::ErrorKind::InvalidInput;
use std::path::Path;

use vcd::{self, SimulationCommand, TimescaleUnit, Value};

use zapper_core::RawCapture;

pub struct VcdWriter<'a> {
    vcd: vcd::Writer<&'a mut File>,
    timestamp: u64,
    wire_id: vcd::IdCode,
}

impl<'a> VcdWriter<'a> {
    pub fn new(file: &'a mut File) -> Self {
        let vcd = vcd::Writer::new(file);

        Self {
            vcd,
            // leading idle, so the first frame starts off a settled line
            timestamp: 20_000,
            wire_id: vcd::IdCode::FIRST,
        }
    }

    pub fn init(&mut self) -> io::Result<()> {
        let writer = &mut self.vcd;

        writer.timescale(1, TimescaleUnit::US)?;
        writer.add_module("top")?;

        let id = writer.add_wire(1, "ir")?;
        self.wire_id = id;

        writer.upscope()?;
        writer.enddefinitions()?;

        writer.begin(SimulationCommand::Dumpvars)?;
        writer.change_scalar(id, Value::V0)?;
        writer.end()?;

        Ok(())
    }

    /// Append one capture, then leave a gap so frames stay distinct.
    pub fn write_capture(&mut self, capture: &RawCapture) -> io::Result<()> {
        let mut ts = self.timestamp;
        let mut high = true;
        self.write_value(ts, true)?;
        for duration in capture.durations() {
            ts += u64::from(duration);
            high = !high;
            self.write_value(ts, high)?;
        }
        self.timestamp = ts + 20_000;
        Ok(())
    }

    fn write_value(&mut self, ts: u64, high: bool) -> io::Result<()> {
        self.vcd.timestamp(ts)?;
        let value = if high { Value::V1 } else { Value::V0 };
        self.vcd.change_scalar(self.wire_id, value)?;

        Ok(())
    }
}

/// Read `top.ir` changes back as (microsecond timestamp, level) pairs,
/// level true meaning carrier on.
pub fn vcdfile_to_vec(path: &Path) -> io::Result<Vec<(u64, bool)>> {
    let file = File::open(path)?;
    let mut parser = vcd::Parser::new(&file);

    let header = parser.parse_header()?;
    let data = header
        .find_var(&["top", "ir"])
        .ok_or_else(|| io::Error::new(InvalidInput, "no wire top.ir"))?
        .code;

    let scale_us = match header.timescale {
        Some((ts, TimescaleUnit::US)) => u64::from(ts),
        Some((ts, TimescaleUnit::MS)) => u64::from(ts) * 1_000,
        _ => return Err(io::Error::new(InvalidInput, "unsupported timescale")),
    };

    let mut current_ts = 0;
    let mut res: Vec<(u64, bool)> = Vec::new();

    for command_result in parser {
        use vcd::Command::*;
        let command = command_result?;
        match command {
            ChangeScalar(i, v) if i == data => {
                let one = v == Value::V1;
                res.push((current_ts * scale_us.max(1), one));
            }
            Timestamp(ts) => current_ts = ts,
            _ => (),
        }
    }

    Ok(res)
}
