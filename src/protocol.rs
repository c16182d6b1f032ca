//! Text line protocol spoken with each building simulator.
//!
//! One round per tick: the simulator sends a header (its time token, or
//! `TERMINATE`), a time line, then name/value line pairs terminated by an
//! empty line. The supervisor answers with a fixed-shape `SET` command
//! block and flushes immediately — the simulator blocks on receipt, so
//! buffering the reply would deadlock the pairing.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::warn;

/// Header marking global run termination.
pub const TERMINATE: &str = "TERMINATE";

/// Recognized inbound variable names. Anything else is a reserved
/// placeholder and is ignored, which lets simulators grow their variable
/// set without breaking older supervisors.
pub const VAR_OUTDOOR_TEMP: &str = "epSendOutdoorAirTemp";
pub const VAR_INDOOR_TEMP: &str = "epSendZoneMeanAirTemp";

/// Outbound variable names of the command block.
pub const VAR_SET_COOLING: &str = "epGetStartCooling";
pub const VAR_SET_HEATING: &str = "epGetStartHeating";
pub const VAR_DISHWASHER: &str = "dishwasherSchedule";

/// Protocol-level failure. Fatal for the owning session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the connection in the middle of an exchange.
    #[error("connection closed mid-exchange")]
    ShortRead,
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// One tick's worth of inbound sensor data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorBlock {
    /// True when the header line was the `TERMINATE` marker. The rest of
    /// the block is still consumed so the exchange stays in sync.
    pub terminate: bool,
    /// The simulator's reported time, echoed back in the command block.
    pub time: String,
    pub outdoor_temp: Option<f64>,
    pub indoor_temp: Option<f64>,
}

/// Reads one line, accepting LF or CRLF endings.
fn read_line<R: BufRead>(reader: &mut R) -> Result<String, ProtocolError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(ProtocolError::ShortRead);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

fn parse_value(name: &str, value: &str) -> Option<f64> {
    match value.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value, "unparseable sensor value, keeping previous reading");
            None
        }
    }
}

/// Reads one inbound sensor block.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortRead`] when the stream ends mid-block.
/// Malformed numeric values are a logged warning, not an error; the
/// corresponding field stays `None` and the session keeps its previous
/// reading.
pub fn read_sensor_block<R: BufRead>(reader: &mut R) -> Result<SensorBlock, ProtocolError> {
    let header = read_line(reader)?;
    let mut block = SensorBlock {
        terminate: header == TERMINATE,
        time: read_line(reader)?,
        ..SensorBlock::default()
    };

    loop {
        let name = read_line(reader)?;
        if name.is_empty() {
            break;
        }
        let value = read_line(reader)?;
        match name.as_str() {
            VAR_OUTDOOR_TEMP => block.outdoor_temp = parse_value(&name, &value),
            VAR_INDOOR_TEMP => block.indoor_temp = parse_value(&name, &value),
            // Reserved names (humidity, energy counters, ...) pass through.
            _ => {}
        }
    }

    Ok(block)
}

/// Writes the outbound command block and flushes.
pub fn write_command_block<W: Write>(
    writer: &mut W,
    time: &str,
    cool_setpoint: &str,
    heat_setpoint: &str,
    dishwasher: u8,
) -> io::Result<()> {
    write!(
        writer,
        "SET\r\n{time}\r\n{VAR_SET_COOLING}\r\n{cool_setpoint}\r\n\
         {VAR_SET_HEATING}\r\n{heat_setpoint}\r\n{VAR_DISHWASHER}\r\n{dishwasher}\r\n\r\n"
    )?;
    writer.flush()
}
