//! Serial NDIR CO2 sensor driver.
//!
//! ## Protocol
//!
//! Line-oriented ASCII over a UART:
//!
//! | Direction | Bytes        | Meaning                                  |
//! |-----------|--------------|------------------------------------------|
//! | host →    | `K 2\r\n`    | switch to polling mode (sent once)       |
//! | host →    | `Z\r\n`      | request filtered concentration           |
//! | ← sensor  | `Z 01234\r\n`| raw count; leading space optional        |
//!
//! The raw count is scaled by a per-model multiplier to ppm, then to
//! percent: `percent = raw * multiplier / 10_000`.
//!
//! The port must have a read timeout configured.  A timeout with nothing
//! received maps to [`SensorError::NoResponse`].

use std::io::{ErrorKind, Read, Write};

use log::{debug, warn};

use crate::error::SensorError;

pub const POLLING_MODE_COMMAND: &[u8] = b"K 2\r\n";
pub const READ_COMMAND: &[u8] = b"Z\r\n";

/// Longest response line accepted before giving up on finding `\n`.
const MAX_RESPONSE: usize = 64;

/// Parse one `Z` response into a CO2 percentage rounded to 0.01.
pub fn parse_response(response: &str, multiplier: f32) -> Result<f32, SensorError> {
    let line = response
        .lines()
        .map(str::trim)
        .rfind(|l| l.starts_with('Z'))
        .ok_or(SensorError::Malformed)?;

    let raw: u32 = line[1..]
        .split_whitespace()
        .next()
        .ok_or(SensorError::Malformed)?
        .parse()
        .map_err(|_| SensorError::Malformed)?;

    let percent = raw as f32 * multiplier / 10_000.0;
    Ok((percent * 100.0).round() / 100.0)
}

/// Driver over any byte stream (a UART handle in production, a cursor in
/// tests).  Not internally synchronized: the owning adapter serializes
/// access.
pub struct Co2SerialSensor<P> {
    port: P,
    multiplier: f32,
}

impl<P: Read + Write> Co2SerialSensor<P> {
    pub fn new(port: P, multiplier: f32) -> Self {
        Self { port, multiplier }
    }

    /// Put the sensor in polling mode.  Any acknowledgement is discarded.
    pub fn init(&mut self) -> Result<(), SensorError> {
        self.send(POLLING_MODE_COMMAND)?;
        match self.read_line() {
            Ok(ack) => debug!("co2 sensor ack: {}", ack.trim()),
            Err(SensorError::NoResponse) => debug!("co2 sensor sent no ack"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Request and parse one concentration reading (%).
    pub fn read_percent(&mut self) -> Result<f32, SensorError> {
        self.send(READ_COMMAND)?;
        let response = self.read_line()?;
        parse_response(&response, self.multiplier).inspect_err(|_| {
            warn!("co2 sensor: unparseable response {:?}", response.trim());
        })
    }

    fn send(&mut self, command: &[u8]) -> Result<(), SensorError> {
        self.port
            .write_all(command)
            .and_then(|()| self.port.flush())
            .map_err(|_| SensorError::Bus)
    }

    fn read_line(&mut self) -> Result<String, SensorError> {
        let mut line = Vec::with_capacity(MAX_RESPONSE);
        let mut byte = [0u8; 1];
        while line.len() < MAX_RESPONSE {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return Err(SensorError::Bus),
            }
        }
        if line.is_empty() {
            return Err(SensorError::NoResponse);
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}
