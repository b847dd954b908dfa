// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Line protocol spoken by the sensor node.
//!
//! ASCII lines terminated by `\n` or `\r`. The first character selects the
//! payload shape:
//!
//! ```text
//! g<number>            light
//! h<number>            motion (0/1)
//! y<number>            gas (0/1 or intensity)
//! w<number>&s<number>! temperature & humidity
//! ```
//!
//! There is no framing CRC on the wire, so a malformed line is reported and
//! dropped without affecting the lines after it.

use thiserror::Error;

use crate::sensors::{Channel, SensorReading};

/// Default cap on an unterminated line
pub const DEFAULT_MAX_LINE: usize = 128;

/// A line that could not be decoded
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("empty line")]
    EmptyLine,

    #[error("unknown tag {0:?}")]
    UnknownTag(char),

    #[error("non-numeric {channel} payload {payload:?}")]
    InvalidNumber { channel: Channel, payload: String },

    #[error("malformed combined reading {0:?}")]
    MalformedCombined(String),

    #[error("line is not valid ASCII")]
    NotAscii,

    #[error("line exceeded {0} bytes without a terminator")]
    LineTooLong(usize),
}

/// Byte-at-a-time decoder
#[derive(Debug)]
pub struct ProtocolDecoder {
    buffer: Vec<u8>,
    max_line: usize,
    // Set after an overflow; everything up to the next terminator is dropped
    discarding: bool,
}

impl Default for ProtocolDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE)
    }
}

impl ProtocolDecoder {
    pub fn new(max_line: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_line),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Feed one byte. Returns a result once a line completes.
    ///
    /// Blank lines (e.g. the second half of `\r\n`) yield nothing.
    pub fn feed(&mut self, byte: u8) -> Option<Result<Vec<SensorReading>, DecodeError>> {
        if byte == b'\n' || byte == b'\r' {
            if self.discarding {
                self.discarding = false;
                return None;
            }
            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                self.buffer.clear();
                return None;
            }
            let result = parse_bytes(&self.buffer);
            self.buffer.clear();
            return Some(result);
        }

        if self.discarding {
            return None;
        }

        if self.buffer.len() >= self.max_line {
            self.buffer.clear();
            self.discarding = true;
            return Some(Err(DecodeError::LineTooLong(self.max_line)));
        }

        self.buffer.push(byte);
        None
    }

    /// Bytes held for the current unterminated line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_bytes(bytes: &[u8]) -> Result<Vec<SensorReading>, DecodeError> {
    if !bytes.is_ascii() {
        return Err(DecodeError::NotAscii);
    }
    let line = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotAscii)?;
    parse_line(line)
}

/// Parse one complete line (terminator already stripped)
pub fn parse_line(line: &str) -> Result<Vec<SensorReading>, DecodeError> {
    let line = line.trim();
    let mut chars = line.chars();
    let tag = match chars.next() {
        Some(c) => c,
        None => return Err(DecodeError::EmptyLine),
    };
    let payload = chars.as_str();

    match tag {
        'g' => single(Channel::Light, payload),
        'h' => single(Channel::MotionDetected, payload),
        'y' => single(Channel::GasDetected, payload),
        'w' => combined(line),
        other => Err(DecodeError::UnknownTag(other)),
    }
}

fn single(channel: Channel, payload: &str) -> Result<Vec<SensorReading>, DecodeError> {
    Ok(vec![SensorReading::new(channel, number(channel, payload)?)])
}

fn combined(line: &str) -> Result<Vec<SensorReading>, DecodeError> {
    let mut parts = line.split('&');
    let (left, right) = match (parts.next(), parts.next(), parts.next()) {
        (Some(l), Some(r), None) => (l, r),
        _ => return Err(DecodeError::MalformedCombined(line.to_string())),
    };

    // Left keeps its `w`, right loses whatever leads it plus the trailing `!`
    let temperature = number(Channel::Temperature, &left[1..])?;

    let mut right_chars = right.chars();
    if right_chars.next().is_none() {
        return Err(DecodeError::MalformedCombined(line.to_string()));
    }
    let humidity = number(Channel::Humidity, right_chars.as_str().trim_end_matches('!'))?;

    Ok(vec![
        SensorReading::new(Channel::Temperature, temperature),
        SensorReading::new(Channel::Humidity, humidity),
    ])
}

fn number(channel: Channel, payload: &str) -> Result<f64, DecodeError> {
    let invalid = || DecodeError::InvalidNumber {
        channel,
        payload: payload.to_string(),
    };
    let value: f64 = payload.trim().parse().map_err(|_| invalid())?;
    if value.is_finite() { Ok(value) } else { Err(invalid()) }
}
