// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Serial port link to the wired sensor node

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, SerialPort, SerialPortType, StopBits};
use tracing::{debug, info};

use super::{LinePort, LinkError, Parity, PortInfo};
use crate::config::LinkConfig;

/// Serial link with independent reader and writer handles.
///
/// The acquisition loop holds the reader lock for at most one poll timeout,
/// so valve commands on the writer never queue behind a blocked read.
pub struct SerialLink {
    name: String,
    reader: Mutex<Option<Box<dyn SerialPort>>>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    open: AtomicBool,
}

impl SerialLink {
    pub fn open(port: &str, config: &LinkConfig) -> Result<Self, LinkError> {
        let open_err = |e: serialport::Error| LinkError::Open {
            port: port.to_string(),
            reason: e.to_string(),
        };

        let reader = serialport::new(port, config.baud_rate)
            .timeout(config.poll_timeout())
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits))
            .flow_control(FlowControl::None)
            .open()
            .map_err(open_err)?;
        let writer = reader.try_clone().map_err(open_err)?;

        info!("Opened serial link {} at {} baud", port, config.baud_rate);

        Ok(Self {
            name: port.to_string(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        })
    }
}

impl LinePort for SerialLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut guard = self.reader.lock();
        let port = guard.as_mut().ok_or(LinkError::Closed)?;

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.writer.lock();
        let port = guard.as_mut().ok_or(LinkError::Closed)?;

        port.write_all(bytes)?;
        port.flush()?;
        debug!("Wrote {} byte(s) to {}", bytes.len(), self.name);
        Ok(())
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            self.writer.lock().take();
            self.reader.lock().take();
            info!("Closed serial link {}", self.name);
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> StopBits {
    if bits >= 2 { StopBits::Two } else { StopBits::One }
}

fn parity(p: Parity) -> serialport::Parity {
    match p {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

pub(super) fn list_ports() -> Vec<PortInfo> {
    match serialport::available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| PortInfo {
                kind: port_kind(&p.port_type).to_string(),
                name: p.port_name,
            })
            .collect(),
        Err(e) => {
            debug!("Port enumeration failed: {}", e);
            Vec::new()
        }
    }
}

fn port_kind(port_type: &SerialPortType) -> &'static str {
    match port_type {
        SerialPortType::UsbPort(_) => "USB",
        SerialPortType::BluetoothPort => "Bluetooth",
        SerialPortType::PciPort => "PCI",
        SerialPortType::Unknown => "Unknown",
    }
}
