//! `serialport`-backed [`PortOpener`].
//!
//! Ports are opened 8N1 without flow control, matching what the touchscreen
//! firmware expects.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, warn};

use super::{LinePort, PortOpener};

/// Read/write timeout for an open link.
const IO_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout for the accessibility probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Device node prefixes of USB serial adapters on Linux.
const USB_SERIAL_PREFIXES: [&str; 2] = ["/dev/ttyUSB", "/dev/ttyACM"];

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn probe(&self, path: &str, baud_rate: u32) -> io::Result<()> {
        let port = serialport::new(path, baud_rate)
            .timeout(PROBE_TIMEOUT)
            .open()?;
        drop(port);
        Ok(())
    }

    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn LinePort>> {
        let port = serialport::new(path, baud_rate)
            .timeout(IO_TIMEOUT)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;
        debug!("opened {path} at {baud_rate} baud");
        Ok(Box::new(SerialLink { port }))
    }
}

struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl LinePort for SerialLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.port, buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.port)
    }
}

/// First USB serial adapter found on the system, if any.
pub fn detect_port() -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("failed to enumerate serial ports: {e}");
            return None;
        }
    };
    ports
        .into_iter()
        .map(|p| p.port_name)
        .find(|name| is_usb_serial(name))
}

fn is_usb_serial(name: &str) -> bool {
    USB_SERIAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
