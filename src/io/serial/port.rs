// src/io/serial/port.rs
//
// Serial transport seam. The bridge talks to devices through `SerialBackend`
// (enumerate + open) and `SerialLink` (one open handle). `SystemSerial` is the
// serialport-backed implementation used by the binary.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

use super::utils::{
    to_serialport_data_bits, to_serialport_parity, to_serialport_stop_bits, LineSettings,
};
use crate::io::error::IoError;

// ============================================================================
// Types
// ============================================================================

/// One enumerated serial port
#[derive(Clone, Debug, PartialEq)]
pub struct PortDescriptor {
    /// System identifier used to open the port (`/dev/ttyACM0`, `COM3`)
    pub port_name: String,
    /// Human-readable name built from the USB strings or the port type
    pub description: String,
    /// "USB", "Bluetooth", "PCI" or "Unknown"
    pub port_type: String,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortDescriptor {
    /// Descriptor with only a name and description, as produced by virtual devices
    pub fn named(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        PortDescriptor {
            port_name: port_name.into(),
            description: description.into(),
            port_type: "Unknown".to_string(),
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// USB identity as lowercase `vid:pid`
    pub fn usb_id(&self) -> Option<String> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(format!("{:04x}:{:04x}", vid, pid)),
            _ => None,
        }
    }

    /// Port type followed by the USB id and serial number when known
    pub fn details(&self) -> String {
        let mut parts = vec![self.port_type.clone()];
        parts.extend(self.usb_id());
        if let Some(ref serial) = self.serial_number {
            parts.push(format!("SN {}", serial));
        }
        parts.join(", ")
    }
}

/// An open serial device.
///
/// Reads block for at most the backend's read timeout and report the timeout
/// as `ErrorKind::TimedOut`. Dropping the last handle closes the device.
pub trait SerialLink: Send {
    fn name(&self) -> &str;

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Write the whole buffer and flush it to the device.
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Second handle to the same device so reads and writes can run on
    /// different threads without a lock.
    fn try_clone_link(&self) -> std::io::Result<Box<dyn SerialLink>>;
}

/// Source of serial devices
pub trait SerialBackend: Send + Sync {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, IoError>;

    fn open(&self, port: &PortDescriptor) -> Result<Box<dyn SerialLink>, IoError>;
}

// ============================================================================
// serialport implementation
// ============================================================================

/// Backend over the host's serial ports
#[derive(Clone, Debug)]
pub struct SystemSerial {
    line: LineSettings,
    read_timeout: Duration,
}

impl SystemSerial {
    pub fn new(line: LineSettings, read_timeout: Duration) -> Self {
        SystemSerial { line, read_timeout }
    }
}

impl SerialBackend for SystemSerial {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, IoError> {
        list_serial_ports()
    }

    fn open(&self, port: &PortDescriptor) -> Result<Box<dyn SerialLink>, IoError> {
        let handle = serialport::new(&port.port_name, self.line.baud_rate)
            .data_bits(to_serialport_data_bits(self.line.data_bits))
            .stop_bits(to_serialport_stop_bits(self.line.stop_bits))
            .parity(to_serialport_parity(&self.line.parity))
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| IoError::connection(&port.port_name, e.to_string()))?;

        tlog!(
            "[serial] Opened {} ({}) at {}",
            port.port_name,
            port.description,
            self.line.describe()
        );

        Ok(Box::new(SystemLink {
            name: port.port_name.clone(),
            port: handle,
        }))
    }
}

struct SystemLink {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn try_clone_link(&self) -> std::io::Result<Box<dyn SerialLink>> {
        let port = self.port.try_clone().map_err(std::io::Error::from)?;
        Ok(Box::new(SystemLink {
            name: self.name.clone(),
            port,
        }))
    }
}

// ============================================================================
// Port listing
// ============================================================================

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing connections.
/// The tty (terminal) devices block on open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<PortDescriptor>, IoError> {
    let ports = serialport::available_ports().map_err(|e| IoError::enumerate(e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => {
                    ("PCI".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            let description =
                describe_port(manufacturer.as_deref(), product.as_deref(), &port_type);
            PortDescriptor {
                port_name: p.port_name,
                description,
                port_type,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}

/// Human-readable port name: "<manufacturer> <product>" when the USB strings are
/// known, otherwise "<type> serial port".
pub fn describe_port(manufacturer: Option<&str>, product: Option<&str>, port_type: &str) -> String {
    let parts: Vec<&str> = [manufacturer, product]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        format!("{} serial port", port_type)
    } else {
        parts.join(" ")
    }
}
