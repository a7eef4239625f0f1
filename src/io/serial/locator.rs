// src/io/serial/locator.rs
//
// Device discovery. Picks the serial port to bridge, either by explicit name or
// by matching the port description against known hardware names.
// A miss is `None`, never an error; retrying is the supervisor's job.

use std::path::Path;

use super::port::{PortDescriptor, SerialBackend};

/// Hardware names recognised when no explicit device is configured
pub const DEFAULT_KNOWN_DEVICES: &[&str] = &["Teensy", "Arduino"];

/// Select a port from an enumeration.
///
/// With `filter`, the port whose name equals it (ignoring ASCII case) wins. Both
/// the full path (`/dev/ttyACM0`) and the short name (`ttyACM0`) match.
/// Without, the first port whose description contains any of `known` wins.
pub fn locate<'a>(
    ports: &'a [PortDescriptor],
    filter: Option<&str>,
    known: &[String],
) -> Option<&'a PortDescriptor> {
    match filter {
        Some(name) => ports
            .iter()
            .find(|p| port_name_matches(&p.port_name, name)),
        None => ports.iter().find(|p| {
            known
                .iter()
                .any(|k| !k.is_empty() && p.description.contains(k.as_str()))
        }),
    }
}

fn port_name_matches(port_name: &str, name: &str) -> bool {
    if port_name.eq_ignore_ascii_case(name) {
        return true;
    }
    Path::new(port_name)
        .file_name()
        .and_then(|short| short.to_str())
        .map_or(false, |short| short.eq_ignore_ascii_case(name))
}

/// Discovery settings plus the diagnostics around a single scan
#[derive(Clone, Debug)]
pub struct DeviceLocator {
    filter: Option<String>,
    known: Vec<String>,
}

impl DeviceLocator {
    pub fn new(filter: Option<String>, known: Vec<String>) -> Self {
        DeviceLocator { filter, known }
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Enumerate once and pick a port. Enumeration failures count as "not found".
    pub fn locate(&self, backend: &dyn SerialBackend) -> Option<PortDescriptor> {
        match &self.filter {
            Some(name) => tlog!("[locator] Looking for device {}", name),
            None => tlog!("[locator] Looking for a known device ({})", self.known.join(", ")),
        }

        let ports = match backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tlog!("[locator] {}", e);
                return None;
            }
        };

        match locate(&ports, self.filter(), &self.known) {
            Some(port) => {
                tlog!("[locator] Found {} ({})", port.port_name, port.description);
                Some(port.clone())
            }
            None => {
                tlog!("[locator] Nothing found yet ({} ports scanned)", ports.len());
                None
            }
        }
    }
}

impl Default for DeviceLocator {
    fn default() -> Self {
        DeviceLocator::new(
            None,
            DEFAULT_KNOWN_DEVICES.iter().map(|s| s.to_string()).collect(),
        )
    }
}
