// src/io/serial/mod.rs
//
// Serial side of the bridge.
//
// Features:
// - SLIP framing (encode for transmit, streaming decode for receive)
// - Port enumeration and device discovery
// - serialport-backed device handles behind the `SerialLink` seam

pub mod framer;
pub mod locator;
pub mod port;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod mock;

pub use framer::{max_encoded_len, slip_encode, slip_encode_into, SlipDecoder};
pub use locator::{locate, DeviceLocator, DEFAULT_KNOWN_DEVICES};
pub use port::{list_serial_ports, PortDescriptor, SerialBackend, SerialLink, SystemSerial};
pub use utils::{LineSettings, Parity};
