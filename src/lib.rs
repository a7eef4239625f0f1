//! SLIP serial <-> UDP bridge.
//!
//! Frames arriving SLIP-encoded on a serial device are sent as one UDP datagram
//! each to a fixed target; datagrams arriving on the receive socket are
//! SLIP-encoded and written to the device. When the device goes away the
//! session is torn down and the [`bridge::Supervisor`] keeps looking for it
//! until it comes back.

#[macro_use]
pub mod logging;

pub mod bridge;
pub mod format;
pub mod io;
pub mod settings;

pub use bridge::{BridgeStats, Session, SessionConfig, Supervisor, SupervisorConfig};
pub use io::serial::{slip_encode, DeviceLocator, SlipDecoder};
pub use io::{IoError, SocketPair};
pub use settings::{BridgeConfig, ConfigError};
