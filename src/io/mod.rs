// src/io/mod.rs
//
// Transports on both sides of the bridge.

mod error;
pub mod serial;
pub mod udp;

pub use error::{is_timeout, IoError};
pub use udp::{SocketPair, MAX_DATAGRAM_SIZE};
