// src/io/error.rs
//
// Typed transport errors. Each variant carries the device or endpoint it came from
// so a single log line is enough to tell which side of the bridge failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// Device could not be opened (in use, permissions, vanished between scan and open)
    #[error("{device}: connection failed: {message}")]
    Connection { device: String, message: String },

    #[error("{device}: read failed: {message}")]
    Read { device: String, message: String },

    #[error("{device}: write failed: {message}")]
    Write { device: String, message: String },

    #[error("{endpoint}: send failed: {message}")]
    Send { endpoint: String, message: String },

    #[error("{endpoint}: receive failed: {message}")]
    Receive { endpoint: String, message: String },

    /// Device reported end of stream
    #[error("{device}: disconnected")]
    Disconnected { device: String },

    #[error("{address}: bind failed: {message}")]
    Bind { address: String, message: String },

    #[error("{address}: could not resolve: {message}")]
    Resolve { address: String, message: String },

    #[error("serial port enumeration failed: {message}")]
    Enumerate { message: String },
}

impl IoError {
    pub fn connection(device: &str, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn read(device: &str, message: impl Into<String>) -> Self {
        IoError::Read {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn write(device: &str, message: impl Into<String>) -> Self {
        IoError::Write {
            device: device.to_string(),
            message: message.into(),
        }
    }

    pub fn send(endpoint: &str, message: impl Into<String>) -> Self {
        IoError::Send {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub fn receive(endpoint: &str, message: impl Into<String>) -> Self {
        IoError::Receive {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub fn disconnected(device: &str) -> Self {
        IoError::Disconnected {
            device: device.to_string(),
        }
    }

    pub fn bind(address: &str, message: impl Into<String>) -> Self {
        IoError::Bind {
            address: address.to_string(),
            message: message.into(),
        }
    }

    pub fn resolve(address: &str, message: impl Into<String>) -> Self {
        IoError::Resolve {
            address: address.to_string(),
            message: message.into(),
        }
    }

    pub fn enumerate(message: impl Into<String>) -> Self {
        IoError::Enumerate {
            message: message.into(),
        }
    }
}

/// Read timeouts surface as `TimedOut` from serialport and as `WouldBlock` from
/// sockets on Unix. Neither is a failure for a pump loop.
pub fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}
