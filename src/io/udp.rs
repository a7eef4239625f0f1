// src/io/udp.rs
//
// Network side of the bridge: the receive socket (bound once, multicast capable)
// and the fixed target address. Both outlive every serial session.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::error::IoError;

/// Largest payload a single UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Receive socket plus the address frames from the device are sent to
#[derive(Debug)]
pub struct SocketPair {
    pub socket: UdpSocket,
    pub target: SocketAddr,
}

impl SocketPair {
    /// Bind the receive side and resolve the target.
    ///
    /// `read_timeout` bounds every receive so a pump loop can notice that its
    /// session ended without waiting for the next datagram.
    pub fn open(
        receive_host: &str,
        receive_port: u16,
        target_host: &str,
        target_port: u16,
        multicast_groups: &[Ipv4Addr],
        read_timeout: Duration,
    ) -> Result<Self, IoError> {
        let receive_addr = resolve(receive_host, receive_port)?;
        let socket = bind_receive_socket(receive_addr, multicast_groups)?;
        socket
            .set_read_timeout(Some(read_timeout))
            .map_err(|e| IoError::bind(&receive_addr.to_string(), e.to_string()))?;

        let target = resolve(target_host, target_port)?;

        Ok(SocketPair { socket, target })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, IoError> {
        self.socket
            .local_addr()
            .map_err(|e| IoError::bind("receive socket", e.to_string()))
    }
}

/// Resolve `host:port`, preferring an IPv4 result.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, IoError> {
    let label = format!("{}:{}", host, port);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| IoError::resolve(&label, e.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| IoError::resolve(&label, "no addresses"))
}

/// Bind a UDP socket that can share its port with other listeners and receive
/// multicast traffic for each of `groups`.
pub fn bind_receive_socket(addr: SocketAddr, groups: &[Ipv4Addr]) -> Result<UdpSocket, IoError> {
    let label = addr.to_string();
    let bind_err = |e: std::io::Error| IoError::bind(&label, e.to_string());

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    let socket: UdpSocket = socket.into();

    for group in groups {
        if !group.is_multicast() {
            return Err(IoError::bind(
                &label,
                format!("{} is not a multicast address", group),
            ));
        }
        let interface = multicast_interface(addr);
        socket.join_multicast_v4(group, &interface).map_err(bind_err)?;
        tlog!("[udp] Joined multicast group {} on {}", group, interface);
    }

    Ok(socket)
}

/// Interface for multicast joins. Only a unicast bind address names one; binding
/// to a group (or to any) leaves the choice to the OS.
fn multicast_interface(addr: SocketAddr) -> Ipv4Addr {
    match addr {
        SocketAddr::V4(v4) if !v4.ip().is_unspecified() && !v4.ip().is_multicast() => *v4.ip(),
        _ => Ipv4Addr::UNSPECIFIED,
    }
}
