//! Media socket construction
//!
//! Datagram sockets are built through `socket2` so the kernel buffers can
//! be sized for video bursts before binding.

use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::constants::UDP_SOCKET_BUFFER;
use crate::error::TransportError;

/// Bind the media receive socket on all interfaces. Port 0 lets the OS
/// pick one; read it back with `local_addr`.
pub fn create_media_socket(port: u16) -> Result<UdpSocket, TransportError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| TransportError::Bind(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| TransportError::Bind(format!("failed to set SO_REUSEADDR: {e}")))?;
    socket
        .set_send_buffer_size(UDP_SOCKET_BUFFER)
        .map_err(|e| TransportError::Bind(format!("failed to set send buffer: {e}")))?;
    socket
        .set_recv_buffer_size(UDP_SOCKET_BUFFER)
        .map_err(|e| TransportError::Bind(format!("failed to set recv buffer: {e}")))?;

    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .map_err(|e: std::net::AddrParseError| TransportError::Bind(e.to_string()))?;
    socket
        .bind(&addr.into())
        .map_err(|e| TransportError::Bind(e.to_string()))?;

    Ok(socket.into())
}

/// Ephemeral socket for outgoing media
pub fn create_send_socket() -> Result<UdpSocket, TransportError> {
    create_media_socket(0)
}
