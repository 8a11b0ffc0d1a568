//! Socket construction and address discovery

pub mod udp;

use std::net::{IpAddr, UdpSocket};

use crate::error::TransportError;

/// The IP a LAN peer should be reached on: bind an outbound UDP socket and
/// read the chosen interface address. No packet is actually sent.
pub fn private_ip() -> Result<IpAddr, TransportError> {
    let socket =
        UdpSocket::bind("0.0.0.0:0").map_err(|e| TransportError::Bind(e.to_string()))?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let addr = socket
        .local_addr()
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    Ok(addr.ip())
}

/// The address the outside world sees, fetched from a plain-text echo
/// service. Used only when registering with a public address.
pub fn public_ip() -> Result<IpAddr, TransportError> {
    let text = reqwest::blocking::get("https://api.ipify.org")
        .and_then(|response| response.text())
        .map_err(|e| TransportError::Recv(e.to_string()))?;
    text.trim()
        .parse()
        .map_err(|_| TransportError::Recv(format!("not an IP address: {text:?}")))
}
