//! Peer identity and protocol-tag negotiation
//!
//! A peer is addressed by nickname and reachable on a reliable control port
//! and an unreliable media port. Protocol tags ("V0", "V1", ...) are opaque
//! identifiers ordered lexicographically; two peers speak the greatest tag
//! both support.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};

/// Ordered set of supported protocol tags
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtocolSet(BTreeSet<String>);

impl ProtocolSet {
    /// Parse the wire form `V0#V1#...`. Tags are upper-cased so peers that
    /// registered in lower case still negotiate correctly.
    pub fn parse(wire: &str) -> Self {
        Self(
            wire.split('#')
                .filter(|tag| !tag.is_empty())
                .map(|tag| tag.to_ascii_uppercase())
                .collect(),
        )
    }

    pub fn single(tag: &str) -> Self {
        let mut set = BTreeSet::new();
        set.insert(tag.to_ascii_uppercase());
        Self(set)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(&tag.to_ascii_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The lexicographically greatest tag both sets support, or `None` when
    /// the sets are disjoint (the call cannot begin).
    pub fn best_common(&self, other: &ProtocolSet) -> Option<String> {
        self.0.intersection(&other.0).max().cloned()
    }

    /// Wire form, `#`-joined in ascending order
    pub fn to_wire(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join("#")
    }
}

/// A remote peer as known from the directory or an incoming call
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub nick: String,
    pub ip: IpAddr,
    /// Reliable-channel (signaling) port
    pub tcp_port: u16,
    /// Datagram (media) port, learned during call setup
    pub udp_port: Option<u16>,
    pub protocols: ProtocolSet,
}

impl PeerInfo {
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.tcp_port)
    }

    /// Where media datagrams for this peer go, once the port is negotiated
    pub fn media_addr(&self) -> Option<SocketAddr> {
        self.udp_port.map(|port| SocketAddr::new(self.ip, port))
    }
}

/// The local peer; the password is used only to register with the directory
#[derive(Debug, Clone)]
pub struct LocalPeer {
    pub info: PeerInfo,
    pub password: String,
}

impl LocalPeer {
    pub fn new(
        nick: String,
        ip: IpAddr,
        tcp_port: u16,
        udp_port: u16,
        password: String,
        protocols: ProtocolSet,
    ) -> Self {
        Self {
            info: PeerInfo {
                nick,
                ip,
                tcp_port,
                udp_port: Some(udp_port),
                protocols,
            },
            password,
        }
    }

    pub fn nick(&self) -> &str {
        &self.info.nick
    }

    pub fn udp_port(&self) -> u16 {
        self.info.udp_port.unwrap_or(0)
    }

    /// Negotiate against a remote peer's advertised set
    pub fn negotiate(&self, remote: &ProtocolSet) -> Option<String> {
        self.info.protocols.best_common(remote)
    }
}
