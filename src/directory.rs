//! Directory-service client
//!
//! Peers find one another through a central directory speaking a
//! line-oriented protocol over short-lived TCP connections:
//!
//! ```text
//! REGISTER <nick> <ip> <tcp_port> <password> <protocols>  ->  OK | NOK
//! QUERY <nick>      ->  OK <ts> <nick> <ip> <tcp_port> <protocols> | NOK
//! LIST_USERS        ->  OK USERS_LIST <N> <user1>#<user2>#...#
//! ```
//!
//! The users list is terminated by a trailing `#`; responses may span
//! several recvs, so the reader loops until all announced entries are in.
//! Every connection is closed with a trailing QUIT.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::constants::DIRECTORY_TIMEOUT;
use crate::error::{DirectoryError, TransportError};
use crate::peer::{LocalPeer, PeerInfo, ProtocolSet};

#[derive(Debug, Clone)]
pub struct DirectoryClient {
    host: String,
    port: u16,
}

impl DirectoryClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Register the local peer. `NOK` usually means a wrong password for
    /// an already-taken nickname.
    pub fn register(&self, user: &LocalPeer) -> Result<(), DirectoryError> {
        let request = format!(
            "REGISTER {} {} {} {} {}",
            user.nick(),
            user.info.ip,
            user.info.tcp_port,
            user.password,
            user.info.protocols.to_wire(),
        );
        let response = self.exchange(&request, None)?;
        if response.split_whitespace().next() == Some("OK") {
            tracing::info!("registered as {}", user.nick());
            Ok(())
        } else {
            Err(DirectoryError::RegisterFailed)
        }
    }

    /// Resolve a nickname to its registered endpoint
    pub fn query(&self, nick: &str) -> Result<PeerInfo, DirectoryError> {
        let response = self.exchange(&format!("QUERY {nick}"), None)?;
        let tokens: Vec<&str> = response.split_whitespace().collect();
        match tokens.first() {
            Some(&"OK") => {
                // OK <ts> <nick> <ip> <tcp_port> <protocols>
                if tokens.len() < 6 {
                    return Err(DirectoryError::BadUser(response.clone()));
                }
                parse_user_fields(&tokens[2..6])
                    .ok_or_else(|| DirectoryError::BadUser(response.clone()))
            }
            Some(&"NOK") => Err(DirectoryError::UserUnknown(nick.to_string())),
            _ => Err(DirectoryError::BadResponse(response)),
        }
    }

    /// Fetch the whole user list. Malformed entries are skipped with a
    /// warning rather than failing the listing.
    pub fn list_users(&self) -> Result<Vec<PeerInfo>, DirectoryError> {
        let response = self.exchange("LIST_USERS", Some(list_is_complete))?;
        let mut tokens = response.split_whitespace();
        if tokens.next() != Some("OK") || tokens.next() != Some("USERS_LIST") {
            return Err(DirectoryError::BadResponse(response.clone()));
        }
        let count: usize = tokens
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| DirectoryError::BadResponse(response.clone()))?;

        let body = response
            .splitn(4, char::is_whitespace)
            .nth(3)
            .unwrap_or_default();

        // `#` separates users but also joins protocol tags inside an entry;
        // a single-token part therefore continues the previous entry's
        // protocol list rather than starting a new user.
        let mut entries: Vec<String> = Vec::with_capacity(count);
        for part in body.split('#') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match entries.last_mut() {
                Some(last) if !part.contains(char::is_whitespace) => {
                    last.push('#');
                    last.push_str(part);
                }
                _ => entries.push(part.to_string()),
            }
        }

        let mut users = Vec::with_capacity(entries.len());
        for entry in &entries {
            let fields: Vec<&str> = entry.split_whitespace().collect();
            match parse_user_fields(&fields) {
                Some(user) => users.push(user),
                None => tracing::warn!("skipping malformed user entry {entry:?}"),
            }
        }
        Ok(users)
    }

    /// One request/response round trip. `complete` decides when a
    /// multi-recv response has fully arrived; by default one recv is
    /// enough.
    fn exchange(
        &self,
        request: &str,
        complete: Option<fn(&str) -> bool>,
    ) -> Result<String, DirectoryError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        stream
            .set_read_timeout(Some(DIRECTORY_TIMEOUT))
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        stream
            .write_all(request.as_bytes())
            .map_err(|e| TransportError::Send(e.to_string()))?;
        tracing::debug!("directory request: {request}");

        let mut response = String::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream
                .read(&mut buf)
                .map_err(|e| TransportError::Recv(e.to_string()))?;
            if n == 0 {
                break;
            }
            response.push_str(&String::from_utf8_lossy(&buf[..n]));
            match complete {
                Some(done) if !done(&response) => continue,
                _ => break,
            }
        }

        // Courtesy goodbye; the server closes right after
        let _ = stream.write_all(b"QUIT");
        tracing::debug!("directory response: {response}");
        Ok(response.trim().to_string())
    }
}

/// `nick ip tcp_port protocols`
fn parse_user_fields(fields: &[&str]) -> Option<PeerInfo> {
    if fields.len() < 4 {
        return None;
    }
    Some(PeerInfo {
        nick: fields[0].to_string(),
        ip: fields[1].parse().ok()?,
        tcp_port: fields[2].parse().ok()?,
        udp_port: None,
        protocols: ProtocolSet::parse(fields[3]),
    })
}

/// A users list is complete once the trailing `#` terminator shows up
fn list_is_complete(response: &str) -> bool {
    if !response.starts_with("OK") {
        // NOK or garbage: a single recv is all there is
        return true;
    }
    // An empty listing may arrive without any terminator at all
    if let Some(count) = response.split_whitespace().nth(2) {
        if count == "0" {
            return true;
        }
    }
    response.trim_end().ends_with('#')
}
