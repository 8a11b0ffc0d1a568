//! Shared fixtures: an in-process directory service and polling helpers

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use videolink::directory::DirectoryClient;

/// A directory entry as the fake service announces it
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub addr: SocketAddr,
    pub protocols: String,
}

pub type Registry = Arc<Mutex<HashMap<String, DirEntry>>>;

/// Spawn a directory service on localhost speaking the REGISTER / QUERY /
/// LIST_USERS protocol against a shared registry the tests mutate directly.
pub fn spawn_directory() -> (DirectoryClient, Registry) {
    let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
    let listener = TcpListener::bind("127.0.0.1:0").expect("directory bind");
    let port = listener.local_addr().expect("directory addr").port();

    let server_registry = registry.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0u8; 1024];
            let Ok(n) = stream.read(&mut buf) else { continue };
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let tokens: Vec<&str> = request.split_whitespace().collect();

            let response = match tokens.first() {
                Some(&"REGISTER") => "OK REGISTERED".to_string(),
                Some(&"QUERY") => match tokens.get(1) {
                    Some(nick) => match server_registry.lock().get(*nick) {
                        Some(entry) => format!(
                            "OK 0 {nick} {} {} {}",
                            entry.addr.ip(),
                            entry.addr.port(),
                            entry.protocols
                        ),
                        None => "NOK".to_string(),
                    },
                    None => "NOK".to_string(),
                },
                Some(&"LIST_USERS") => {
                    let registry = server_registry.lock();
                    let mut body = String::new();
                    for (nick, entry) in registry.iter() {
                        body.push_str(&format!(
                            "{nick} {} {} {}#",
                            entry.addr.ip(),
                            entry.addr.port(),
                            entry.protocols
                        ));
                    }
                    format!("OK USERS_LIST {} {body}", registry.len())
                }
                _ => "NOK".to_string(),
            };
            let _ = stream.write_all(response.as_bytes());
            // Wait for the client's QUIT before closing
            let _ = stream.read(&mut buf);
        }
    });

    (DirectoryClient::new("127.0.0.1", port), registry)
}

/// Poll until the predicate holds or the timeout elapses
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}
