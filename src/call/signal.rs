//! Signaling message codec
//!
//! Messages are whitespace-tokenised ASCII over the reliable channel, with
//! no line terminator; framing follows single-recv boundaries. Two messages
//! may be coalesced into one recv, so parsing scans tokens and keeps going
//! whenever the remainder starts with a known verb. Extra trailing tokens
//! that are not a known verb are tolerated for forward compatibility.

use crate::error::ProtocolError;

/// One signaling message as exchanged during call setup and inside a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalMessage {
    /// Call initiation; the protocol suffix is omitted on the wire when
    /// negotiation picked the V0 baseline (compatibility with old peers)
    Calling {
        nick: String,
        udp_port: u16,
        protocol: Option<String>,
    },
    Accepted { nick: String, udp_port: u16 },
    Denied { nick: String },
    /// Intentionally carries no nickname
    Busy,
    Hold { nick: String },
    Resume { nick: String },
    End { nick: String },
    /// V1+ only; ignored under V0
    Congested { nick: String },
}

const VERBS: &[&str] = &[
    "CALLING",
    "CALL_ACCEPTED",
    "CALL_DENIED",
    "CALL_BUSY",
    "CALL_HOLD",
    "CALL_RESUME",
    "CALL_END",
    "CALL_CONGESTED",
];

fn is_verb(token: &str) -> bool {
    VERBS.contains(&token)
}

fn parse_port(token: &str) -> Result<u16, ProtocolError> {
    token
        .parse()
        .map_err(|_| ProtocolError::BadField(token.to_string()))
}

impl SignalMessage {
    pub fn verb(&self) -> &'static str {
        match self {
            SignalMessage::Calling { .. } => "CALLING",
            SignalMessage::Accepted { .. } => "CALL_ACCEPTED",
            SignalMessage::Denied { .. } => "CALL_DENIED",
            SignalMessage::Busy => "CALL_BUSY",
            SignalMessage::Hold { .. } => "CALL_HOLD",
            SignalMessage::Resume { .. } => "CALL_RESUME",
            SignalMessage::End { .. } => "CALL_END",
            SignalMessage::Congested { .. } => "CALL_CONGESTED",
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SignalMessage::Calling {
                nick,
                udp_port,
                protocol: Some(proto),
            } => format!("CALLING {nick} {udp_port} {proto}"),
            SignalMessage::Calling {
                nick, udp_port, ..
            } => format!("CALLING {nick} {udp_port}"),
            SignalMessage::Accepted { nick, udp_port } => {
                format!("CALL_ACCEPTED {nick} {udp_port}")
            }
            SignalMessage::Denied { nick } => format!("CALL_DENIED {nick}"),
            SignalMessage::Busy => "CALL_BUSY".to_string(),
            SignalMessage::Hold { nick } => format!("CALL_HOLD {nick}"),
            SignalMessage::Resume { nick } => format!("CALL_RESUME {nick}"),
            SignalMessage::End { nick } => format!("CALL_END {nick}"),
            SignalMessage::Congested { nick } => format!("CALL_CONGESTED {nick}"),
        }
    }

    /// Parse one message from the front of the token slice, returning the
    /// number of tokens consumed
    fn parse_one(tokens: &[&str]) -> Result<(SignalMessage, usize), ProtocolError> {
        let verb = *tokens.first().ok_or(ProtocolError::Empty)?;
        let args = &tokens[1..];

        let need = |expected: usize, verb: &'static str| {
            if args.len() < expected {
                Err(ProtocolError::BadArity {
                    verb,
                    expected,
                    got: args.len(),
                })
            } else {
                Ok(())
            }
        };

        match verb {
            "CALLING" => {
                need(2, "CALLING")?;
                let nick = args[0].to_string();
                let udp_port = parse_port(args[1])?;
                // A third token is the negotiated protocol unless it starts
                // the next coalesced message
                let protocol = match args.get(2) {
                    Some(token) if !is_verb(token) => Some(token.to_ascii_uppercase()),
                    _ => None,
                };
                let consumed = 3 + usize::from(protocol.is_some());
                Ok((
                    SignalMessage::Calling {
                        nick,
                        udp_port,
                        protocol,
                    },
                    consumed,
                ))
            }
            "CALL_ACCEPTED" => {
                need(2, "CALL_ACCEPTED")?;
                Ok((
                    SignalMessage::Accepted {
                        nick: args[0].to_string(),
                        udp_port: parse_port(args[1])?,
                    },
                    3,
                ))
            }
            "CALL_DENIED" => {
                need(1, "CALL_DENIED")?;
                Ok((SignalMessage::Denied { nick: args[0].to_string() }, 2))
            }
            "CALL_BUSY" => Ok((SignalMessage::Busy, 1)),
            "CALL_HOLD" => {
                need(1, "CALL_HOLD")?;
                Ok((SignalMessage::Hold { nick: args[0].to_string() }, 2))
            }
            "CALL_RESUME" => {
                need(1, "CALL_RESUME")?;
                Ok((SignalMessage::Resume { nick: args[0].to_string() }, 2))
            }
            "CALL_END" => {
                need(1, "CALL_END")?;
                Ok((SignalMessage::End { nick: args[0].to_string() }, 2))
            }
            "CALL_CONGESTED" => {
                need(1, "CALL_CONGESTED")?;
                Ok((SignalMessage::Congested { nick: args[0].to_string() }, 2))
            }
            other => Err(ProtocolError::UnknownVerb(other.to_string())),
        }
    }

    /// Parse a whole received buffer, which may hold several coalesced
    /// messages. Trailing tokens that do not start a known verb are dropped
    /// as forward-compatibility extras.
    pub fn parse_all(input: &str) -> Result<Vec<SignalMessage>, ProtocolError> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut messages = Vec::new();
        let mut rest = &tokens[..];
        loop {
            let (message, consumed) = Self::parse_one(rest)?;
            messages.push(message);
            rest = &rest[consumed..];
            match rest.first() {
                Some(token) if is_verb(token) => continue,
                _ => break,
            }
        }
        Ok(messages)
    }
}
