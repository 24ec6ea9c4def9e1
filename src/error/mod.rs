//! Error handling for peer connections
//!
//! Every failure carries the address of the peer it happened on so callers
//! driving many peers can log it without extra bookkeeping.

use std::fmt;
use std::io;

/// Result type alias for peer operations
pub type Result<T> = std::result::Result<T, PeerError>;

/// Error types for the peer lifecycle
#[derive(Debug)]
pub enum PeerError {
    /// Connect was called while a transport is already owned
    AlreadyConnected { address: String },
    /// An operation needing a transport was called without one
    NotConnected { address: String },
    /// Dialing the remote failed (refused, unreachable, timed out, unresolvable)
    Connect { address: String, source: io::Error },
    /// The transport was closed, locally or by the remote
    ConnectionClosed { address: String },
    /// A message of the wrong type arrived where another was required
    UnexpectedMessage {
        address: String,
        expected: &'static str,
        actual: String,
    },
    /// The remote echoed our own handshake nonce back
    SelfConnection { address: String, nonce: u64 },
    /// A read deadline expired
    Timeout {
        address: String,
        operation: &'static str,
    },
    /// Transport read failure
    Read { address: String, source: io::Error },
    /// Transport write or message encoding failure
    Write { address: String, source: io::Error },
    /// Malformed frame, wrong network, bad checksum or undecodable payload
    Decode { address: String, reason: String },
    /// Configuration errors
    Config(String),
}

impl PeerError {
    /// Address of the peer the error belongs to, if any
    pub fn address(&self) -> Option<&str> {
        match self {
            PeerError::AlreadyConnected { address }
            | PeerError::NotConnected { address }
            | PeerError::Connect { address, .. }
            | PeerError::ConnectionClosed { address }
            | PeerError::UnexpectedMessage { address, .. }
            | PeerError::SelfConnection { address, .. }
            | PeerError::Timeout { address, .. }
            | PeerError::Read { address, .. }
            | PeerError::Write { address, .. }
            | PeerError::Decode { address, .. } => Some(address),
            PeerError::Config(_) => None,
        }
    }
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::AlreadyConnected { address } => {
                write!(f, "[{address}] Peer already connected, can't connect again")
            }
            PeerError::NotConnected { address } => {
                write!(f, "[{address}] Peer is not connected")
            }
            PeerError::Connect { address, source } => {
                write!(f, "[{address}] Failed to connect: {source}")
            }
            PeerError::ConnectionClosed { address } => {
                write!(f, "[{address}] Connection closed")
            }
            PeerError::UnexpectedMessage {
                address,
                expected,
                actual,
            } => write!(
                f,
                "[{address}] Unexpected message: expected {expected}, received {actual}"
            ),
            PeerError::SelfConnection { address, nonce } => {
                write!(f, "[{address}] Connected to self (nonce {nonce:#018x})")
            }
            PeerError::Timeout { address, operation } => {
                write!(f, "[{address}] Timed out during {operation}")
            }
            PeerError::Read { address, source } => write!(f, "[{address}] Read error: {source}"),
            PeerError::Write { address, source } => {
                write!(f, "[{address}] Write error: {source}")
            }
            PeerError::Decode { address, reason } => {
                write!(f, "[{address}] Decode error: {reason}")
            }
            PeerError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for PeerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PeerError::Connect { source, .. }
            | PeerError::Read { source, .. }
            | PeerError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for PeerError {
    fn from(err: toml::de::Error) -> Self {
        PeerError::Config(err.to_string())
    }
}
