use crate::config::ClientConfig;
use bitcoin::p2p::address::Address;
use bitcoin::p2p::message_network::VersionMessage;
use bitcoin::p2p::ServiceFlags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where a peer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerState {
    Disconnected,
    Connected,
    VersionSent,
    VersionReceived,
    Handshaken,
    /// A handshake step failed; the transport may still be open
    Failed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerState::Disconnected => write!(f, "disconnected"),
            PeerState::Connected => write!(f, "connected"),
            PeerState::VersionSent => write!(f, "version sent"),
            PeerState::VersionReceived => write!(f, "version received"),
            PeerState::Handshaken => write!(f, "handshaken"),
            PeerState::Failed => write!(f, "failed"),
        }
    }
}

/// What a completed handshake learned about the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReport {
    pub address: String,
    pub local_protocol_version: u32,
    pub remote_protocol_version: u32,
    pub negotiated_protocol_version: u32,
    pub user_agent: String,
    pub nonce: u64,
}

/// Both sides must frame with the lower of the two versions
pub fn negotiate_protocol_version(local: u32, remote: u32) -> u32 {
    local.min(remote)
}

pub fn new_nonce() -> u64 {
    rand::random()
}

/// Version announcement for an observe-only peer
///
/// We advertise no services and ask the remote not to relay transactions.
pub fn build_version_message(
    config: &ClientConfig,
    local: SocketAddr,
    remote: SocketAddr,
    nonce: u64,
) -> VersionMessage {
    VersionMessage {
        version: config.get_protocol_version(),
        services: ServiceFlags::NONE,
        timestamp: unix_timestamp(),
        receiver: Address::new(&remote, ServiceFlags::NONE),
        sender: Address::new(&local, ServiceFlags::NONE),
        nonce,
        user_agent: config.get_user_agent().to_string(),
        start_height: 0,
        relay: false,
    }
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
