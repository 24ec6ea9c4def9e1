//! # btc-probe - Single-Peer Bitcoin Protocol Client
//!
//! This is the piece of my crawler that actually talks to the network.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Peer Lifecycle**: connect with a timeout, handshake, message, disconnect
//! - **Version Handshake**: version/verack exchange with protocol version negotiation
//! - **Framed Messaging**: one call sends or receives exactly one protocol message
//! - **Deadlines and Cancellation**: no read can hang forever unless I ask it to
//!
//! ## How I Organized My Code
//! - `network/`: the peer, the handshake, frame reading/writing and the transport trait
//! - `config/`: client-wide settings shared by every peer
//! - `error/`: one error type carrying the peer address
//! - `cli/`: command-line interface for probing a single node
//!
//! ## Key Design Decisions I Made
//! - The wire format comes from the `bitcoin` crate; I only frame it
//! - Configuration is an immutable value behind an `Arc`, never a global
//! - A peer never retries anything; the caller owns policy
//!
//! ## Typical Use
//! ```no_run
//! use btc_probe::{ClientConfig, Peer};
//! use std::sync::Arc;
//!
//! let config = Arc::new(ClientConfig::default());
//! let mut peer: Peer = Peer::new(config, "127.0.0.1:8333");
//! peer.connect()?;
//! peer.handshake()?;
//! println!("{:?}", peer.get_remote_user_agent());
//! peer.disconnect();
//! # Ok::<(), btc_probe::PeerError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod network;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::ClientConfig;
pub use error::{PeerError, Result};
pub use network::{HandshakeReport, Peer, PeerState, ShutdownHandle, Transport};
