//! Single-peer networking
//!
//! This module handles one outbound connection to one remote node:
//! dialing it, running the version handshake and moving framed protocol
//! messages across it afterwards.
//!
//! Discovery, address books and driving many peers at once belong to the
//! caller.

pub mod codec;
pub mod handshake;
pub mod peer;
pub mod transport;

pub use codec::{read_message, write_message, FrameError, FrameReader, MAX_MESSAGE_PAYLOAD};
pub use handshake::{negotiate_protocol_version, HandshakeReport, PeerState};
pub use peer::{Peer, ShutdownHandle};
pub use transport::{DeadlineReader, Transport};
