use crate::config::ClientConfig;
use crate::error::{PeerError, Result};
use crate::network::codec::{self, FrameError, FrameReader};
use crate::network::handshake::{
    build_version_message, negotiate_protocol_version, new_nonce, HandshakeReport, PeerState,
};
use crate::network::transport::{DeadlineReader, Transport};
use bitcoin::p2p::message::NetworkMessage;
use bitcoin::p2p::Magic;
use log::{debug, warn};
use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One outbound connection to one remote node
///
/// A peer is driven from a single thread: connect, handshake, exchange
/// messages, disconnect. Many peers can share the same `ClientConfig`.
#[derive(Debug)]
pub struct Peer<T: Transport = TcpStream> {
    config: Arc<ClientConfig>,
    address: String,
    transport: Option<T>,
    /// Part of a frame read before a deadline expired
    frames: FrameReader,
    state: PeerState,
    connect_timeout: Duration,
    local_protocol_version: u32,
    /// Framing version; equals the local version until a handshake lowers it
    negotiated_protocol_version: u32,
    remote_protocol_version: Option<u32>,
    remote_user_agent: Option<String>,
    handshake_nonce: Option<u64>,
}

impl<T: Transport> Peer<T> {
    pub fn new(config: Arc<ClientConfig>, address: impl Into<String>) -> Peer<T> {
        let local_protocol_version = config.get_protocol_version();
        Peer {
            connect_timeout: config.get_connect_timeout(),
            config,
            address: address.into(),
            transport: None,
            frames: FrameReader::new(),
            state: PeerState::Disconnected,
            local_protocol_version,
            negotiated_protocol_version: local_protocol_version,
            remote_protocol_version: None,
            remote_user_agent: None,
            handshake_nonce: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    /// Open the transport. Fails if one is already open.
    pub fn connect(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Err(PeerError::AlreadyConnected {
                address: self.address.clone(),
            });
        }

        // A zero connect timeout means I leave it to the OS
        debug!("[{}] Connecting.", self.address);
        let transport =
            T::dial(&self.address, self.connect_timeout).map_err(|source| PeerError::Connect {
                address: self.address.clone(),
                source,
            })?;

        // Nothing learned on a previous connection carries over
        self.negotiated_protocol_version = self.local_protocol_version;
        self.remote_protocol_version = None;
        self.remote_user_agent = None;
        self.handshake_nonce = None;
        self.frames.clear();

        self.transport = Some(transport);
        self.state = PeerState::Connected;
        debug!("[{}] Connected.", self.address);
        Ok(())
    }

    /// Close and release the transport. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        // Half a frame from this connection means nothing to the next one
        self.frames.clear();
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.shutdown() {
                debug!("[{}] Shutdown failed: {e}", self.address);
            }
            debug!("[{}] Closed.", self.address);
        }
        self.state = PeerState::Disconnected;
    }

    /// Run the version exchange
    ///
    /// Sends our version, requires the remote's first message to be its
    /// version, lowers the framing version to the smaller of the two and
    /// acknowledges with a verack. The transport stays open on failure.
    ///
    /// The handshake timeout bounds the whole exchange, however the remote
    /// spreads its bytes out.
    pub fn handshake(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(self.not_connected());
        }

        // The clock starts before our version goes out
        let deadline = self
            .config
            .get_handshake_timeout()
            .map(|timeout| Instant::now() + timeout);

        debug!("[{}] Starting handshake.", self.address);
        let result = self.exchange_versions(deadline);

        match result {
            Ok(()) => {
                self.state = PeerState::Handshaken;
                Ok(())
            }
            Err(e) => {
                self.state = PeerState::Failed;
                debug!("[{}] Handshake failed: {e}", self.address);
                Err(e)
            }
        }
    }

    fn exchange_versions(&mut self, deadline: Option<Instant>) -> Result<()> {
        // A fresh nonce per attempt, so I can spot my own version coming back
        let nonce = new_nonce();
        self.handshake_nonce = Some(nonce);

        let (local, remote) = match self.transport.as_ref() {
            Some(transport) => (transport.local_addr(), transport.peer_addr()),
            None => return Err(self.not_connected()),
        };
        let local = local.map_err(|source| self.read_error(source))?;
        let remote = remote.map_err(|source| self.read_error(source))?;

        // Our version still goes out at the local version; nothing is negotiated yet
        let version = build_version_message(&self.config, local, remote, nonce);
        self.write_frame(
            NetworkMessage::Version(version),
            self.negotiated_protocol_version,
        )?;
        self.state = PeerState::VersionSent;

        // The remote must open with its version; anything else ends the handshake
        let (message, _) = self.read_frame("handshake", deadline)?;
        let remote_version = match message {
            NetworkMessage::Version(remote_version) => remote_version,
            other => {
                warn!(
                    "[{}] Expected version, received {}.",
                    self.address,
                    other.command()
                );
                return Err(PeerError::UnexpectedMessage {
                    address: self.address.clone(),
                    expected: "version",
                    actual: other.command().to_string(),
                });
            }
        };
        self.state = PeerState::VersionReceived;
        debug!("[{}] -> Version: {}", self.address, remote_version.user_agent);

        // Seeing my own nonce means I dialled myself
        if self.config.rejects_self_connections() && remote_version.nonce == nonce {
            return Err(PeerError::SelfConnection {
                address: self.address.clone(),
                nonce,
            });
        }

        // From the verack on, both sides frame with the lower version
        let negotiated =
            negotiate_protocol_version(self.local_protocol_version, remote_version.version);
        self.write_frame(NetworkMessage::Verack, negotiated)?;

        // I only record what I learned once the remote has our verack
        self.negotiated_protocol_version = negotiated;
        self.remote_protocol_version = Some(remote_version.version);
        self.remote_user_agent = Some(remote_version.user_agent);
        debug!(
            "[{}] Handshake complete, protocol version {negotiated}.",
            self.address
        );
        Ok(())
    }

    /// Send one framed message at the negotiated protocol version
    pub fn send_message(&mut self, message: NetworkMessage) -> Result<()> {
        self.write_frame(message, self.negotiated_protocol_version)
    }

    /// Block until one framed message arrives
    ///
    /// Returns the decoded message and its raw payload. Bounded by the
    /// configured receive timeout, if any.
    pub fn receive_message(&mut self) -> Result<(NetworkMessage, Vec<u8>)> {
        let deadline = self
            .config
            .get_receive_timeout()
            .map(|timeout| Instant::now() + timeout);
        self.read_frame("receive", deadline)
    }

    /// Like `receive_message`, bounded by `timeout` for this call only
    ///
    /// A frame cut short by the deadline is not lost: the next receive
    /// picks it up where this one stopped.
    pub fn receive_message_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<(NetworkMessage, Vec<u8>)> {
        self.read_frame("receive", Some(Instant::now() + timeout))
    }

    /// Handle that can close this peer's connection from another thread
    ///
    /// Cancelling makes a blocked handshake or receive fail with
    /// `ConnectionClosed`.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle<T>> {
        let Some(transport) = self.transport.as_ref() else {
            return Err(self.not_connected());
        };
        let transport = transport
            .try_clone()
            .map_err(|source| self.read_error(source))?;
        Ok(ShutdownHandle {
            address: self.address.clone(),
            transport,
        })
    }

    // Writes carry no deadline
    fn write_frame(&mut self, message: NetworkMessage, protocol_version: u32) -> Result<()> {
        let magic = Magic::from(self.config.get_network());
        let result = match self.transport.as_mut() {
            Some(transport) => codec::write_message(transport, message, protocol_version, magic),
            None => return Err(self.not_connected()),
        };
        result.map_err(|e| self.write_error(e))
    }

    fn read_frame(
        &mut self,
        operation: &'static str,
        deadline: Option<Instant>,
    ) -> Result<(NetworkMessage, Vec<u8>)> {
        let magic = Magic::from(self.config.get_network());
        let protocol_version = self.negotiated_protocol_version;
        let Some(transport) = self.transport.as_mut() else {
            return Err(self.not_connected());
        };

        let result = match deadline {
            Some(deadline) => {
                let mut reader = DeadlineReader::new(&mut *transport, deadline);
                let result = self
                    .frames
                    .read_message(&mut reader, protocol_version, magic);
                // Back to blocking reads so the next call starts clean
                if let Err(e) = transport.set_read_timeout(None) {
                    warn!("[{}] Failed to clear read timeout: {e}", self.address);
                }
                result
            }
            None => self.frames.read_message(transport, protocol_version, magic),
        };

        if matches!(result, Err(FrameError::TimedOut)) && self.frames.pending() > 0 {
            debug!(
                "[{}] Timed out with {} bytes of a frame buffered.",
                self.address,
                self.frames.pending()
            );
        }
        result.map_err(|e| self.frame_read_error(e, operation))
    }

    fn not_connected(&self) -> PeerError {
        PeerError::NotConnected {
            address: self.address.clone(),
        }
    }

    fn read_error(&self, source: io::Error) -> PeerError {
        PeerError::Read {
            address: self.address.clone(),
            source,
        }
    }

    // A message newer than the negotiated version is a decode failure on our side
    fn frame_read_error(&self, err: FrameError, operation: &'static str) -> PeerError {
        let address = self.address.clone();
        match err {
            FrameError::Closed => PeerError::ConnectionClosed { address },
            FrameError::TimedOut => PeerError::Timeout { address, operation },
            FrameError::Io(source) => PeerError::Read { address, source },
            FrameError::Decode(reason) => PeerError::Decode { address, reason },
            unsupported @ FrameError::Unsupported { .. } => PeerError::Decode {
                address,
                reason: unsupported.to_string(),
            },
        }
    }

    fn write_error(&self, err: FrameError) -> PeerError {
        let address = self.address.clone();
        match err {
            FrameError::Closed => PeerError::ConnectionClosed { address },
            FrameError::TimedOut => PeerError::Timeout {
                address,
                operation: "send",
            },
            FrameError::Io(source) => PeerError::Write { address, source },
            other => PeerError::Write {
                address,
                source: io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
            },
        }
    }

    pub fn get_address(&self) -> &str {
        &self.address
    }

    pub fn get_state(&self) -> PeerState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_local_protocol_version(&self) -> u32 {
        self.local_protocol_version
    }

    pub fn get_negotiated_protocol_version(&self) -> u32 {
        self.negotiated_protocol_version
    }

    pub fn get_remote_protocol_version(&self) -> Option<u32> {
        self.remote_protocol_version
    }

    pub fn get_remote_user_agent(&self) -> Option<&str> {
        self.remote_user_agent.as_deref()
    }

    pub fn get_handshake_nonce(&self) -> Option<u64> {
        self.handshake_nonce
    }

    /// Summary of the last successful handshake
    pub fn report(&self) -> Option<HandshakeReport> {
        if self.state != PeerState::Handshaken {
            return None;
        }
        Some(HandshakeReport {
            address: self.address.clone(),
            local_protocol_version: self.local_protocol_version,
            remote_protocol_version: self.remote_protocol_version?,
            negotiated_protocol_version: self.negotiated_protocol_version,
            user_agent: self.remote_user_agent.clone()?,
            nonce: self.handshake_nonce?,
        })
    }
}

/// Out-of-band close for a peer's connection
#[derive(Debug)]
pub struct ShutdownHandle<T: Transport = TcpStream> {
    address: String,
    transport: T,
}

impl<T: Transport> ShutdownHandle<T> {
    pub fn cancel(&self) {
        match self.transport.shutdown() {
            Ok(()) => debug!("[{}] Cancelled.", self.address),
            Err(e) => debug!("[{}] Cancel failed: {e}", self.address),
        }
    }
}
