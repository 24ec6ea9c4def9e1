//! Message framing on top of the `bitcoin` crate's wire codec
//!
//! The header layout, checksum and message bodies all come from
//! `bitcoin::p2p`. This layer adds what a peer needs around it: reading
//! exactly one frame off a stream, rejecting frames from another network
//! before their payload is read, capping payload size and refusing messages
//! the protocol version in use does not know about.

use bitcoin::consensus::encode;
use bitcoin::p2p::message::{NetworkMessage, RawNetworkMessage};
use bitcoin::p2p::Magic;
use data_encoding::HEXLOWER;
use std::fmt;
use std::io::{self, Read, Write};

/// magic(4) + command(12) + payload length(4) + checksum(4)
pub const HEADER_SIZE: usize = 24;

/// Largest payload accepted from a remote, 32 MiB
pub const MAX_MESSAGE_PAYLOAD: usize = 32 * 1024 * 1024;

pub const BIP0031_VERSION: u32 = 60001;
pub const BIP0035_VERSION: u32 = 60002;
pub const BIP0037_VERSION: u32 = 70001;
pub const SEND_HEADERS_VERSION: u32 = 70012;
pub const FEE_FILTER_VERSION: u32 = 70013;
pub const SHORT_IDS_BLOCKS_VERSION: u32 = 70014;
pub const WTXID_RELAY_VERSION: u32 = 70016;

/// Failure to move one frame across a stream
#[derive(Debug)]
pub enum FrameError {
    /// The stream ended or was reset
    Closed,
    /// A read deadline expired
    TimedOut,
    Io(io::Error),
    /// Malformed frame or payload
    Decode(String),
    /// Message type is newer than the protocol version in use
    Unsupported {
        command: String,
        protocol_version: u32,
        required: u32,
    },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Closed => write!(f, "connection closed"),
            FrameError::TimedOut => write!(f, "timed out"),
            FrameError::Io(err) => write!(f, "{err}"),
            FrameError::Decode(msg) => write!(f, "{msg}"),
            FrameError::Unsupported {
                command,
                protocol_version,
                required,
            } => write!(
                f,
                "{command} message is not valid for protocol version {protocol_version} (requires {required})"
            ),
        }
    }
}

impl std::error::Error for FrameError {}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => FrameError::Closed,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => FrameError::TimedOut,
            _ => FrameError::Io(err),
        }
    }
}

/// Lowest protocol version a message type may be sent at
///
/// `None` means the message has always been part of the protocol.
pub fn min_protocol_version(message: &NetworkMessage) -> Option<u32> {
    match message {
        NetworkMessage::Pong(_) => Some(BIP0031_VERSION),
        NetworkMessage::MemPool => Some(BIP0035_VERSION),
        NetworkMessage::FilterLoad(_)
        | NetworkMessage::FilterAdd(_)
        | NetworkMessage::FilterClear
        | NetworkMessage::MerkleBlock(_) => Some(BIP0037_VERSION),
        NetworkMessage::SendHeaders => Some(SEND_HEADERS_VERSION),
        NetworkMessage::FeeFilter(_) => Some(FEE_FILTER_VERSION),
        NetworkMessage::SendCmpct(_)
        | NetworkMessage::CmpctBlock(_)
        | NetworkMessage::GetBlockTxn(_)
        | NetworkMessage::BlockTxn(_) => Some(SHORT_IDS_BLOCKS_VERSION),
        NetworkMessage::WtxidRelay | NetworkMessage::SendAddrV2 | NetworkMessage::AddrV2(_) => {
            Some(WTXID_RELAY_VERSION)
        }
        _ => None,
    }
}

fn check_supported(message: &NetworkMessage, protocol_version: u32) -> Result<(), FrameError> {
    match min_protocol_version(message) {
        Some(required) if protocol_version < required => Err(FrameError::Unsupported {
            command: message.command().to_string(),
            protocol_version,
            required,
        }),
        _ => Ok(()),
    }
}

/// Encode `message` as one frame and write it out
pub fn write_message<W: Write>(
    writer: &mut W,
    message: NetworkMessage,
    protocol_version: u32,
    magic: Magic,
) -> Result<(), FrameError> {
    check_supported(&message, protocol_version)?;

    let frame = encode::serialize(&RawNetworkMessage::new(magic, message));
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read exactly one frame, returning the decoded message and its raw payload
///
/// Bytes read before a timeout are lost with the call; a peer that retries
/// after timing out uses a `FrameReader` instead.
pub fn read_message<R: Read>(
    reader: &mut R,
    protocol_version: u32,
    magic: Magic,
) -> Result<(NetworkMessage, Vec<u8>), FrameError> {
    FrameReader::new().read_message(reader, protocol_version, magic)
}

/// Incremental frame reader that survives read timeouts
///
/// Whatever part of a frame has arrived stays buffered when a read times
/// out, and the next call carries on from there. Any other failure drops
/// the partial frame.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> FrameReader {
        FrameReader::default()
    }

    /// Number of bytes of an unfinished frame held from earlier calls
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn read_message<R: Read>(
        &mut self,
        reader: &mut R,
        protocol_version: u32,
        magic: Magic,
    ) -> Result<(NetworkMessage, Vec<u8>), FrameError> {
        let result = self.read_frame(reader, magic);
        match &result {
            Ok(_) => {}
            Err(FrameError::TimedOut) => return Err(FrameError::TimedOut),
            Err(_) => self.buffer.clear(),
        }
        let mut frame = result?;

        let raw: RawNetworkMessage =
            encode::deserialize(&frame).map_err(|e| FrameError::Decode(e.to_string()))?;
        let message = raw.into_payload();
        check_supported(&message, protocol_version)?;

        let payload = frame.split_off(HEADER_SIZE);
        Ok((message, payload))
    }

    // Leaves the buffer empty once a whole frame has been taken out of it
    fn read_frame<R: Read>(&mut self, reader: &mut R, magic: Magic) -> Result<Vec<u8>, FrameError> {
        self.fill(reader, HEADER_SIZE)?;

        let header = &self.buffer[..HEADER_SIZE];
        let received_magic = Magic::from_bytes([header[0], header[1], header[2], header[3]]);
        if received_magic != magic {
            return Err(FrameError::Decode(format!(
                "message from other network: magic {}, expected {}",
                HEXLOWER.encode(&received_magic.to_bytes()),
                HEXLOWER.encode(&magic.to_bytes())
            )));
        }

        let payload_len = u32::from_le_bytes([header[16], header[17], header[18], header[19]]) as usize;
        if payload_len > MAX_MESSAGE_PAYLOAD {
            return Err(FrameError::Decode(format!(
                "payload of {payload_len} bytes exceeds the {MAX_MESSAGE_PAYLOAD} byte limit"
            )));
        }

        self.fill(reader, HEADER_SIZE + payload_len)?;
        Ok(std::mem::take(&mut self.buffer))
    }

    // Never reads past `target`, so the next frame stays in the stream
    fn fill<R: Read>(&mut self, reader: &mut R, target: usize) -> Result<(), FrameError> {
        let mut chunk = [0u8; 8192];
        while self.buffer.len() < target {
            let want = (target - self.buffer.len()).min(chunk.len());
            match reader.read(&mut chunk[..want]) {
                Ok(0) => return Err(FrameError::Closed),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
