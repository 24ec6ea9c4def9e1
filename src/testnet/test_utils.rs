//! Test utilities for peer testing

use crate::config::ClientConfig;
use crate::network::codec::{read_message, write_message};
use crate::network::handshake::{build_version_message, negotiate_protocol_version, new_nonce};
use bitcoin::p2p::message::NetworkMessage;
use bitcoin::p2p::Magic;
use bitcoin::Network;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on how long a fake remote waits for the peer under test
const REMOTE_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Regtest settings with short deadlines
pub fn test_settings() -> ClientConfig {
    ClientConfig::new(Network::Regtest)
        .with_user_agent("/btc-probe-test:0.1.0/")
        .with_handshake_timeout(Some(Duration::from_secs(5)))
}

pub fn test_config() -> Arc<ClientConfig> {
    Arc::new(test_settings())
}

/// How a fake remote reacts once it has read the peer's version
#[derive(Debug, Clone)]
pub enum RemoteBehavior {
    /// Answer with version and verack, then pong pings and echo anything else
    Respond {
        protocol_version: u32,
        user_agent: String,
    },
    /// Send this message instead of a version
    SendFirst(NetworkMessage),
    /// Hang up without answering
    CloseAfterVersion,
    /// Answer with a version carrying the peer's own nonce
    EchoNonce,
    /// Never answer
    Silent,
    /// Answer with a version one byte at a time, pausing between bytes
    Trickle(Duration),
}

/// A single-connection remote node on a loopback port
pub struct FakeRemote {
    addr: SocketAddr,
    handle: JoinHandle<Vec<NetworkMessage>>,
}

impl FakeRemote {
    pub fn spawn(behavior: RemoteBehavior) -> FakeRemote {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || match listener.accept() {
            Ok((stream, _)) => serve(stream, behavior),
            Err(_) => Vec::new(),
        });

        FakeRemote { addr, handle }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Every message the remote received, in order, once the peer hung up
    pub fn join(self) -> Vec<NetworkMessage> {
        self.handle.join().expect("fake remote panicked")
    }
}

fn serve(mut stream: TcpStream, behavior: RemoteBehavior) -> Vec<NetworkMessage> {
    let magic = Magic::from(test_settings().get_network());
    stream.set_read_timeout(Some(REMOTE_IDLE_TIMEOUT)).unwrap();

    let own_version = match &behavior {
        RemoteBehavior::Respond {
            protocol_version, ..
        } => *protocol_version,
        _ => test_settings().get_protocol_version(),
    };

    let mut received = Vec::new();
    let peer_version = match read_message(&mut stream, own_version, magic) {
        Ok((NetworkMessage::Version(version), _)) => version,
        Ok((other, _)) => {
            received.push(other);
            return received;
        }
        Err(_) => return received,
    };
    received.push(NetworkMessage::Version(peer_version.clone()));

    let local = stream.local_addr().unwrap();
    let remote = stream.peer_addr().unwrap();
    let mut echo = false;

    match behavior {
        RemoteBehavior::Respond {
            protocol_version,
            user_agent,
        } => {
            let settings = test_settings()
                .with_protocol_version(protocol_version)
                .with_user_agent(user_agent);
            let version = build_version_message(&settings, local, remote, new_nonce());
            write_message(&mut stream, NetworkMessage::Version(version), own_version, magic)
                .unwrap();
            write_message(&mut stream, NetworkMessage::Verack, own_version, magic).unwrap();
            echo = true;
        }
        RemoteBehavior::SendFirst(message) => {
            write_message(&mut stream, message, own_version, magic).unwrap();
        }
        RemoteBehavior::CloseAfterVersion => return received,
        RemoteBehavior::EchoNonce => {
            let version =
                build_version_message(&test_settings(), local, remote, peer_version.nonce);
            write_message(&mut stream, NetworkMessage::Version(version), own_version, magic)
                .unwrap();
            write_message(&mut stream, NetworkMessage::Verack, own_version, magic).unwrap();
        }
        RemoteBehavior::Silent => {}
        RemoteBehavior::Trickle(pause) => {
            let version = build_version_message(&test_settings(), local, remote, new_nonce());
            let mut frame = Vec::new();
            write_message(&mut frame, NetworkMessage::Version(version), own_version, magic)
                .unwrap();
            for byte in frame {
                thread::sleep(pause);
                if stream.write_all(&[byte]).is_err() {
                    return received;
                }
            }
        }
    }

    let pver = negotiate_protocol_version(own_version, peer_version.version);
    while let Ok((message, _)) = read_message(&mut stream, pver, magic) {
        if echo {
            let reply = match &message {
                NetworkMessage::Verack => None,
                NetworkMessage::Ping(nonce) => Some(NetworkMessage::Pong(*nonce)),
                other => Some(other.clone()),
            };
            if let Some(reply) = reply {
                if write_message(&mut stream, reply, pver, magic).is_err() {
                    received.push(message);
                    break;
                }
            }
        }
        received.push(message);
    }
    received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_binds_loopback() {
        let remote = FakeRemote::spawn(RemoteBehavior::Silent);
        assert!(remote.address().starts_with("127.0.0.1:"));

        // Connecting and hanging up straight away releases the thread
        drop(TcpStream::connect(remote.address()).unwrap());
        assert!(remote.join().is_empty());
    }
}
