use crate::error::{PeerError, Result};
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PROTOCOL_VERSION: u32 = 70015;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Longest user agent the protocol allows in a version message
const MAX_USER_AGENT_LEN: usize = 256;

const DEFAULT_USER_AGENT: &str = concat!("/btc-probe:", env!("CARGO_PKG_VERSION"), "/");

const PROTOCOL_VERSION_KEY: &str = "BTC_PROBE_PROTOCOL_VERSION";
const NETWORK_KEY: &str = "BTC_PROBE_NETWORK";
const USER_AGENT_KEY: &str = "BTC_PROBE_USER_AGENT";

/// Client-wide settings shared by every peer
///
/// Timeouts are kept in milliseconds; zero means "no deadline".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    protocol_version: u32,
    network: Network,
    user_agent: String,
    connect_timeout_ms: u64,
    handshake_timeout_ms: u64,
    receive_timeout_ms: u64,
    reject_self_connections: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            network: Network::Bitcoin,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            receive_timeout_ms: 0,
            reject_self_connections: true,
        }
    }
}

impl ClientConfig {
    pub fn new(network: Network) -> ClientConfig {
        ClientConfig {
            network,
            ..Default::default()
        }
    }

    /// Load settings from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            PeerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<ClientConfig> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<ClientConfig> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<ClientConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(version) = lookup(PROTOCOL_VERSION_KEY) {
            self.protocol_version = version.trim().parse().map_err(|e| {
                PeerError::Config(format!("Invalid {PROTOCOL_VERSION_KEY} '{version}': {e}"))
            })?;
        }
        if let Some(network) = lookup(NETWORK_KEY) {
            self.network = Network::from_str(network.trim()).map_err(|e| {
                PeerError::Config(format!("Invalid {NETWORK_KEY} '{network}': {e}"))
            })?;
        }
        if let Some(user_agent) = lookup(USER_AGENT_KEY) {
            self.user_agent = user_agent;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.protocol_version == 0 {
            return Err(PeerError::Config(
                "protocol_version must be greater than zero".to_string(),
            ));
        }
        if self.user_agent.is_empty() {
            return Err(PeerError::Config("user_agent must not be empty".to_string()));
        }
        if self.user_agent.len() > MAX_USER_AGENT_LEN {
            return Err(PeerError::Config(format!(
                "user_agent is {} bytes, the maximum is {MAX_USER_AGENT_LEN}",
                self.user_agent.len()
            )));
        }
        Ok(())
    }

    pub fn with_protocol_version(mut self, protocol_version: u32) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// A zero timeout leaves the connect attempt to the OS default
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_to_millis(timeout);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout_ms = timeout.map(duration_to_millis).unwrap_or(0);
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout_ms = timeout.map(duration_to_millis).unwrap_or(0);
        self
    }

    pub fn with_reject_self_connections(mut self, reject: bool) -> Self {
        self.reject_self_connections = reject;
        self
    }

    pub fn get_protocol_version(&self) -> u32 {
        self.protocol_version
    }

    pub fn get_network(&self) -> Network {
        self.network
    }

    pub fn get_user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn get_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn get_handshake_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.handshake_timeout_ms)
    }

    pub fn get_receive_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.receive_timeout_ms)
    }

    pub fn rejects_self_connections(&self) -> bool {
        self.reject_self_connections
    }
}

// Anything shorter than a millisecond still counts as a deadline
fn duration_to_millis(timeout: Duration) -> u64 {
    if timeout.is_zero() {
        return 0;
    }
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn non_zero_millis(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}
