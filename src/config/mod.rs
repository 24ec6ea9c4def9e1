//! Configuration management
//!
//! This module holds the client-wide settings every peer reads: the protocol
//! version we speak, the network we are on, the user agent we announce and
//! the timeouts bounding blocking operations.
//!
//! A single `ClientConfig` is shared read-only by any number of peers.

pub mod settings;

pub use settings::{ClientConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_PROTOCOL_VERSION};
