//! Scripted remote nodes for exercising peers over loopback TCP
//!
//! Compiled only for tests.

pub mod test_utils;

pub use test_utils::*;
