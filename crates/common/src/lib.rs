//! Common utilities shared across the node binaries.

pub mod logging;
