//! Bridge Service — starts the configured backends, merges their tools, and
//! serves listing and invocation for the lifetime of the process.

pub mod errors;
pub mod service;

pub use errors::BridgeError;
pub use service::{BridgeService, BridgeState, StartupReport};
