//! Shared foundation for the dingbridge workspace: configuration loading and
//! the cross-cutting error taxonomy used by the stream listener and the
//! webhook reply sender.

pub mod config;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use errors::BridgeError;
