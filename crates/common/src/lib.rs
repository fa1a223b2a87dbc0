//! Shared types, config, and error definitions for the daemon.

pub mod config;
pub mod error;
pub mod tables;
pub mod types;

pub use config::BotConfig;
pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
