//! Core module - Common types, time, configuration and error handling

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::GlobalTime;
pub use config::Config;
pub use error::{Error, ProtocolViolation, Result};
pub use types::*;
