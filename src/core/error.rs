//! Error handling - fatal conditions only
//!
//! Tolerated wire noise and unavailable audit sinks never show up here; they
//! are traced where they happen and processing continues.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Portfolio mirror error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed replay record
    #[error("Format error at line {line}: {reason}")]
    Format { line: usize, reason: String },

    /// Server sent something the mirror cannot represent
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Reader was advanced after a previous fatal error
    #[error("Reader halted after a previous format error")]
    ReaderHalted,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol violations halt the session: the snapshot can no longer be valued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("zero quantity order for {code} at price {price}")]
    ZeroQuantity { code: String, price: i32 },

    #[error("order quantity {quantity} for {code} does not fit")]
    QuantityOutOfRange { code: String, quantity: i64 },

    #[error("'{tag}' record without a preceding 'd' record in this batch")]
    MissingCursor { tag: char },

    #[error("security {code} is already {current}, cannot become {requested}")]
    Repromotion {
        code: String,
        current: &'static str,
        requested: &'static str,
    },

    #[error("'d' record without a security code")]
    MissingCode,
}

impl Error {
    pub fn format(line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            line,
            reason: reason.into(),
        }
    }
}
