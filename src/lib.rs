//! Portfolio Mirror - client-side state engine
//! Mirrors a trading server's view of securities, orders and balances, and
//! replays archived market data for backtesting.

// Public modules
pub mod applier;
pub mod audit;
pub mod core;
pub mod lenient;
pub mod orderbook;
pub mod portfolio;
pub mod registry;
pub mod replay;
pub mod report;
pub mod session;
pub mod sums;
pub mod valuation;

// Re-exports
pub use applier::{ApplyOutcome, ProtocolMessageApplier};
pub use core::{Config, Error, GlobalTime, ProtocolViolation, Result};
pub use portfolio::Portfolio;
pub use session::Session;
pub use valuation::{Valuation, ValuationEngine};
