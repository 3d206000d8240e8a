//! Typed errors for the decision pipeline
//!
//! Application plumbing uses `anyhow`. These are the cases a caller
//! branches on.

use thiserror::Error;
use uuid::Uuid;

/// A collaborator (market data feed, simulated venue) could not be reached.
///
/// Always recoverable: the caller falls back to paper execution or the
/// supplied reference price.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{source_name} connection failed: {reason}")]
pub struct ConnectionError {
    pub source_name: String,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// TradeCard validation failure. Fatal to the card, not to the cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CardError {
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("{field} must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApprovalError {
    #[error("no pending confirmation batch with id {0}")]
    UnknownBatch(Uuid),
}
