//! Broker Module
//!
//! Execution backends share one capability interface. The orchestrator
//! hands [`select_backend`] a ranked list and trades through the first one
//! that connects.
//! - `paper`: in-process fills against the state store (always connects)
//! - `sim`: simulated venue that can refuse connections
//! - `draft`: LIMIT order drafts that are recorded but never filled

pub mod draft;
pub mod paper;
pub mod sim;

pub use draft::DraftDesk;
pub use paper::PaperBroker;
pub use sim::SimulatedVenue;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::error::ConnectionError;
use crate::core::types::{Fill, Side};
use crate::portfolio::PortfolioState;

/// Execution backend trait - all backends must implement this
#[async_trait]
pub trait ExecutionBackend: Send {
    fn name(&self) -> &str;

    /// Connect to the venue
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Fill `qty` of `symbol` at `price`
    async fn submit_order(&mut self, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Result<Fill>;

    /// Snapshot for the risk engine, every position marked at `mark`
    fn portfolio_state(&self, mark: Decimal) -> Result<PortfolioState>;
}

/// The backend that connected and the ones that did not
pub struct BackendSelection {
    pub backend: Box<dyn ExecutionBackend>,
    pub failures: Vec<ConnectionError>,
}

/// Connect backends in rank order and return the first that succeeds
pub async fn select_backend(backends: Vec<Box<dyn ExecutionBackend>>) -> Result<BackendSelection> {
    let mut failures = Vec::new();

    for mut backend in backends {
        match backend.connect().await {
            Ok(()) => {
                info!("[BROKER] Using {} backend", backend.name());
                return Ok(BackendSelection { backend, failures });
            }
            Err(e) => {
                warn!("[BROKER] {} unavailable, falling back: {}", backend.name(), e);
                failures.push(e);
            }
        }
    }

    bail!("no execution backend connected ({} tried)", failures.len())
}
