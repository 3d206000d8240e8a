//! Simulated Venue
//!
//! Stand-in for a broker's simulation account. Connecting can be made to
//! fail (config flag or `SIM_CONNECT_FAIL=1`) to exercise the fallback
//! path. Fills go through an inner paper broker on the same store.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

use super::{ExecutionBackend, PaperBroker};
use crate::core::error::ConnectionError;
use crate::core::types::{Fill, Side};
use crate::data::database::StateStore;
use crate::portfolio::PortfolioState;

pub struct SimulatedVenue {
    paper: PaperBroker,
    fail_connect: bool,
    connected: bool,
}

impl SimulatedVenue {
    pub fn new(store: Arc<StateStore>, starting_cash: Decimal, fail_connect: bool) -> Result<Self> {
        Ok(Self {
            paper: PaperBroker::new(store, starting_cash)?,
            fail_connect,
            connected: false,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedVenue {
    fn name(&self) -> &str {
        "sim"
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.fail_connect {
            return Err(ConnectionError::new("sim", "connection refused (simulated)"));
        }
        self.connected = true;
        Ok(())
    }

    async fn submit_order(&mut self, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Result<Fill> {
        debug!("[SIM] {} {} {} (connected={})", side, qty, symbol, self.connected);
        self.paper.execute(symbol, side, qty, price)
    }

    fn portfolio_state(&self, mark: Decimal) -> Result<PortfolioState> {
        self.paper.snapshot(mark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_refuses_when_configured_to_fail() {
        let store = Arc::new(StateStore::new(":memory:").unwrap());
        let mut venue = SimulatedVenue::new(store, dec!(100000), true).unwrap();
        let err = venue.connect().await.unwrap_err();
        assert_eq!(err.source_name, "sim");
        assert!(!venue.is_connected());
    }

    #[tokio::test]
    async fn test_fills_through_paper() {
        let store = Arc::new(StateStore::new(":memory:").unwrap());
        let mut venue = SimulatedVenue::new(store.clone(), dec!(100000), false).unwrap();
        venue.connect().await.unwrap();
        let fill = venue.submit_order("AAPL", Side::Buy, dec!(2), dec!(190)).await.unwrap();
        assert_eq!(fill.price, dec!(190));
        assert_eq!(store.get_fills().unwrap().len(), 1);
        assert_eq!(venue.portfolio_state(dec!(190)).unwrap().positions_count, 1);
    }
}
