//! Market Data
//!
//! Snapshot provider contract plus the fallback rule: when the feed cannot
//! connect, the cycle runs on the caller's reference price instead of
//! aborting.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::warn;

use crate::core::error::ConnectionError;
use crate::core::types::MarketData;

#[async_trait]
pub trait MarketDataProvider: Send {
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Latest snapshot, or `fallback_price` when the feed has nothing
    async fn get_snapshot(&self, symbol: &str, fallback_price: Decimal) -> MarketData;
}

/// Simulated feed. Quotes the fallback price; can refuse to connect.
pub struct SimulatedFeed {
    fail_connect: bool,
    connected: bool,
}

impl SimulatedFeed {
    pub fn new(fail_connect: bool) -> Self {
        Self {
            fail_connect,
            connected: false,
        }
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedFeed {
    fn name(&self) -> &str {
        "sim-feed"
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.fail_connect {
            return Err(ConnectionError::new("sim-feed", "data connection failed (simulated)"));
        }
        self.connected = true;
        Ok(())
    }

    async fn get_snapshot(&self, symbol: &str, fallback_price: Decimal) -> MarketData {
        MarketData::new(symbol, fallback_price)
    }
}

/// Snapshot from `provider`, or the reference price if there is no provider
/// or it fails to connect. The connection error, if any, is handed back.
pub async fn snapshot_or_fallback(
    provider: Option<&mut (dyn MarketDataProvider + 'static)>,
    symbol: &str,
    reference_price: Decimal,
) -> (MarketData, Option<ConnectionError>) {
    let Some(provider) = provider else {
        return (MarketData::new(symbol, reference_price), None);
    };

    match provider.connect().await {
        Ok(()) => (provider.get_snapshot(symbol, reference_price).await, None),
        Err(e) => {
            warn!("[DATA] {} unavailable, using reference price {}: {}", provider.name(), reference_price, e);
            (MarketData::new(symbol, reference_price), Some(e))
        }
    }
}
