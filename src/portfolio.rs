//! Portfolio State
//!
//! The snapshot the risk engine gates against: equity, its high-water mark,
//! aggregate exposure and the open position count. Drawdown is derived,
//! never stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub equity: Decimal,
    /// High-water mark of equity
    pub peak_equity: Decimal,
    pub exposure: Decimal,
    pub positions_count: usize,
}

impl PortfolioState {
    pub fn new(equity: Decimal, peak_equity: Decimal, exposure: Decimal, positions_count: usize) -> Self {
        Self {
            equity,
            peak_equity,
            exposure,
            positions_count,
        }
    }

    /// Flat account with no history
    pub fn flat(equity: Decimal) -> Self {
        Self::new(equity, equity, Decimal::ZERO, 0)
    }

    /// (equity - peak) / peak, 0 when there is no peak yet
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity.is_zero() {
            return Decimal::ZERO;
        }
        (self.equity - self.peak_equity) / self.peak_equity
    }
}
