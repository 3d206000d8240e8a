//! Paper Broker
//!
//! Every order fills completely and instantly at the requested price. No
//! cancels, partials or slippage. Cash and positions change only by
//! applying fills, and each fill is committed to the store together with
//! its order, the position change and an equity point.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use super::ExecutionBackend;
use crate::core::error::ConnectionError;
use crate::core::types::{EquityPoint, Fill, Order, Position, Side};
use crate::data::database::{ExecutionRecord, PositionChange, StateStore};
use crate::portfolio::PortfolioState;

pub struct PaperBroker {
    store: Arc<StateStore>,
    starting_cash: Decimal,
    cash: Decimal,
    positions: HashMap<String, Position>,
}

impl PaperBroker {
    /// Seed positions from the store and rebuild cash from the fill history
    pub fn new(store: Arc<StateStore>, starting_cash: Decimal) -> Result<Self> {
        let positions: HashMap<String, Position> = store
            .get_positions()?
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();

        let spent: Decimal = store
            .get_fills()?
            .iter()
            .map(|f| f.signed_qty() * f.price)
            .sum();

        Ok(Self {
            store,
            starting_cash,
            cash: starting_cash - spent,
            positions,
        })
    }

    pub fn starting_cash(&self) -> Decimal {
        self.starting_cash
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    /// Record, fill and apply one market order
    pub fn execute(&mut self, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Result<Fill> {
        if qty <= Decimal::ZERO {
            bail!("order quantity must be positive, got {}", qty);
        }
        if price <= Decimal::ZERO {
            bail!("order price must be positive, got {}", price);
        }

        let order = Order::market(symbol, side, qty);
        let fill = Fill {
            order_id: order.order_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            price,
            filled_at: Utc::now(),
        };

        let Some(cash) = fill
            .signed_qty()
            .checked_mul(fill.price)
            .and_then(|notional| self.cash.checked_sub(notional))
        else {
            bail!("order notional overflows: {} x {} @ {}", side, qty, price);
        };
        let change = apply_fill(self.positions.get(symbol), &fill);

        // Mark every open position at the traded price
        let mut marked: HashMap<&str, Decimal> =
            self.positions.iter().map(|(s, p)| (s.as_str(), p.qty)).collect();
        match &change {
            PositionChange::Upsert(p) => {
                marked.insert(p.symbol.as_str(), p.qty);
            }
            PositionChange::Remove(s) => {
                marked.remove(s.as_str());
            }
        }
        let Some(equity) = marked
            .values()
            .try_fold(cash, |acc, q| q.checked_mul(price).and_then(|v| acc.checked_add(v)))
        else {
            bail!("equity overflows marking {} positions at {}", marked.len(), price);
        };

        // Persist first so memory never runs ahead of the store
        self.store.record_execution(&ExecutionRecord {
            order,
            fill: fill.clone(),
            position: change.clone(),
            equity: EquityPoint {
                timestamp: fill.filled_at,
                equity,
            },
        })?;

        self.cash = cash;
        match change {
            PositionChange::Upsert(p) => {
                self.positions.insert(p.symbol.clone(), p);
            }
            PositionChange::Remove(s) => {
                self.positions.remove(&s);
            }
        }

        info!(
            "[PAPER] {} {} {} @ {} | cash={} equity={}",
            side, qty, symbol, price, self.cash, equity
        );
        Ok(fill)
    }

    /// Equity at `mark`, high-water mark from the persisted curve, gross
    /// exposure and open position count
    pub fn snapshot(&self, mark: Decimal) -> Result<PortfolioState> {
        let equity = self.cash + self.positions.values().map(|p| p.qty * mark).sum::<Decimal>();
        let exposure = self.positions.values().map(|p| p.qty.abs() * mark).sum();
        let peak = self
            .store
            .get_equity_curve()?
            .iter()
            .map(|p| p.equity)
            .fold(equity, Decimal::max);

        Ok(PortfolioState::new(equity, peak, exposure, self.positions.len()))
    }
}

/// New state of the fill's position.
///
/// Adding keeps the volume-weighted average. Reducing keeps the existing
/// average: closed units realize P&L and do not move the cost of what is
/// left. Crossing through zero opens the remainder at the fill price.
/// Netting to exactly zero removes the position.
pub fn apply_fill(existing: Option<&Position>, fill: &Fill) -> PositionChange {
    let delta = fill.signed_qty();

    let Some(old) = existing else {
        return PositionChange::Upsert(Position {
            symbol: fill.symbol.clone(),
            qty: delta,
            avg_price: fill.price,
        });
    };

    let new_qty = old.qty + delta;
    if new_qty.is_zero() {
        return PositionChange::Remove(fill.symbol.clone());
    }

    let avg_price = if old.qty.is_sign_positive() == delta.is_sign_positive() {
        (old.avg_price * old.qty + fill.price * delta) / new_qty
    } else if new_qty.is_sign_positive() == old.qty.is_sign_positive() {
        old.avg_price
    } else {
        fill.price
    };

    PositionChange::Upsert(Position {
        symbol: fill.symbol.clone(),
        qty: new_qty,
        avg_price,
    })
}

#[async_trait]
impl ExecutionBackend for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn connect(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    async fn submit_order(&mut self, symbol: &str, side: Side, qty: Decimal, price: Decimal) -> Result<Fill> {
        self.execute(symbol, side, qty, price)
    }

    fn portfolio_state(&self, mark: Decimal) -> Result<PortfolioState> {
        self.snapshot(mark)
    }
}
