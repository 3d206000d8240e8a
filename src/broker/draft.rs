//! Draft Desk
//!
//! Prepares LIMIT orders for a venue that needs manual submission. Drafts
//! are persisted as orders and never filled, so they do not touch cash,
//! positions or the equity curve.

use std::sync::Arc;

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use tracing::info;

use crate::core::types::{Order, Side};
use crate::data::database::StateStore;

pub struct DraftDesk {
    store: Arc<StateStore>,
}

impl DraftDesk {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    pub fn create_order_draft(&self, symbol: &str, side: Side, qty: Decimal, limit_price: Decimal) -> Result<Order> {
        if qty <= Decimal::ZERO || limit_price <= Decimal::ZERO {
            bail!("draft needs positive qty and limit price, got {} @ {}", qty, limit_price);
        }

        let mut order = Order::limit(symbol, side, qty, limit_price);
        order.order_id = format!("draft-{}", order.order_id);
        self.store.add_order(&order)?;

        info!("[DRAFT] {} {} {} LIMIT {}", side, qty, symbol, limit_price);
        Ok(order)
    }
}
