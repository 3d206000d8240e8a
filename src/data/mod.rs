//! Data Module
//!
//! Data persistence and retrieval.
//! - SQLite state store for orders, fills, positions, equity and weights
//! - Market data snapshots with reference-price fallback

pub mod database;
pub mod market;

pub use database::StateStore;
pub use market::{MarketDataProvider, SimulatedFeed};
