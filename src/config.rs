//! Configuration loader
//!
//! Every section is optional; a missing `config.toml` means all defaults.
//! Two environment variables override the file: `TRADING_DB_PATH` and
//! `SIM_CONNECT_FAIL=1`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::governor::GovernorConfig;
use crate::core::risk::RiskConfig;
use crate::core::scoring::DEFAULT_WEIGHT_FLOOR;

/// Longest a confirmation batch may stay open (one week)
pub const MAX_CONFIRMATION_TIMEOUT_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system: SystemConfig,
    pub storage: StorageConfig,
    pub portfolio: PortfolioConfig,
    pub risk: RiskConfig,
    pub governor: GovernorConfig,
    pub scoring: ScoringConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub name: String,
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "trade-governor".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "trading_mvp.sqlite3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub starting_cash: Decimal,
    /// Units per approved intent
    pub order_qty: Decimal,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            starting_cash: dec!(100000),
            order_qty: dec!(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weight_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_floor: DEFAULT_WEIGHT_FLOOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Approved intents are filled
    #[default]
    Execute,
    /// Approved intents become LIMIT drafts
    Draft,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Try the simulated venue and feed before paper
    pub use_simulated: bool,
    /// Make the simulated venue and feed refuse to connect
    pub simulate_failure: bool,
    pub mode: ExecutionMode,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        let config: Config = toml::from_str(&contents).with_context(|| format!("parsing {}", path))?;
        config.validate().with_context(|| format!("invalid config {}", path))?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let gov = &self.governor;
        if gov.min_intents > gov.max_intents {
            bail!("governor.min_intents {} > max_intents {}", gov.min_intents, gov.max_intents);
        }
        if gov.confirmation_timeout_secs <= 0 || gov.confirmation_timeout_secs > MAX_CONFIRMATION_TIMEOUT_SECS {
            bail!(
                "governor.confirmation_timeout_secs {} outside 1..={}",
                gov.confirmation_timeout_secs,
                MAX_CONFIRMATION_TIMEOUT_SECS
            );
        }

        let risk = &self.risk;
        if risk.min_positions > risk.max_positions {
            bail!("risk.min_positions {} > max_positions {}", risk.min_positions, risk.max_positions);
        }
        if risk.stop_loss_min > risk.stop_loss_max {
            bail!("risk.stop_loss_min {} > stop_loss_max {}", risk.stop_loss_min, risk.stop_loss_max);
        }

        if self.portfolio.starting_cash <= Decimal::ZERO {
            bail!("portfolio.starting_cash must be positive, got {}", self.portfolio.starting_cash);
        }
        if self.portfolio.order_qty <= Decimal::ZERO {
            bail!("portfolio.order_qty must be positive, got {}", self.portfolio.order_qty);
        }
        if !(0.0..1.0).contains(&self.scoring.weight_floor) {
            bail!("scoring.weight_floor {} outside [0, 1)", self.scoring.weight_floor);
        }
        Ok(())
    }

    /// `load`, or defaults when the file does not exist
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides from the given lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("TRADING_DB_PATH").filter(|p| !p.is_empty()) {
            self.storage.db_path = path;
        }
        if lookup("SIM_CONNECT_FAIL").as_deref() == Some("1") {
            self.broker.simulate_failure = true;
        }
    }
}
