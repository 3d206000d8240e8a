//! Risk Engine
//!
//! Account protection layer. Stateless: every decision is a pure function
//! of the intent, the portfolio snapshot and the fixed limits. No trade
//! reaches a broker without approval here.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{RiskCheckResult, TradeIntent};
use crate::portfolio::PortfolioState;

/// Floor used wherever a divisor could be zero
pub const EPSILON: Decimal = dec!(0.000001);

/// Risk limits (these are protection settings, not strategy parameters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Max (exposure + new notional) / equity
    pub max_leverage: Decimal,
    /// Drawdown floor (negative). At or below it no new risk is taken.
    pub max_drawdown: Decimal,
    pub min_positions: usize,
    pub max_positions: usize,
    /// Stop-loss distance bounds as a fraction of the reference price
    pub stop_loss_min: Decimal,
    pub stop_loss_max: Decimal,
    /// Fraction of equity that may be lost on one trade at its stop
    pub risk_budget: Decimal,
    /// Also reject when the projected position count is below `min_positions`.
    ///
    /// The projection is always `positions_count + 1`, even when the intent
    /// adds to or reduces an existing symbol. With this on, a flat account
    /// can never open its first position.
    pub enforce_min_positions: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_leverage: dec!(2.0),
            max_drawdown: dec!(-0.18),
            min_positions: 3,
            max_positions: 6,
            stop_loss_min: dec!(0.06),
            stop_loss_max: dec!(0.12),
            risk_budget: dec!(0.025),
            enforce_min_positions: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Notional whose loss at the stop equals the per-trade risk budget
    pub fn suggested_notional(&self, equity: Decimal, stop_loss_distance: Decimal) -> Decimal {
        equity * self.config.risk_budget / stop_loss_distance.max(EPSILON)
    }

    /// Approve or reject one intent. Checks run in a fixed order and the
    /// first failure wins.
    pub fn evaluate(
        &self,
        intent: &TradeIntent,
        state: &PortfolioState,
        stop_loss_distance: Decimal,
    ) -> RiskCheckResult {
        let cfg = &self.config;

        // Check 1: drawdown floor halts everything
        if state.drawdown() <= cfg.max_drawdown {
            return self.reject(intent, "max drawdown reached, block new trades".to_string());
        }

        // Check 2: stop distance band
        if stop_loss_distance < cfg.stop_loss_min || stop_loss_distance > cfg.stop_loss_max {
            return self.reject(intent, format!(
                "stop loss distance {} out of bounds [{}, {}]",
                stop_loss_distance, cfg.stop_loss_min, cfg.stop_loss_max
            ));
        }

        // Check 3: diversification band. Assumes the intent opens exactly one
        // new position.
        let projected = state.positions_count + 1;
        let below = cfg.enforce_min_positions && projected < cfg.min_positions;
        if below || projected > cfg.max_positions {
            return self.reject(intent, format!(
                "positions count {} outside {}-{} range",
                projected, cfg.min_positions, cfg.max_positions
            ));
        }

        // Check 4: leverage
        let Some(leverage) = state
            .exposure
            .checked_add(intent.size)
            .and_then(|gross| gross.checked_div(state.equity.max(EPSILON)))
        else {
            return self.reject(intent, "max leverage exceeded (gross notional overflow)".to_string());
        };
        if leverage > cfg.max_leverage {
            return self.reject(intent, format!(
                "max leverage exceeded ({:.2} > {})",
                leverage, cfg.max_leverage
            ));
        }

        // Check 5: worst-case loss at the stop
        let (Some(risk_amount), Some(budget)) = (
            intent.size.checked_mul(stop_loss_distance),
            state.equity.checked_mul(cfg.risk_budget),
        ) else {
            return self.reject(intent, "risk budget exceeded (risk amount overflow)".to_string());
        };
        if risk_amount > budget {
            return self.reject(intent, format!(
                "risk budget exceeded ({:.2} > {:.2})",
                risk_amount, budget
            ));
        }

        debug!("[RISK] {} {} approved", intent.side, intent.symbol);
        RiskCheckResult::approve()
    }

    fn reject(&self, intent: &TradeIntent, reason: String) -> RiskCheckResult {
        debug!("[RISK] {} {} rejected: {}", intent.side, intent.symbol, reason);
        RiskCheckResult::reject(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;
    use chrono::Utc;

    fn intent(size: Decimal) -> TradeIntent {
        TradeIntent {
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            score: 0.4,
            size,
            reason: "weighted agent vote".to_string(),
            requires_confirmation: false,
            created_at: Utc::now(),
        }
    }

    fn flat() -> PortfolioState {
        PortfolioState::flat(dec!(100000))
    }

    #[test]
    fn test_approves_within_limits() {
        let engine = RiskEngine::default();
        let result = engine.evaluate(&intent(dec!(5000)), &flat(), dec!(0.08));
        assert!(result.approved, "{}", result.reason);
        assert_eq!(result.reason, "approved");
    }

    #[test]
    fn test_rejects_wide_stop() {
        let engine = RiskEngine::default();
        let result = engine.evaluate(&intent(dec!(5000)), &flat(), dec!(0.20));
        assert!(!result.approved);
        assert!(result.reason.contains("stop loss distance"));
    }

    #[test]
    fn test_rejects_tight_stop() {
        let engine = RiskEngine::default();
        let result = engine.evaluate(&intent(dec!(5000)), &flat(), dec!(0.02));
        assert!(result.reason.contains("stop loss distance"));
    }

    #[test]
    fn test_stop_bounds_are_inclusive() {
        let engine = RiskEngine::default();
        assert!(engine.evaluate(&intent(dec!(5000)), &flat(), dec!(0.06)).approved);
        assert!(engine.evaluate(&intent(dec!(5000)), &flat(), dec!(0.12)).approved);
    }

    #[test]
    fn test_drawdown_short_circuits() {
        let engine = RiskEngine::default();
        let state = PortfolioState::new(dec!(82000), dec!(100000), dec!(0), 0);
        // Also a bad stop, but drawdown is reported
        let result = engine.evaluate(&intent(dec!(5000)), &state, dec!(0.5));
        assert!(!result.approved);
        assert!(result.reason.contains("drawdown"));
    }

    #[test]
    fn test_drawdown_just_above_floor_passes() {
        let engine = RiskEngine::default();
        let state = PortfolioState::new(dec!(82001), dec!(100000), dec!(0), 0);
        assert!(engine.evaluate(&intent(dec!(1000)), &state, dec!(0.08)).approved);
    }

    #[test]
    fn test_max_positions() {
        let engine = RiskEngine::default();
        let state = PortfolioState::new(dec!(100000), dec!(100000), dec!(0), 5);
        assert!(engine.evaluate(&intent(dec!(1000)), &state, dec!(0.08)).approved);

        let state = PortfolioState::new(dec!(100000), dec!(100000), dec!(0), 6);
        let result = engine.evaluate(&intent(dec!(1000)), &state, dec!(0.08));
        assert!(result.reason.contains("positions count 7"));
    }

    #[test]
    fn test_enforced_min_positions_blocks_flat_account() {
        let engine = RiskEngine::new(RiskConfig {
            enforce_min_positions: true,
            ..RiskConfig::default()
        });
        let result = engine.evaluate(&intent(dec!(5000)), &flat(), dec!(0.08));
        assert!(!result.approved);
        assert!(result.reason.contains("outside 3-6"));

        let state = PortfolioState::new(dec!(100000), dec!(100000), dec!(0), 2);
        assert!(engine.evaluate(&intent(dec!(5000)), &state, dec!(0.08)).approved);
    }

    #[test]
    fn test_leverage_limit() {
        let engine = RiskEngine::default();
        let state = PortfolioState::new(dec!(100000), dec!(100000), dec!(198000), 3);
        let result = engine.evaluate(&intent(dec!(5000)), &state, dec!(0.08));
        assert!(result.reason.contains("leverage"));
    }

    #[test]
    fn test_zero_equity_hits_leverage_not_panic() {
        let engine = RiskEngine::default();
        let state = PortfolioState::new(dec!(0), dec!(0), dec!(0), 0);
        let result = engine.evaluate(&intent(dec!(10)), &state, dec!(0.08));
        assert!(!result.approved);
        assert!(result.reason.contains("leverage"));
    }

    #[test]
    fn test_overflowing_notional_rejects_not_panic() {
        let engine = RiskEngine::default();
        let state = PortfolioState::new(dec!(100000), dec!(100000), Decimal::MAX, 3);
        let result = engine.evaluate(&intent(dec!(1)), &state, dec!(0.08));
        assert!(!result.approved);
        assert!(result.reason.contains("leverage"));

        // Near-zero equity blows up the division instead of the sum
        let state = PortfolioState::new(dec!(0), dec!(0), Decimal::MAX / dec!(2), 0);
        let result = engine.evaluate(&intent(dec!(1)), &state, dec!(0.08));
        assert!(result.reason.contains("overflow"));
    }

    #[test]
    fn test_risk_budget() {
        let engine = RiskEngine::default();
        // 40000 * 0.08 = 3200 > 2500
        let result = engine.evaluate(&intent(dec!(40000)), &flat(), dec!(0.08));
        assert!(result.reason.contains("risk budget"));
    }

    #[test]
    fn test_suggested_notional() {
        let engine = RiskEngine::default();
        assert_eq!(engine.suggested_notional(dec!(100000), dec!(0.08)), dec!(31250));
        // Zero stop floors at epsilon instead of dividing by zero
        assert!(engine.suggested_notional(dec!(100000), dec!(0)) > dec!(1000000));
    }
}
