//! Signal Sources
//!
//! Each agent turns a market snapshot into one trade card per cycle. Agents
//! are pure: they read the snapshot and touch nothing shared. The four here
//! are fixed rule stubs; anything implementing [`SignalSource`] can replace
//! them without the governor noticing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use super::error::CardError;
use super::types::{AgentName, MarketData, Side, TradeCard};

pub trait SignalSource: Send + Sync {
    fn name(&self) -> AgentName;

    fn generate(&self, market: &MarketData) -> Result<TradeCard, CardError>;
}

/// Fixed-opinion agent: side, confidence and exits as multiples of price
#[derive(Debug, Clone)]
pub struct RuleAgent {
    name: AgentName,
    side: Side,
    confidence: f64,
    thesis: &'static str,
    target_mult: Decimal,
    stop_mult: Decimal,
    horizon_days: u32,
    tags: &'static [&'static str],
}

impl RuleAgent {
    pub fn theme() -> Self {
        Self {
            name: AgentName::Theme,
            side: Side::Buy,
            confidence: 0.55,
            thesis: "Macro theme rotation (stub)",
            target_mult: dec!(1.10),
            stop_mult: dec!(0.93),
            horizon_days: 7,
            tags: &["theme"],
        }
    }

    pub fn tech() -> Self {
        Self {
            name: AgentName::Tech,
            side: Side::Buy,
            confidence: 0.6,
            thesis: "Technical breakout setup (stub)",
            target_mult: dec!(1.08),
            stop_mult: dec!(0.94),
            horizon_days: 5,
            tags: &["tech"],
        }
    }

    pub fn event() -> Self {
        Self {
            name: AgentName::Event,
            side: Side::Buy,
            confidence: 0.4,
            thesis: "Event catalyst placeholder",
            target_mult: dec!(1.05),
            stop_mult: dec!(0.95),
            horizon_days: 3,
            tags: &["event"],
        }
    }

    pub fn risk_exec() -> Self {
        Self {
            name: AgentName::RiskExec,
            side: Side::Buy,
            confidence: 0.65,
            thesis: "Risk-adjusted execution plan",
            target_mult: dec!(1.06),
            stop_mult: dec!(0.92),
            horizon_days: 4,
            tags: &["risk", "exec"],
        }
    }
}

impl SignalSource for RuleAgent {
    fn name(&self) -> AgentName {
        self.name
    }

    fn generate(&self, market: &MarketData) -> Result<TradeCard, CardError> {
        let mut draft = TradeCard::draft(self.name, &market.symbol, self.side, self.confidence, self.thesis)
            .target_price((market.price * self.target_mult).round_dp(4))
            .stop_loss((market.price * self.stop_mult).round_dp(4))
            .horizon_days(self.horizon_days);
        for tag in self.tags {
            draft = draft.tag(*tag);
        }
        draft.build()
    }
}

/// The default roster, one agent per [`AgentName`]
pub fn default_agents() -> Vec<Box<dyn SignalSource>> {
    vec![
        Box::new(RuleAgent::theme()),
        Box::new(RuleAgent::tech()),
        Box::new(RuleAgent::event()),
        Box::new(RuleAgent::risk_exec()),
    ]
}

/// Run every source on the snapshot before anything is ranked. A card
/// that fails validation is dropped; the rest of the cycle goes on.
pub fn collect_cards(agents: &[Box<dyn SignalSource>], market: &MarketData) -> Vec<TradeCard> {
    agents
        .iter()
        .filter_map(|agent| match agent.generate(market) {
            Ok(card) => Some(card),
            Err(e) => {
                warn!("[AGENT] {} produced an invalid card: {}", agent.name(), e);
                None
            }
        })
        .collect()
}
