//! Governor
//!
//! Turns one cycle's trade cards into a ranked, bounded set of sized
//! intents by weighted vote. Holds no state between cycles: the weights it
//! votes with are handed in by the caller at cycle start.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::types::{AgentName, Side, TradeCard, TradeIntent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Notional per unit of score
    pub notional_scale: Decimal,
    /// Score floor applied before sizing
    pub min_score: f64,
    pub min_intents: usize,
    pub max_intents: usize,
    /// Cards below this confidence flag their symbol for confirmation
    pub confirm_confidence: f64,
    /// Cards carrying this tag flag their symbol for confirmation
    pub confirm_tag: String,
    /// How long a pending confirmation batch stays open
    pub confirmation_timeout_secs: i64,
    /// Weights used when the store has none yet
    pub default_weights: HashMap<AgentName, f64>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            notional_scale: dec!(5000),
            min_score: 0.1,
            min_intents: 3,
            max_intents: 6,
            confirm_confidence: 0.35,
            confirm_tag: "high-risk".to_string(),
            confirmation_timeout_secs: 900,
            default_weights: HashMap::from([
                (AgentName::Theme, 0.3),
                (AgentName::Tech, 0.3),
                (AgentName::Event, 0.2),
                (AgentName::RiskExec, 0.2),
            ]),
        }
    }
}

/// Asks a human whether flagged intents may proceed
pub trait ConfirmationPrompt {
    /// True only on an explicit yes
    fn confirm(&self, flagged: &[&TradeIntent]) -> bool;
}

pub struct Governor {
    weights: HashMap<AgentName, f64>,
    config: GovernorConfig,
}

impl Governor {
    pub fn new(weights: HashMap<AgentName, f64>) -> Self {
        Self::with_config(weights, GovernorConfig::default())
    }

    pub fn with_config(weights: HashMap<AgentName, f64>, config: GovernorConfig) -> Self {
        Self { weights, config }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Weight of an agent this cycle. Unknown agents vote with zero weight.
    pub fn weight(&self, agent: AgentName) -> f64 {
        self.weights.get(&agent).copied().unwrap_or(0.0)
    }

    /// Weighted score per (symbol, side), in first-seen order.
    ///
    /// Opposite sides of one symbol stay separate groups and are never
    /// netted.
    fn score_cards(&self, cards: &[TradeCard]) -> Vec<((String, Side), f64)> {
        let mut groups: Vec<((String, Side), f64)> = Vec::new();
        let mut index: HashMap<(String, Side), usize> = HashMap::new();

        for card in cards {
            let key = (card.symbol().to_string(), card.side());
            let vote = card.confidence() * self.weight(card.agent());
            match index.get(&key) {
                Some(&i) => groups[i].1 += vote,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vote));
                }
            }
        }

        groups
    }

    /// Rank and size the cycle's intents.
    ///
    /// Emits between `min_intents` and `max_intents` intents when that many
    /// distinct (symbol, side) groups exist, fewer only when fewer exist.
    pub fn build_intents(&self, cards: &[TradeCard]) -> Vec<TradeIntent> {
        let mut ranked = self.score_cards(cards);
        // Stable: equal scores keep grouping order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let target = ranked
            .len()
            .clamp(self.config.min_intents, self.config.max_intents);

        let intents: Vec<TradeIntent> = ranked
            .into_iter()
            .take(target)
            .map(|((symbol, side), score)| {
                let sized = Decimal::from_f64(score.max(self.config.min_score))
                    .unwrap_or(Decimal::ZERO);
                let requires_confirmation = self.needs_confirmation(cards, &symbol);
                TradeIntent {
                    // Notional is quoted in cents; the risk gate sees the rounded value
                    size: (self.config.notional_scale * sized).round_dp(2),
                    reason: "weighted agent vote".to_string(),
                    requires_confirmation,
                    created_at: Utc::now(),
                    symbol,
                    side,
                    score,
                }
            })
            .collect();

        for intent in &intents {
            debug!(
                "[GOVERNOR] {} {} score={:.3} size={} confirm={}",
                intent.side, intent.symbol, intent.score, intent.size, intent.requires_confirmation
            );
        }
        info!("[GOVERNOR] {} cards -> {} intents", cards.len(), intents.len());

        intents
    }

    /// Any card on the symbol (either side) that is tagged high-risk or
    /// under-confident flags it.
    fn needs_confirmation(&self, cards: &[TradeCard], symbol: &str) -> bool {
        cards
            .iter()
            .filter(|c| c.symbol() == symbol)
            .any(|c| c.has_tag(&self.config.confirm_tag) || c.confidence() < self.config.confirm_confidence)
    }

    /// Single-call confirmation gate.
    ///
    /// Nothing flagged: returned unchanged without prompting. Otherwise the
    /// prompt decides for the whole batch; anything but yes drops every
    /// flagged intent.
    pub fn confirm_intents(
        &self,
        intents: Vec<TradeIntent>,
        prompt: &dyn ConfirmationPrompt,
    ) -> Vec<TradeIntent> {
        let flagged: Vec<&TradeIntent> = intents.iter().filter(|i| i.requires_confirmation).collect();
        if flagged.is_empty() {
            return intents;
        }

        if prompt.confirm(&flagged) {
            info!("[GOVERNOR] {} flagged intents confirmed", flagged.len());
            return intents;
        }

        warn!("[GOVERNOR] {} flagged intents declined", flagged.len());
        intents.into_iter().filter(|i| !i.requires_confirmation).collect()
    }
}
