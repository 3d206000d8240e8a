//! Decision Cycle
//!
//! One pass of the pipeline: snapshot -> cards -> intents -> confirmation
//! -> risk gate -> execution -> scoring. Cycles are sequential; nothing
//! here is shared with another cycle except the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::broker::{select_backend, DraftDesk, ExecutionBackend};
use crate::config::{Config, ExecutionMode};
use crate::core::agent::{collect_cards, SignalSource};
use crate::core::approval::{ApprovalQueue, Decision, Outcome, Proposal};
use crate::core::governor::{ConfirmationPrompt, Governor};
use crate::core::risk::RiskEngine;
use crate::core::scoring::ScoringEngine;
use crate::core::types::{
    AgentName, AgentWeight, DailySummary, Fill, MarketData, Order, RiskCheckResult, TradeCard, TradeIntent,
};
use crate::data::database::StateStore;
use crate::data::market::{snapshot_or_fallback, MarketDataProvider};

/// Stop distance used when no card for the symbol names a stop
pub const DEFAULT_STOP_DISTANCE: Decimal = dec!(0.08);

/// Collaborators for one cycle
pub struct CycleContext<'a> {
    pub config: &'a Config,
    pub store: Arc<StateStore>,
    pub symbol: String,
    pub reference_price: Decimal,
    pub agents: Vec<Box<dyn SignalSource>>,
    pub feed: Option<Box<dyn MarketDataProvider>>,
    /// Execution backends in rank order
    pub backends: Vec<Box<dyn ExecutionBackend>>,
    /// None skips confirmation entirely
    pub prompt: Option<&'a dyn ConfirmationPrompt>,
}

#[derive(Debug, Clone)]
pub struct IntentDecision {
    pub intent: TradeIntent,
    pub stop_loss_distance: Decimal,
    pub result: RiskCheckResult,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub market: MarketData,
    pub backend: String,
    pub cards: Vec<TradeCard>,
    pub intents: Vec<TradeIntent>,
    pub confirmation: Option<Outcome>,
    pub decisions: Vec<IntentDecision>,
    pub fills: Vec<Fill>,
    pub drafts: Vec<Order>,
    pub summary: DailySummary,
    pub weights: Vec<AgentWeight>,
}

/// |price - stop| / price from the first card on the symbol that carries a
/// stop. Cards without a stop are skipped rather than forcing the default;
/// 0.08 applies only when no card on the symbol has one.
pub fn stop_loss_distance(cards: &[TradeCard], symbol: &str, price: Decimal) -> Decimal {
    if price.is_zero() {
        return DEFAULT_STOP_DISTANCE;
    }
    cards
        .iter()
        .filter(|c| c.symbol() == symbol)
        .find_map(|c| c.stop_loss())
        .map(|stop| ((price - stop) / price).abs())
        .unwrap_or(DEFAULT_STOP_DISTANCE)
}

/// Weights the governor votes with: the stored set, or config defaults
/// when nothing is stored yet
pub fn load_weights(store: &StateStore, config: &Config) -> Result<HashMap<AgentName, f64>> {
    let stored: HashMap<AgentName, f64> = store
        .get_agent_weights()?
        .into_iter()
        .map(|w| (w.agent, w.weight))
        .collect();

    if stored.is_empty() {
        return Ok(config.governor.default_weights.clone());
    }
    Ok(stored)
}

pub async fn run_cycle(ctx: CycleContext<'_>) -> Result<CycleReport> {
    let CycleContext {
        config,
        store,
        symbol,
        reference_price,
        agents,
        mut feed,
        backends,
        prompt,
    } = ctx;
    config.validate()?;

    // Market data, falling back to the reference price
    let (market, feed_error) = match feed.as_mut() {
        Some(f) => snapshot_or_fallback(Some(f.as_mut()), &symbol, reference_price).await,
        None => snapshot_or_fallback(None, &symbol, reference_price).await,
    };
    if let Some(e) = feed_error {
        store.add_log("WARN", &format!("market data fallback: {}", e))?;
    }

    // Execution backend, first in rank order that connects
    let selection = select_backend(backends).await?;
    for failure in &selection.failures {
        store.add_log("WARN", &format!("broker fallback: {}", failure))?;
    }
    let mut backend = selection.backend;

    // Cards from every agent, then the weighted vote
    let cards = collect_cards(&agents, &market);
    let governor = Governor::with_config(load_weights(&store, config)?, config.governor.clone());
    let intents = governor.build_intents(&cards);

    let (confirmed, confirmation) = match prompt {
        Some(prompt) => confirm(intents.clone(), prompt, config.governor.confirmation_timeout_secs),
        None => (intents.clone(), None),
    };

    // Risk gate and execution, one intent at a time
    let risk = RiskEngine::new(config.risk.clone());
    let desk = DraftDesk::new(store.clone());
    let mut decisions = Vec::with_capacity(confirmed.len());
    let mut fills = Vec::new();
    let mut drafts = Vec::new();

    for intent in confirmed {
        let state = backend.portfolio_state(market.price)?;
        let distance = stop_loss_distance(&cards, &intent.symbol, market.price);
        let result = risk.evaluate(&intent, &state, distance);

        if result.approved {
            let qty = config.portfolio.order_qty;
            match config.broker.mode {
                ExecutionMode::Execute => {
                    fills.push(backend.submit_order(&intent.symbol, intent.side, qty, market.price).await?)
                }
                ExecutionMode::Draft => {
                    drafts.push(desk.create_order_draft(&intent.symbol, intent.side, qty, market.price)?)
                }
            }
        } else {
            warn!("[CYCLE] {} {} rejected: {}", intent.side, intent.symbol, result.reason);
            store.add_log(
                "INFO",
                &format!("risk rejected {} {}: {}", intent.side, intent.symbol, result.reason),
            )?;
        }

        decisions.push(IntentDecision {
            intent,
            stop_loss_distance: distance,
            result,
        });
    }

    // Feedback: summarize, then reweight from this cycle's confidences
    let scoring = ScoringEngine::new(store.clone());
    let summary = scoring.daily_summary(None)?;
    let scores: BTreeMap<AgentName, f64> = cards.iter().map(|c| (c.agent(), c.confidence())).collect();
    let weights = scoring.update_weekly_weights(&scores, config.scoring.weight_floor)?;

    info!(
        "[CYCLE] {} cards, {} intents, {} approved, {} fills, {} drafts via {}",
        cards.len(),
        intents.len(),
        decisions.iter().filter(|d| d.result.approved).count(),
        fills.len(),
        drafts.len(),
        backend.name()
    );

    Ok(CycleReport {
        market,
        backend: backend.name().to_string(),
        cards,
        intents,
        confirmation,
        decisions,
        fills,
        drafts,
        summary,
        weights,
    })
}

/// Propose the batch and, if anything is flagged, put the prompt's answer
/// through the approval queue
fn confirm(
    intents: Vec<TradeIntent>,
    prompt: &dyn ConfirmationPrompt,
    timeout_secs: i64,
) -> (Vec<TradeIntent>, Option<Outcome>) {
    let mut queue = ApprovalQueue::new(Duration::seconds(timeout_secs));

    match queue.propose(intents.clone()) {
        Proposal::Ready(intents) => (intents, None),
        Proposal::Pending { id, flagged, .. } => {
            let flagged_refs: Vec<&TradeIntent> = flagged.iter().collect();
            let decision = if prompt.confirm(&flagged_refs) {
                Decision::Approve
            } else {
                Decision::Decline
            };
            match queue.resolve(id, decision) {
                Ok(resolution) => (resolution.intents, Some(resolution.outcome)),
                // The id came from this queue; keep only what needed no approval
                Err(_) => (
                    intents.into_iter().filter(|i| !i.requires_confirmation).collect(),
                    Some(Outcome::Declined),
                ),
            }
        }
    }
}
