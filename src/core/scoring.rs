//! Scoring Engine
//!
//! Turns realized per-agent scores into the weight distribution the
//! governor votes with next cycle, and summarizes the day from the
//! persisted equity curve and fills.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::types::{AgentName, AgentWeight, DailySummary};
use crate::data::database::StateStore;

pub const DEFAULT_WEIGHT_FLOOR: f64 = 0.05;

pub struct ScoringEngine {
    store: Arc<StateStore>,
}

impl ScoringEngine {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// P&L is last equity point minus first (0 with no curve); trades is the
    /// number of persisted fills. Dated today (UTC) unless a date is given.
    pub fn daily_summary(&self, date: Option<chrono::NaiveDate>) -> Result<DailySummary> {
        let fills = self.store.get_fills()?;
        let curve = self.store.get_equity_curve()?;

        let pnl = match (curve.first(), curve.last()) {
            (Some(first), Some(last)) => last.equity - first.equity,
            _ => Decimal::ZERO,
        };

        Ok(DailySummary {
            date: date.unwrap_or_else(|| Utc::now().date_naive()),
            pnl,
            trades: fills.len(),
            notes: "auto-generated".to_string(),
        })
    }

    /// Softmax the scores, hold every agent at or above `floor`, persist.
    ///
    /// Agents whose softmax share falls under the floor are pinned to it and
    /// the remaining mass is shared among the rest in proportion to their
    /// softmax share, repeating until nobody is left under the floor. The
    /// result sums to 1 and keeps the ranking of agents above the floor.
    pub fn update_weekly_weights(
        &self,
        scores: &BTreeMap<AgentName, f64>,
        floor: f64,
    ) -> Result<Vec<AgentWeight>> {
        let weights = floored_softmax(scores, floor)?;
        let now = Utc::now();

        let mut stored = Vec::with_capacity(weights.len());
        for (agent, weight) in weights {
            let record = AgentWeight {
                agent,
                weight,
                updated_at: now,
            };
            self.store.set_agent_weight(&record)?;
            stored.push(record);
        }

        info!(
            "[SCORING] weights updated: {}",
            stored
                .iter()
                .map(|w| format!("{}={:.3}", w.agent, w.weight))
                .collect::<Vec<_>>()
                .join(" ")
        );
        Ok(stored)
    }
}

/// Softmax with a guaranteed minimum share per agent
pub fn floored_softmax(scores: &BTreeMap<AgentName, f64>, floor: f64) -> Result<BTreeMap<AgentName, f64>> {
    if !(0.0..1.0).contains(&floor) {
        bail!("weight floor {} outside [0, 1)", floor);
    }
    if let Some((agent, score)) = scores.iter().find(|(_, s)| !s.is_finite()) {
        bail!("non-finite score {} for {}", score, agent);
    }
    if scores.is_empty() {
        return Ok(BTreeMap::new());
    }

    let n = scores.len() as f64;
    if n * floor >= 1.0 {
        if n * floor > 1.0 {
            warn!("[SCORING] floor {} infeasible for {} agents, using uniform weights", floor, scores.len());
        }
        return Ok(scores.keys().map(|a| (*a, 1.0 / n)).collect());
    }

    // Shifting by the max leaves softmax unchanged and keeps exp() finite
    let max = scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: BTreeMap<AgentName, f64> = scores.iter().map(|(a, s)| (*a, (s - max).exp())).collect();
    let total: f64 = exps.values().sum();
    let base: BTreeMap<AgentName, f64> = exps.iter().map(|(a, e)| (*a, e / total)).collect();

    let mut pinned: BTreeSet<AgentName> = BTreeSet::new();
    loop {
        let free_mass = 1.0 - pinned.len() as f64 * floor;
        let free_base: f64 = base
            .iter()
            .filter(|(a, _)| !pinned.contains(a))
            .map(|(_, w)| w)
            .sum();

        let newly_pinned: Vec<AgentName> = base
            .iter()
            .filter(|(a, _)| !pinned.contains(a))
            .filter(|(_, w)| *w * free_mass / free_base < floor)
            .map(|(a, _)| *a)
            .collect();

        if newly_pinned.is_empty() {
            return Ok(base
                .iter()
                .map(|(a, w)| {
                    let weight = if pinned.contains(a) { floor } else { w * free_mass / free_base };
                    (*a, weight)
                })
                .collect());
        }
        pinned.extend(newly_pinned);
    }
}
