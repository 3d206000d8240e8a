//! Approval Queue
//!
//! Two-phase confirmation for flagged intents. `propose` parks a batch
//! that needs a human decision and returns at once; `resolve` completes it
//! later. A batch left open past its expiry resolves as a decline.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::error::ApprovalError;
use crate::core::types::TradeIntent;

/// Human answer for a whole batch. There is no per-intent override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Decline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Approved,
    Declined,
    Expired,
}

#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub id: Uuid,
    pub intents: Vec<TradeIntent>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingBatch {
    pub fn flagged(&self) -> Vec<&TradeIntent> {
        self.intents.iter().filter(|i| i.requires_confirmation).collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of proposing a batch
#[derive(Debug, Clone)]
pub enum Proposal {
    /// Nothing flagged, trade as-is
    Ready(Vec<TradeIntent>),
    /// Waiting on `resolve`; carries the batch id and flagged intents
    Pending { id: Uuid, expires_at: DateTime<Utc>, flagged: Vec<TradeIntent> },
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: Outcome,
    pub intents: Vec<TradeIntent>,
}

pub struct ApprovalQueue {
    timeout: Duration,
    pending: HashMap<Uuid, PendingBatch>,
}

impl ApprovalQueue {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get(&self, id: &Uuid) -> Option<&PendingBatch> {
        self.pending.get(id)
    }

    pub fn propose(&mut self, intents: Vec<TradeIntent>) -> Proposal {
        self.propose_at(intents, Utc::now())
    }

    pub fn propose_at(&mut self, intents: Vec<TradeIntent>, now: DateTime<Utc>) -> Proposal {
        if !intents.iter().any(|i| i.requires_confirmation) {
            return Proposal::Ready(intents);
        }

        let batch = PendingBatch {
            id: Uuid::new_v4(),
            intents,
            created_at: now,
            expires_at: now + self.timeout,
        };
        let flagged = batch.flagged().into_iter().cloned().collect::<Vec<_>>();
        info!(
            "[APPROVAL] batch {} waiting on {} flagged intents until {}",
            batch.id,
            flagged.len(),
            batch.expires_at
        );

        let proposal = Proposal::Pending {
            id: batch.id,
            expires_at: batch.expires_at,
            flagged,
        };
        self.pending.insert(batch.id, batch);
        proposal
    }

    pub fn resolve(&mut self, id: Uuid, decision: Decision) -> Result<Resolution, ApprovalError> {
        self.resolve_at(id, decision, Utc::now())
    }

    pub fn resolve_at(
        &mut self,
        id: Uuid,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ApprovalError> {
        let batch = self.pending.remove(&id).ok_or(ApprovalError::UnknownBatch(id))?;

        let outcome = if batch.is_expired(now) {
            warn!("[APPROVAL] batch {} expired before a decision", id);
            Outcome::Expired
        } else {
            match decision {
                Decision::Approve => Outcome::Approved,
                Decision::Decline => Outcome::Declined,
            }
        };

        let intents = match outcome {
            Outcome::Approved => batch.intents,
            Outcome::Declined | Outcome::Expired => batch
                .intents
                .into_iter()
                .filter(|i| !i.requires_confirmation)
                .collect(),
        };

        info!("[APPROVAL] batch {} resolved {:?}: {} intents kept", id, outcome, intents.len());
        Ok(Resolution { outcome, intents })
    }

    /// Resolve every batch whose expiry has passed as declined
    pub fn expire_stale(&mut self, now: DateTime<Utc>) -> Vec<(Uuid, Resolution)> {
        let stale: Vec<Uuid> = self
            .pending
            .values()
            .filter(|b| b.is_expired(now))
            .map(|b| b.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                self.resolve_at(id, Decision::Decline, now)
                    .ok()
                    .map(|r| (id, r))
            })
            .collect()
    }
}
