//! Core decision pipeline
//!
//! - Governor: weighted vote from agent cards to sized intents
//! - Risk engine: stateless pre-trade gate
//! - Scoring engine: feedback into next cycle's agent weights
//! - Approval queue: two-phase confirmation for flagged intents
//! - Cycle: wires the above for one decision pass

pub mod agent;
pub mod approval;
pub mod cycle;
pub mod error;
pub mod governor;
pub mod risk;
pub mod scoring;
pub mod types;

// Re-export commonly used types
pub use agent::{collect_cards, default_agents, RuleAgent, SignalSource};
pub use approval::{ApprovalQueue, Decision, Outcome, Proposal};
pub use cycle::{run_cycle, CycleContext, CycleReport};
pub use error::{ApprovalError, CardError, ConnectionError};
pub use governor::{ConfirmationPrompt, Governor, GovernorConfig};
pub use risk::{RiskConfig, RiskEngine};
pub use scoring::ScoringEngine;
pub use types::*;
