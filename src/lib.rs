//! Trade Governor Library
//!
//! Turns independent agent trade ideas into a bounded set of executable
//! orders under portfolio-level risk limits, and adapts each agent's
//! influence from cycle outcomes.
//!
//! # Pipeline
//!
//! - Agents emit trade cards
//! - The governor votes them into ranked, sized intents
//! - The risk engine gates each intent against the portfolio
//! - A broker backend fills approved intents and records equity
//! - The scoring engine reweights agents for the next cycle

pub mod broker;
pub mod config;
pub mod core;
pub mod data;
pub mod portfolio;
