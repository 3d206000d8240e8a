//! Core type definitions for the decision pipeline
//!
//! Money (prices, quantities, cash, notional) is `Decimal`. Ratios,
//! confidences, scores and weights are `f64`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use super::error::CardError;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for a buy, -1 for a sell
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(anyhow::anyhow!("unknown side: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl FromStr for OrderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            other => Err(anyhow::anyhow!("unknown order type: {}", other)),
        }
    }
}

/// Identity of a signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentName {
    #[serde(rename = "A1_THEME")]
    Theme,
    #[serde(rename = "A2_TECH")]
    Tech,
    #[serde(rename = "A3_EVENT")]
    Event,
    #[serde(rename = "A4_RISK_EXEC")]
    RiskExec,
}

impl AgentName {
    pub const ALL: [AgentName; 4] = [
        AgentName::Theme,
        AgentName::Tech,
        AgentName::Event,
        AgentName::RiskExec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Theme => "A1_THEME",
            AgentName::Tech => "A2_TECH",
            AgentName::Event => "A3_EVENT",
            AgentName::RiskExec => "A4_RISK_EXEC",
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentName::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown agent: {}", s))
    }
}

/// Point-in-time price for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketData {
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
        }
    }
}

/// An agent's opinion on a symbol.
///
/// Fields are private so every card in the system went through
/// [`CardDraft::build`] and carries a confidence in [0, 1].
#[derive(Debug, Clone, Serialize)]
pub struct TradeCard {
    agent: AgentName,
    symbol: String,
    side: Side,
    confidence: f64,
    thesis: String,
    target_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    horizon_days: u32,
    risk_tags: BTreeSet<String>,
    created_at: DateTime<Utc>,
}

impl TradeCard {
    /// Start a card. Nothing is validated until [`CardDraft::build`].
    pub fn draft(
        agent: AgentName,
        symbol: impl Into<String>,
        side: Side,
        confidence: f64,
        thesis: impl Into<String>,
    ) -> CardDraft {
        CardDraft {
            agent,
            symbol: symbol.into(),
            side,
            confidence,
            thesis: thesis.into(),
            target_price: None,
            stop_loss: None,
            take_profit: None,
            horizon_days: 5,
            risk_tags: BTreeSet::new(),
        }
    }

    pub fn agent(&self) -> AgentName {
        self.agent
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn thesis(&self) -> &str {
        &self.thesis
    }

    pub fn target_price(&self) -> Option<Decimal> {
        self.target_price
    }

    pub fn stop_loss(&self) -> Option<Decimal> {
        self.stop_loss
    }

    pub fn take_profit(&self) -> Option<Decimal> {
        self.take_profit
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn risk_tags(&self) -> &BTreeSet<String> {
        &self.risk_tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.risk_tags.contains(tag)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Unvalidated TradeCard under construction
#[derive(Debug, Clone)]
pub struct CardDraft {
    agent: AgentName,
    symbol: String,
    side: Side,
    confidence: f64,
    thesis: String,
    target_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    horizon_days: u32,
    risk_tags: BTreeSet<String>,
}

impl CardDraft {
    pub fn target_price(mut self, price: Decimal) -> Self {
        self.target_price = Some(price);
        self
    }

    pub fn stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn horizon_days(mut self, days: u32) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.risk_tags.insert(tag.into());
        self
    }

    pub fn build(self) -> Result<TradeCard, CardError> {
        // NaN fails the range check too
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(CardError::ConfidenceOutOfRange(self.confidence));
        }
        if self.symbol.trim().is_empty() {
            return Err(CardError::EmptySymbol);
        }
        for (field, value) in [
            ("target_price", self.target_price),
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
        ] {
            if let Some(v) = value {
                if v <= Decimal::ZERO {
                    return Err(CardError::NonPositivePrice {
                        field,
                        value: v.to_string(),
                    });
                }
            }
        }

        Ok(TradeCard {
            agent: self.agent,
            symbol: self.symbol,
            side: self.side,
            confidence: self.confidence,
            thesis: self.thesis,
            target_price: self.target_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            horizon_days: self.horizon_days,
            risk_tags: self.risk_tags,
            created_at: Utc::now(),
        })
    }
}

/// The system's sized decision to trade, derived from one or more cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    pub score: f64,
    /// Notional size in account currency
    pub size: Decimal,
    pub reason: String,
    pub requires_confirmation: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn market(symbol: &str, side: Side, qty: Decimal) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            qty,
            order_type: OrderType::Market,
            limit_price: None,
            created_at: Utc::now(),
        }
    }

    pub fn limit(symbol: &str, side: Side, qty: Decimal, limit_price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, qty)
        }
    }
}

/// A completed execution. The only thing that moves cash and positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub price: Decimal,
    pub filled_at: DateTime<Utc>,
}

impl Fill {
    /// Quantity with the side's sign applied
    pub fn signed_qty(&self) -> Decimal {
        self.qty * self.side.sign()
    }
}

/// Open position. Quantity is signed (negative = short) and never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: Decimal,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWeight {
    pub agent: AgentName,
    pub weight: f64,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a pre-trade risk check. A rejection is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub approved: bool,
    pub reason: String,
}

impl RiskCheckResult {
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: "approved".to_string(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub pnl: Decimal,
    pub trades: usize,
    pub notes: String,
}

/// Persisted log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_card_rejects_confidence_out_of_range() {
        let err = TradeCard::draft(AgentName::Tech, "AAPL", Side::Buy, 1.2, "too sure")
            .build()
            .unwrap_err();
        assert_eq!(err, CardError::ConfidenceOutOfRange(1.2));

        assert!(TradeCard::draft(AgentName::Tech, "AAPL", Side::Buy, -0.01, "x")
            .build()
            .is_err());
        assert!(TradeCard::draft(AgentName::Tech, "AAPL", Side::Buy, f64::NAN, "x")
            .build()
            .is_err());
    }

    #[test]
    fn test_card_accepts_bounds() {
        assert!(TradeCard::draft(AgentName::Tech, "AAPL", Side::Buy, 0.0, "x").build().is_ok());
        assert!(TradeCard::draft(AgentName::Tech, "AAPL", Side::Buy, 1.0, "x").build().is_ok());
    }

    #[test]
    fn test_card_rejects_bad_prices_and_symbol() {
        let err = TradeCard::draft(AgentName::Event, "MSFT", Side::Sell, 0.5, "x")
            .stop_loss(dec!(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, CardError::NonPositivePrice { field: "stop_loss", .. }));

        let err = TradeCard::draft(AgentName::Event, "  ", Side::Sell, 0.5, "x")
            .build()
            .unwrap_err();
        assert_eq!(err, CardError::EmptySymbol);
    }

    #[test]
    fn test_card_tags_and_exits() {
        let card = TradeCard::draft(AgentName::RiskExec, "AAPL", Side::Buy, 0.65, "plan")
            .target_price(dec!(201.4))
            .stop_loss(dec!(174.8))
            .horizon_days(4)
            .tag("risk")
            .tag("exec")
            .build()
            .unwrap();
        assert!(card.has_tag("exec"));
        assert!(!card.has_tag("high-risk"));
        assert_eq!(card.stop_loss(), Some(dec!(174.8)));
        assert_eq!(card.horizon_days(), 4);
    }

    #[test]
    fn test_names_round_trip_through_strings() {
        for agent in AgentName::ALL {
            assert_eq!(agent.as_str().parse::<AgentName>().unwrap(), agent);
        }
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert!("HOLD".parse::<Side>().is_err());
        assert_eq!(serde_json::to_string(&AgentName::RiskExec).unwrap(), "\"A4_RISK_EXEC\"");
    }

    #[test]
    fn test_limit_order_carries_price() {
        let order = Order::limit("7203", Side::Buy, dec!(100), dec!(2500));
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.limit_price, Some(dec!(2500)));
    }
}
