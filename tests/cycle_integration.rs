//! End-to-end decision cycles against an in-memory store

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;

use trade_governor::broker::{ExecutionBackend, PaperBroker, SimulatedVenue};
use trade_governor::config::{Config, ExecutionMode};
use trade_governor::core::{
    default_agents, run_cycle, AgentName, CardError, ConfirmationPrompt, CycleContext, EquityPoint, MarketData,
    OrderType, Outcome, RuleAgent, Side, SignalSource, TradeCard, TradeIntent,
};
use trade_governor::data::{MarketDataProvider, SimulatedFeed, StateStore};

/// Answers every confirmation the same way and counts the questions
struct Scripted {
    answer: bool,
    asked: std::cell::Cell<usize>,
}

impl Scripted {
    fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: std::cell::Cell::new(0),
        }
    }
}

impl ConfirmationPrompt for Scripted {
    fn confirm(&self, _flagged: &[&TradeIntent]) -> bool {
        self.asked.set(self.asked.get() + 1);
        self.answer
    }
}

/// Low-confidence seller that flags whatever symbol it sees
struct Doubter;

impl SignalSource for Doubter {
    fn name(&self) -> AgentName {
        AgentName::Event
    }

    fn generate(&self, market: &MarketData) -> Result<TradeCard, CardError> {
        TradeCard::draft(AgentName::Event, &market.symbol, Side::Sell, 0.3, "fading the move")
            .tag("high-risk")
            .build()
    }
}

/// Confident buyer on a fixed symbol with a stop 20% under the market
struct WideStop(&'static str);

impl SignalSource for WideStop {
    fn name(&self) -> AgentName {
        AgentName::Theme
    }

    fn generate(&self, market: &MarketData) -> Result<TradeCard, CardError> {
        TradeCard::draft(AgentName::Theme, self.0, Side::Buy, 1.0, "gap fill")
            .stop_loss(market.price * dec!(0.8))
            .build()
    }
}

fn store() -> Arc<StateStore> {
    Arc::new(StateStore::new(":memory:").unwrap())
}

fn paper_only(store: &Arc<StateStore>) -> Vec<Box<dyn ExecutionBackend>> {
    vec![Box::new(PaperBroker::new(store.clone(), dec!(100000)).unwrap())]
}

fn context<'a>(config: &'a Config, store: &Arc<StateStore>) -> CycleContext<'a> {
    CycleContext {
        config,
        store: store.clone(),
        symbol: "AAPL".to_string(),
        reference_price: dec!(190),
        agents: default_agents(),
        feed: None,
        backends: paper_only(store),
        prompt: None,
    }
}

#[tokio::test]
async fn test_default_cycle_fills_one_unit() {
    let config = Config::default();
    let store = store();

    let report = run_cycle(context(&config, &store)).await.unwrap();

    assert_eq!(report.backend, "paper");
    assert_eq!(report.cards.len(), 4);
    assert_eq!(report.intents.len(), 1);

    let intent = &report.intents[0];
    assert_eq!(intent.side, Side::Buy);
    // 0.55*0.3 + 0.6*0.3 + 0.4*0.2 + 0.65*0.2
    assert!((intent.score - 0.555).abs() < 1e-9);
    assert_eq!(intent.size, dec!(2775));
    assert!(!intent.requires_confirmation);

    assert_eq!(report.decisions.len(), 1);
    assert!(report.decisions[0].result.approved);
    assert_eq!(report.decisions[0].stop_loss_distance, dec!(0.07));

    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].qty, dec!(1));
    assert_eq!(report.fills[0].price, dec!(190));

    let position = store.get_position("AAPL").unwrap().unwrap();
    assert_eq!(position.qty, dec!(1));
    assert_eq!(position.avg_price, dec!(190));

    assert_eq!(report.summary.trades, 1);
    assert_eq!(report.summary.pnl, dec!(0));
    assert_eq!(report.summary.notes, "auto-generated");

    let weights = store.get_agent_weights().unwrap();
    assert_eq!(weights.len(), 4);
    let total: f64 = weights.iter().map(|w| w.weight).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_cycles_accumulate_on_one_store() {
    let config = Config::default();
    let store = store();

    run_cycle(context(&config, &store)).await.unwrap();
    let second = run_cycle(context(&config, &store)).await.unwrap();

    assert_eq!(store.get_fills().unwrap().len(), 2);
    assert_eq!(store.get_position("AAPL").unwrap().unwrap().qty, dec!(2));
    assert_eq!(second.summary.trades, 2);

    let rebuilt = PaperBroker::new(store.clone(), dec!(100000)).unwrap();
    assert_eq!(rebuilt.cash(), dec!(99620));
}

#[tokio::test]
async fn test_unavailable_sim_falls_back_and_logs() {
    let config = Config::default();
    let store = store();

    let mut ctx = context(&config, &store);
    ctx.backends = vec![
        Box::new(SimulatedVenue::new(store.clone(), dec!(100000), true).unwrap()),
        Box::new(PaperBroker::new(store.clone(), dec!(100000)).unwrap()),
    ];
    let feed: Box<dyn MarketDataProvider> = Box::new(SimulatedFeed::new(true));
    ctx.feed = Some(feed);

    let report = run_cycle(ctx).await.unwrap();
    assert_eq!(report.backend, "paper");
    assert_eq!(report.market.price, dec!(190));
    assert_eq!(report.fills.len(), 1);

    let logs = store.get_logs().unwrap();
    assert!(logs.iter().any(|l| l.level == "WARN" && l.message.contains("market data fallback")));
    assert!(logs.iter().any(|l| l.level == "WARN" && l.message.contains("broker fallback")));
}

#[tokio::test]
async fn test_declined_confirmation_drops_flagged_intents() {
    let config = Config::default();
    let store = store();
    let prompt = Scripted::new(false);

    let mut ctx = context(&config, &store);
    ctx.agents.push(Box::new(Doubter));
    ctx.prompt = Some(&prompt);

    let report = run_cycle(ctx).await.unwrap();
    assert_eq!(prompt.asked.get(), 1);
    assert_eq!(report.intents.len(), 2);
    assert!(report.intents.iter().all(|i| i.requires_confirmation));
    assert_eq!(report.confirmation, Some(Outcome::Declined));
    assert!(report.decisions.is_empty());
    assert!(report.fills.is_empty());
    assert!(store.get_fills().unwrap().is_empty());
}

#[tokio::test]
async fn test_approved_confirmation_executes_batch() {
    let config = Config::default();
    let store = store();
    let prompt = Scripted::new(true);

    let mut ctx = context(&config, &store);
    ctx.agents.push(Box::new(Doubter));
    ctx.prompt = Some(&prompt);

    let report = run_cycle(ctx).await.unwrap();
    assert_eq!(report.confirmation, Some(Outcome::Approved));
    assert_eq!(report.decisions.len(), 2);

    // Buy ranks first, then the sell closes it out
    assert_eq!(report.fills.len(), 2);
    assert_eq!(report.fills[0].side, Side::Buy);
    assert_eq!(report.fills[1].side, Side::Sell);
    assert!(store.get_positions().unwrap().is_empty());
}

#[tokio::test]
async fn test_prompt_skipped_when_nothing_flagged() {
    let config = Config::default();
    let store = store();
    let prompt = Scripted::new(false);

    let mut ctx = context(&config, &store);
    ctx.prompt = Some(&prompt);

    let report = run_cycle(ctx).await.unwrap();
    assert_eq!(prompt.asked.get(), 0);
    assert_eq!(report.confirmation, None);
    assert_eq!(report.fills.len(), 1);
}

#[tokio::test]
async fn test_draft_mode_records_limit_orders() {
    let mut config = Config::default();
    config.broker.mode = ExecutionMode::Draft;
    let store = store();

    let report = run_cycle(context(&config, &store)).await.unwrap();
    assert!(report.fills.is_empty());
    assert_eq!(report.drafts.len(), 1);

    let orders = store.get_orders().unwrap();
    assert_eq!(orders.len(), 1);
    assert!(orders[0].order_id.starts_with("draft-"));
    assert_eq!(orders[0].order_type, OrderType::Limit);
    assert_eq!(orders[0].limit_price, Some(dec!(190)));
    assert!(store.get_fills().unwrap().is_empty());
    assert!(store.get_positions().unwrap().is_empty());
}

#[tokio::test]
async fn test_drawdown_blocks_and_logs_rejection() {
    let config = Config::default();
    let store = store();
    store
        .add_equity_point(&EquityPoint {
            timestamp: Utc::now(),
            equity: dec!(200000),
        })
        .unwrap();

    let report = run_cycle(context(&config, &store)).await.unwrap();
    assert_eq!(report.decisions.len(), 1);
    assert!(!report.decisions[0].result.approved);
    assert!(report.decisions[0].result.reason.contains("max drawdown"));
    assert!(report.fills.is_empty());

    let logs = store.get_logs().unwrap();
    assert!(logs.iter().any(|l| l.message.contains("risk rejected")));
}

#[tokio::test]
async fn test_rejected_intent_does_not_stop_the_rest() {
    let config = Config::default();
    let store = store();

    let mut ctx = context(&config, &store);
    ctx.agents = vec![Box::new(WideStop("MSFT")), Box::new(RuleAgent::tech())];

    let report = run_cycle(ctx).await.unwrap();
    assert_eq!(report.decisions.len(), 2);

    // MSFT ranks first (1.0 * 0.3) and fails the stop band
    let first = &report.decisions[0];
    assert_eq!(first.intent.symbol, "MSFT");
    assert_eq!(first.stop_loss_distance, dec!(0.2));
    assert!(!first.result.approved);
    assert!(first.result.reason.contains("stop loss distance"));

    // AAPL still goes through at the inclusive 0.06 bound
    let second = &report.decisions[1];
    assert_eq!(second.intent.symbol, "AAPL");
    assert!(second.result.approved);
    assert_eq!(report.fills.len(), 1);
    assert_eq!(report.fills[0].symbol, "AAPL");
    assert!(store.get_position("MSFT").unwrap().is_none());
}

#[tokio::test]
async fn test_unusable_config_is_an_error() {
    let config: Config = toml::from_str("[governor]\nmin_intents = 7\nmax_intents = 6").unwrap();
    let store = store();

    let result = run_cycle(context(&config, &store)).await;
    assert!(result.is_err());
    assert!(store.get_fills().unwrap().is_empty());
}
