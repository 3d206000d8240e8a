//! Trade Governor - one paper trading decision cycle
//!
//! Wires the agents, a broker backend, the governor, the risk engine and
//! the scoring engine together for a single cycle, then prints the trade
//! cards and the daily summary as JSON.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use trade_governor::broker::{ExecutionBackend, PaperBroker, SimulatedVenue};
use trade_governor::config::Config;
use trade_governor::core::{default_agents, run_cycle, ConfirmationPrompt, CycleContext, TradeIntent};
use trade_governor::data::{MarketDataProvider, SimulatedFeed, StateStore};

const SEP: &str = "===========================================================";

#[derive(Parser)]
#[command(author, version, about = "Run one paper trading decision cycle", long_about = None)]
struct Cli {
    /// Path to the TOML config (defaults apply when missing)
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Symbol to trade
    #[arg(long, default_value = "AAPL")]
    symbol: String,

    /// Reference price, used when no market data feed answers
    #[arg(long, default_value_t = 190.0)]
    price: f64,

    /// Try the simulated venue and feed before falling back to paper
    #[arg(long, default_value_t = false)]
    use_sim: bool,

    /// Skip the confirmation prompt for flagged intents
    #[arg(long, default_value_t = false)]
    auto_confirm: bool,

    /// Log level (error, warn, info, debug, trace); overrides the config
    #[arg(long)]
    verbose: Option<String>,
}

/// Asks on stdin; only "y" counts as yes
struct StdinPrompt;

impl ConfirmationPrompt for StdinPrompt {
    fn confirm(&self, flagged: &[&TradeIntent]) -> bool {
        for intent in flagged {
            println!("  {} {} size={} score={:.3}", intent.side, intent.symbol, intent.size, intent.score);
        }
        print!("High risk intents detected. Proceed? (y/n): ");
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
            Err(_) => false,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load_or_default(&cli.config)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    if cli.use_sim {
        cfg.broker.use_simulated = true;
    }

    // Setup logging
    let level = cli
        .verbose
        .as_deref()
        .unwrap_or(&cfg.system.log_level)
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", SEP);
    info!("  {} - paper decision cycle", cfg.system.name);
    info!("{}", SEP);

    let reference_price = Decimal::from_f64(cli.price)
        .filter(|p| *p > Decimal::ZERO)
        .with_context(|| format!("invalid reference price {}", cli.price))?;

    let store = Arc::new(StateStore::new(&cfg.storage.db_path)?);
    let starting_cash = cfg.portfolio.starting_cash;

    let mut backends: Vec<Box<dyn ExecutionBackend>> = Vec::new();
    let mut feed: Option<Box<dyn MarketDataProvider>> = None;
    if cfg.broker.use_simulated {
        backends.push(Box::new(SimulatedVenue::new(
            store.clone(),
            starting_cash,
            cfg.broker.simulate_failure,
        )?));
        feed = Some(Box::new(SimulatedFeed::new(cfg.broker.simulate_failure)));
    }
    backends.push(Box::new(PaperBroker::new(store.clone(), starting_cash)?));

    let stdin_prompt = StdinPrompt;
    let prompt: Option<&dyn ConfirmationPrompt> = if cli.auto_confirm { None } else { Some(&stdin_prompt) };

    let report = run_cycle(CycleContext {
        config: &cfg,
        store,
        symbol: cli.symbol.clone(),
        reference_price,
        agents: default_agents(),
        feed,
        backends,
        prompt,
    })
    .await?;

    println!("Trade cards:");
    for card in &report.cards {
        println!("{}", serde_json::to_string_pretty(card)?);
    }
    println!("Daily summary:");
    println!("{}", serde_json::to_string_pretty(&report.summary)?);

    Ok(())
}
