use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use hedgebot::api::BinanceFuturesClient;
use hedgebot::regime::DailySchedule;
use hedgebot::strategy::signals::validate_candle_uniformity;
use hedgebot::{
    Exchange, HedgeStrategy, Interval, JsonStateRepository, PaperExchange, StateRepository,
    StrategyConfig,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::time::{Duration, MissedTickBehavior};

const INTRADAY_INTERVAL_SECS: u64 = 300;

#[derive(Parser)]
#[command(name = "hedgebot", about = "Regime/hedge trading bot for Binance USD-M futures")]
struct Args {
    /// Path to a TOML config file. HEDGE_* environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulate fills at the last price instead of sending orders.
    #[arg(long, default_value_t = false)]
    paper: bool,

    /// Run a single daily + 5m cycle, then stop.
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Override the state file location.
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();

    tracing::info!("🚀 HedgeBot starting");

    let mut config =
        StrategyConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &args.state_file {
        config.state_file_path = path.display().to_string();
    }

    log_configuration(&config, args.paper);

    let market = BinanceFuturesClient::from_config(&config)?;
    let repository = JsonStateRepository::new(&config.state_file_path);

    if args.paper {
        // legs reloaded by the strategy must exist in the simulated book too
        let restored = repository.load_all().await;
        let paper = PaperExchange::with_positions(market, restored.values());
        run(HedgeStrategy::new(paper, repository, config), args.once).await
    } else {
        run(HedgeStrategy::new(market, repository, config), args.once).await
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hedgebot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_configuration(config: &StrategyConfig, paper: bool) {
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Mode: {}", if paper { "PAPER" } else { "LIVE" });
    tracing::info!("  Network: {}", if config.use_testnet { "testnet" } else { "mainnet" });
    tracing::info!("  Entry size: {} USDT", config.call_size);
    tracing::info!("  RSI length: {}", config.rsi_length);
    tracing::info!(
        "  Take profit: {}%, trailing: {}%",
        config.take_profit_pct * Decimal::ONE_HUNDRED,
        config.trailing_pct * Decimal::ONE_HUNDRED
    );
    tracing::info!(
        "  Max hold: {} bars ({} min)",
        config.max_hold_bars,
        config.max_hold_minutes()
    );
    tracing::info!("  State file: {}", config.state_file_path);
    tracing::info!("  Symbols: {}", config.symbols.join(", "));
}

// ============================================================================
// Main Loop
// ============================================================================

async fn run<E: Exchange, R: StateRepository>(
    mut strategy: HedgeStrategy<E, R>,
    once: bool,
) -> Result<()> {
    if !strategy.start().await {
        anyhow::bail!("Strategy failed to start, check the configuration");
    }

    let mut ticker =
        tokio::time::interval(Duration::from_secs(strategy.config().poll_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut schedule = DailySchedule::new();

    tracing::info!("\nPress Ctrl+C to stop...\n");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                run_cycle(&mut strategy, &mut schedule).await;
                if once {
                    break;
                }
            }
        }
    }

    strategy.stop().await;
    tracing::info!("👋 HedgeBot stopped");
    Ok(())
}

/// One polling pass over every symbol, daily regime first until it has been
/// classified for the current UTC day
async fn run_cycle<E: Exchange, R: StateRepository>(
    strategy: &mut HedgeStrategy<E, R>,
    schedule: &mut DailySchedule,
) {
    let today = Utc::now().date_naive();
    let symbols = strategy.config().symbols.clone();
    let daily_limit = strategy.config().daily_candle_limit;
    let intraday_limit = strategy.config().intraday_candle_limit;
    let mut prices = HashMap::new();

    for symbol in &symbols {
        if schedule.is_due(symbol, today) {
            match strategy
                .exchange()
                .get_candles(symbol, Interval::OneDay, daily_limit)
                .await
            {
                Ok(daily) => {
                    if strategy.on_new_daily(symbol, &daily).await.is_some() {
                        schedule.mark_refreshed(symbol, today);
                    }
                }
                Err(e) => {
                    tracing::warn!("[{}] Daily candles unavailable, skipping: {}", symbol, e);
                    continue;
                }
            }
        }

        let candles = match strategy
            .exchange()
            .get_candles(symbol, Interval::FiveMinutes, intraday_limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!("[{}] 5m candles unavailable, skipping: {}", symbol, e);
                continue;
            }
        };

        if let Err(e) = validate_candle_uniformity(&candles, INTRADAY_INTERVAL_SECS) {
            tracing::warn!("[{}] {}", symbol, e);
        }

        let price = match strategy.exchange().get_last_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!("[{}] Last price unavailable, skipping: {}", symbol, e);
                continue;
            }
        };

        strategy.on_new_5m(symbol, &candles, price, Utc::now()).await;
        prices.insert(symbol.clone(), price);
    }

    log_status(strategy, &prices);
}

fn log_status<E: Exchange, R: StateRepository>(
    strategy: &HedgeStrategy<E, R>,
    prices: &HashMap<String, Decimal>,
) {
    let hedge_alert = strategy.config().hedge_loss_pct * Decimal::ONE_HUNDRED;
    let mut states: Vec<_> = strategy.get_current_states().into_values().collect();
    states.sort_by(|a, b| a.symbol().cmp(b.symbol()));

    tracing::info!("📊 Status (hedge alert level {}%):", hedge_alert);
    for state in &states {
        let Some(price) = prices.get(state.symbol()) else {
            tracing::info!("  {} regime={} (no price this cycle)", state.symbol(), state.regime);
            continue;
        };
        tracing::info!(
            "  {} @ {} regime={} long={} ({:.2}%) short={} ({:.2}%) total_pnl={:.4}",
            state.symbol(),
            price,
            state.regime,
            state.pos_call(),
            state.pnl_pct_call(*price) * Decimal::ONE_HUNDRED,
            state.pos_put(),
            state.pnl_pct_put(*price) * Decimal::ONE_HUNDRED,
            state.total_pnl(*price)
        );
    }
}
