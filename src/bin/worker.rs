//! Worker: runs one market's grid from cold/warm/manual-resume start through
//! a cooperative poll loop until asked to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use grid_trader::config::loader::{CliOverrides, ConfigLoader, Secrets};
use grid_trader::engine::health;
use grid_trader::engine::reconciler;
use grid_trader::exchange::tick_table;
use grid_trader::notify::{CompositeNotifier, Notifier, TelegramNotifier, WebhookNotifier};
use grid_trader::{EngineError, ExchangeGateway, GridEngine, HttpGateway, StateStore};
use log::{error, info, warn};

const DEFAULT_SLEEP_SEC: u64 = 5;
const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = health::DEFAULT_HEALTH_CHECK_INTERVAL;

#[derive(Debug, Parser)]
#[command(name = "worker", about = "Run one market's grid trading loop")]
struct Args {
    #[arg(long)]
    market: String,

    #[arg(long)]
    start_price: Option<f64>,

    #[arg(long)]
    krw_amount: Option<f64>,

    #[arg(long)]
    max_levels: Option<u64>,

    #[arg(long)]
    buy_gap: Option<f64>,

    #[arg(long)]
    sell_gap: Option<f64>,

    #[arg(long)]
    resume_level: Option<u64>,

    #[arg(long, default_value = "config/markets_config.json")]
    config_path: String,

    #[arg(long, default_value = "logs")]
    logs_dir: String,

    #[arg(long, env = "EXCHANGE_BASE_URL", default_value = "https://api.exchange.invalid")]
    exchange_base_url: String,

    #[arg(long, default_value_t = DEFAULT_SLEEP_SEC)]
    sleep_sec: u64,
}

fn build_notifier(secrets: &Secrets) -> Arc<dyn Notifier> {
    let channels: Vec<Box<dyn Notifier>> = vec![
        Box::new(TelegramNotifier::new(
            secrets.telegram_token.clone(),
            secrets.telegram_chat_id.clone(),
        )),
        Box::new(WebhookNotifier::new(secrets.webhook_url.clone())),
    ];
    Arc::new(CompositeNotifier::new(channels))
}

async fn build_engine(
    args: &Args,
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    store: StateStore,
) -> Result<GridEngine> {
    let overrides = CliOverrides {
        start_price: args.start_price,
        krw_amount: args.krw_amount,
        max_levels: args.max_levels,
        buy_gap: args.buy_gap,
        sell_gap: args.sell_gap,
        resume_level: args.resume_level,
    };
    let config = ConfigLoader::new()
        .with_path(&args.config_path)
        .build_market(&args.market)
        .context("failed to load market config")?;
    let config = overrides.apply(config);
    config.validate().map_err(anyhow::Error::from)?;

    let tick = tick_table::tick_for(&config.market)
        .ok_or_else(|| EngineError::UnknownSymbol { market: config.market.clone() })?;

    if let Some(resume_level) = config.resume.filter(|r| *r > 0) {
        info!("{} manual resume at level {resume_level}", config.market);
        return GridEngine::manual_resume(gateway, notifier, store, config, tick, resume_level).await;
    }

    match store.load_snapshot(&config.market)? {
        Some(snapshot) if snapshot.matches_config(&config) => {
            info!("{} warm start, reconciling", config.market);
            let mut engine = GridEngine::warm_start(gateway, notifier, store, tick, snapshot);
            reconciler::reconcile(&mut engine).await?;
            Ok(engine)
        }
        Some(_) => {
            warn!("{} snapshot config mismatch, cold starting", config.market);
            GridEngine::cold_start(gateway, notifier, store, config, tick).await
        }
        None => {
            info!("{} no snapshot found, cold starting", config.market);
            GridEngine::cold_start(gateway, notifier, store, config, tick).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let secrets = Secrets::from_env();
    let notifier = build_notifier(&secrets);
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(HttpGateway::new(args.exchange_base_url.clone(), &secrets));
    let store = StateStore::new(args.logs_dir.clone());

    let mut engine = match build_engine(&args, gateway, notifier, store).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("{} worker failed to start: {e:#}", args.market);
            return std::process::ExitCode::FAILURE;
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    info!("{} entering main loop", engine.market());
    while !stop.load(Ordering::SeqCst) {
        if let Err(e) = engine.tick().await {
            error!("{} tick failed: {e:#}", engine.market());
        }

        if engine.ticks_since_health_check() >= DEFAULT_HEALTH_CHECK_INTERVAL {
            if let Err(e) = health::check(&mut engine).await {
                error!("{} health check failed: {e:#}", engine.market());
            }
        }

        tokio::time::sleep(Duration::from_secs(args.sleep_sec)).await;
    }

    info!("{} shutting down, persisting final snapshot", engine.market());
    if let Err(e) = engine.persist_now() {
        error!("{} final persist failed: {e:#}", engine.market());
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}
