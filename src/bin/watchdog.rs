//! Watchdog: runs the Supervisor loop over every enabled market in
//! `config/markets_config.json`, or prints a one-shot `--status` snapshot.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use grid_trader::config::loader::{ConfigLoader, Secrets};
use grid_trader::notify::{CompositeNotifier, Notifier, TelegramNotifier, WebhookNotifier};
use grid_trader::supervisor::Supervisor;
use grid_trader::{ExchangeGateway, HttpGateway, StateStore};
use log::info;

#[derive(Debug, Parser)]
#[command(name = "watchdog", about = "Monitor and restart worker processes")]
struct Args {
    #[arg(long, default_value = "config/markets_config.json")]
    config_path: String,

    #[arg(long, default_value = "logs")]
    logs_dir: String,

    #[arg(long, default_value = "target/release/worker")]
    worker_binary: String,

    #[arg(long, env = "EXCHANGE_BASE_URL", default_value = "https://api.exchange.invalid")]
    exchange_base_url: String,

    /// Print current per-market status once and exit, instead of looping.
    #[arg(long)]
    status: bool,
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

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let secrets = Secrets::from_env();
    let notifier = build_notifier(&secrets);
    let store = StateStore::new(args.logs_dir.clone());

    let configs = ConfigLoader::new()
        .with_path(&args.config_path)
        .build()
        .context("failed to load markets_config.json")?;

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(HttpGateway::new(args.exchange_base_url.clone(), &secrets));
    let mut supervisor = Supervisor::new(store, notifier.clone(), gateway, args.worker_binary.clone(), configs.into_values());

    if args.status {
        for status in supervisor.status() {
            println!(
                "{:<8} healthy={:<5} level={:?} profit={:.2} pending={}",
                status.market, status.healthy, status.last_buy_level, status.realized_profit, status.pending_orders
            );
        }
        return Ok(());
    }

    info!("watchdog starting, check_interval={:?}", supervisor.check_interval());
    let mut last_summary = tokio::time::Instant::now();

    loop {
        supervisor.check_and_restart().await;

        if last_summary.elapsed() >= supervisor.summary_interval() {
            let report = supervisor.summary_report().await;
            info!("{report}");
            notifier.send(&report).await;
            last_summary = tokio::time::Instant::now();
        }

        tokio::time::sleep(supervisor.check_interval()).await;
    }
}
