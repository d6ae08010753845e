//! papertrade - service entry point
//!
//! Wires the configured stores and quote feed into the main engine, starts
//! the scheduler, and runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use papertrade::config::AppConfig;
use papertrade::logging::init_logging;
use papertrade::main_engine::{EngineContext, MainEngine};
use papertrade::quotes::QuoteProvider;
use papertrade::quotes::http::HqClient;
use papertrade::quotes::mock::MockQuotes;
use papertrade::scheduler::Scheduler;
use papertrade::session::TradingSession;

fn load_config() -> anyhow::Result<AppConfig> {
    match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("loading configuration from {path}")),
        None => Ok(AppConfig::default()),
    }
}

fn build_quote_provider(config: &AppConfig) -> Arc<dyn QuoteProvider> {
    if config.quotes.base_url == "mock" {
        warn!("quote feed set to `mock`; ticks must be scripted in-process");
        Arc::new(MockQuotes::new())
    } else {
        Arc::new(HqClient::new(
            config.quotes.base_url.clone(),
            Duration::from_millis(config.quotes.timeout_ms),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.log);

    info!(market = %config.market_name, "papertrade starting");

    let quotes = build_quote_provider(&config);
    let session = TradingSession::china_a(config.session_utc_offset_hours);

    // The deployment wires real store adapters here; the memory backends
    // keep the engine runnable on its own.
    let context = EngineContext::in_memory(quotes);
    let engine = MainEngine::new(context, session);
    engine.startup().await.context("engine startup failed")?;

    let scheduler_handle = Scheduler::with_lock(
        Arc::clone(&engine),
        engine.session().clone(),
        config.scheduler.clone(),
    )
    .context("jobs lock unavailable")?
    .map(Scheduler::spawn);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    if let Some(handle) = scheduler_handle {
        handle.abort();
    }
    engine.shutdown().await;
    Ok(())
}
