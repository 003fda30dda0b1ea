use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pingwatch::{
    alerts::AlertDispatcher,
    config::{Config, read_config_file},
    prober::IcmpProber,
    rate_limit::RateLimiter,
    scheduler::{Monitor, SchedulerHandle},
    storage,
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Watches device reachability and serves the status history")]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("pingwatch", level),
        ("pingwatch_hub", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(config.registry()?);
    info!(devices = registry.len(), "loaded device registry");

    let store = storage::open(&config.storage.clone().unwrap_or_default())
        .await
        .context("failed to open sample store")?;

    let prober = IcmpProber::new(config.probe.count, config.probe.timeout())
        .context("failed to open ICMP socket (raw sockets may need CAP_NET_RAW)")?;
    let limiter = RateLimiter::new(config.rate_limit.calls, config.rate_limit.period());
    let dispatcher = AlertDispatcher::from_config(&config.alert);
    if dispatcher.channels() == 0 {
        warn!("no notification channels configured, unreachable devices will only be logged");
    }

    let monitor = Arc::new(
        Monitor::new(
            registry.clone(),
            Arc::new(prober),
            store.clone(),
            Arc::new(dispatcher),
        )
        .with_rate_limiter(Arc::new(limiter))
        .with_probe_timeout(config.probe.timeout()),
    );
    let scheduler = SchedulerHandle::spawn(monitor, config.interval());

    #[cfg(feature = "api")]
    {
        use pingwatch::api::{ApiConfig, ApiState, spawn_api_server};
        use pingwatch::cache::AggregationCache;

        let cache = Arc::new(AggregationCache::new(store.clone(), config.cache.ttl()));
        let state = ApiState::new(cache, registry.clone(), store.clone());
        spawn_api_server(ApiConfig::from(&config.api), state).await?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    scheduler.shutdown().await?;
    store.close().await?;

    Ok(())
}
