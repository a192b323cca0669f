mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use runlib::bus::RedisEventBus;
use runlib::engine::Engine;
use runlib::queue::JobConsumer;
use runlib::sandbox::docker::DockerRuntime;
use runlib::store::RedisJobStore;

use config::Config;

const RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    let runtime = Arc::new(DockerRuntime::connect()?);
    let store = Arc::new(connect_store(&config.redis_url).await);
    let bus = Arc::new(connect_bus(&config.redis_url).await);
    let engine = Engine::new(runtime, store, bus, config.engine_config());

    loop {
        let consumer =
            match JobConsumer::connect(&config.rabbit_url, &config.queue, config.prefetch).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(error = %e, "queue connect failed, retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };
        info!(queue = %config.queue, "worker started");
        if let Err(e) = consumer.run(&engine).await {
            warn!(error = %e, "consumer loop ended, reconnecting");
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }
}

async fn connect_store(url: &str) -> RedisJobStore {
    loop {
        match RedisJobStore::connect(url).await {
            Ok(store) => return store,
            Err(e) => {
                warn!(error = %e, "job store connect failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn connect_bus(url: &str) -> RedisEventBus {
    loop {
        match RedisEventBus::connect(url).await {
            Ok(bus) => return bus,
            Err(e) => {
                warn!(error = %e, "event bus connect failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}
