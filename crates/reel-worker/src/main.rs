//! Assembly and publish worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use reel_publish::{UploaderCli, UploaderConfig};
use reel_queue::JobQueue;
use reel_storage::R2Client;
use reel_worker::{
    init_tracing, metrics, AssemblyPipeline, JobExecutor, JobHandlers, PublishPipeline, RedisStore,
    WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting reel-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid METRICS_ADDR {addr}"))?;
        metrics::init_metrics(addr)?;
        info!("Prometheus metrics on {}", addr);
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let storage = Arc::new(R2Client::from_env().context("Failed to create storage client")?);
    let store = Arc::new(RedisStore::from_env().context("Failed to create task store")?);
    let queue = JobQueue::from_env().context("Failed to create job queue")?;

    let uploader_config = UploaderConfig::from_env();
    let uploader = UploaderCli::new(uploader_config.clone());
    if let Err(e) = uploader.check_binary() {
        warn!("Publishing will fail until the uploader is installed: {}", e);
    }

    let assembly = AssemblyPipeline::new(
        config.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        storage.clone(),
    );
    let publish = PublishPipeline::new(
        config.clone(),
        store.clone(),
        store.clone(),
        store,
        storage,
        Arc::new(uploader),
        uploader_config,
    );

    let executor = JobExecutor::new(config, queue, JobHandlers::new(assembly, publish));

    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown.send(true);
    });

    executor.run().await?;

    info!("Worker shutdown complete");
    Ok(())
}
