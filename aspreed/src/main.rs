use std::sync::Arc;

use anyhow::Context;
use aspree_common::shutdown::ShutdownChannel;
use aspree_core::{
    auth::{AuthConfig, AuthService},
    cache::Cache,
    gateway::XenditClient,
    lifecycle::InvoiceLifecycle,
    metrics::MetricsCollector,
    profile::ProfileService,
    queue::SideEffectQueue,
    store::Store,
    traits::{LocalBlobStore, LogNotifier, UnconfiguredExtractor},
};
use aspree_crypto::SecretVault;
use aspreed::{
    config::{Args, Config},
    logger, serve,
    state::AppState,
};
use tracing::info;

fn main() -> anyhow::Result<()> {
    // `.env` is optional; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    logger::init();

    let args: Args = argh::from_env();
    let config = Config::load(args).context("Invalid configuration")?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        env = %config.deploy_env,
        port = config.port,
        "starting aspreed"
    );

    let store = Store::open(&config.database_url)
        .await
        .context("Could not open database")?;

    let vault = Arc::new(SecretVault::from_master_secret(
        config.master_key.as_bytes(),
    ));
    let auth = AuthService::new(
        store.clone(),
        config.jwt_secret.as_bytes(),
        AuthConfig::default(),
    );
    let lifecycle = InvoiceLifecycle::new(store.clone());

    let notifier = Arc::new(LogNotifier);
    let blobs = Arc::new(LocalBlobStore::new(
        config.upload_dir.clone(),
        format!("{}/uploads", config.base_url),
    ));
    let gateway = Arc::new(match &config.gateway_base_url {
        Some(base_url) => XenditClient::with_base_url(base_url.clone()),
        None => XenditClient::new(),
    });

    let shutdown = ShutdownChannel::new();
    let (queue, queue_task) = SideEffectQueue::start(
        store.clone(),
        notifier,
        blobs.clone(),
        shutdown.clone(),
    );
    let profiles = ProfileService::new(store.clone(), queue.clone());

    let state = Arc::new(AppState {
        config,
        store,
        auth,
        lifecycle,
        profiles,
        vault,
        gateway,
        extractor: Arc::new(UnconfiguredExtractor),
        blobs,
        queue,
        cache: Arc::new(Cache::new()),
        metrics: Arc::new(MetricsCollector::new()),
    });

    // ctrl-c begins a graceful shutdown of the server and the queue worker.
    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c");
            ctrl_c_shutdown.send();
        }
    });

    let result = serve::serve(state, shutdown.clone()).await;

    // Let the queue drain anything already enqueued before exiting.
    shutdown.send();
    let _ = queue_task.await;

    result
}
