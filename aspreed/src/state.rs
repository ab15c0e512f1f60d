//! The service aggregate handed to every handler.

use std::sync::Arc;

use aspree_core::{
    auth::AuthService,
    cache::Cache,
    gateway::GatewayClient,
    lifecycle::InvoiceLifecycle,
    metrics::MetricsCollector,
    profile::ProfileService,
    queue::SideEffectQueue,
    store::Store,
    traits::{BlobStore, InvoiceExtractor},
};
use aspree_crypto::SecretVault;

use crate::config::Config;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub auth: AuthService,
    pub lifecycle: InvoiceLifecycle,
    pub profiles: ProfileService,
    pub vault: Arc<SecretVault>,
    pub gateway: Arc<dyn GatewayClient>,
    pub extractor: Arc<dyn InvoiceExtractor>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: SideEffectQueue,
    pub cache: Arc<Cache>,
    pub metrics: Arc<MetricsCollector>,
}

pub type SharedState = Arc<AppState>;
