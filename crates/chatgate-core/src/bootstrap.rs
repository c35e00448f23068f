use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use chatgate_common::GatewayConfig;
use chatgate_provider_core::ModelRegistry;
use chatgate_provider_impl::{
    TokenizerSet, UpstreamClient, UpstreamClientConfig, build_provider_set,
};
use chatgate_storage::SeaOrmStore;

use crate::auth::JwtAuth;
use crate::gateway::ChatGateway;
use crate::payment::{PaymentService, RazorpayGateway};
use crate::state::AppState;

pub struct Bootstrap {
    pub store: Arc<SeaOrmStore>,
    pub state: Arc<AppState>,
}

pub async fn bootstrap(config: &GatewayConfig) -> anyhow::Result<Bootstrap> {
    // 1) storage + schema.
    let store = Arc::new(
        SeaOrmStore::connect(&config.dsn)
            .await
            .context("connect storage")?,
    );
    store.sync().await.context("schema sync")?;
    info!(dsn = %config.dsn, "db connected");

    // 2) shared upstream client and tokenizers.
    let client = UpstreamClient::new(UpstreamClientConfig::with_proxy(config.proxy.clone()))
        .context("build upstream client")?;
    let tokenizers = TokenizerSet::load(&config.tokenizers, &config.data_dir, &client)
        .await
        .context("load tokenizers")?;

    // 3) adapters and the model catalog.
    let providers = build_provider_set(&client, &config.upstreams, Arc::new(tokenizers));
    let registry = Arc::new(ModelRegistry::builtin());
    info!(models = registry.len(), "model registry ready");

    let gateway = ChatGateway::new(registry, providers, store.clone(), store.clone());

    // 4) payments.
    let razorpay = RazorpayGateway::new(&config.payment).context("build payment client")?;
    let payments = PaymentService::new(&config.payment, Arc::new(razorpay), store.clone());
    info!(enabled = payments.enabled(), "payments configured");

    let state = AppState {
        gateway,
        auth: Arc::new(JwtAuth::hs256(&config.jwt_secret)),
        payments,
    };
    Ok(Bootstrap {
        store,
        state: Arc::new(state),
    })
}
