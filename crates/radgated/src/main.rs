//! radgated - Multi-tenant RADIUS AAA daemon

use radgate_common::{CoreConfig, EventBus};
use radgate_lifecycle::LifecycleManager;
use radgate_nas::routeros::RouterOsClient;
use radgate_nas::NasDirectory;
use radgate_server::{Handlers, RadiusServer};
use radgate_store::StoreRoot;
use radgate_tenant::{IdentityResolver, TenantRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("radgated v{}", env!("CARGO_PKG_VERSION"));

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "/etc/radgate/radgated.json".into());
    let config = CoreConfig::load(&config_path).unwrap_or_else(|_| {
        tracing::warn!(path = %config_path, "config not found, using defaults");
        CoreConfig::default()
    });
    let config = Arc::new(config);

    let registry = Arc::new(TenantRegistry::new());
    let root = Arc::new(StoreRoot::new());
    let resolver = Arc::new(IdentityResolver::new(
        registry.clone(),
        Duration::from_secs(config.resolver_cache_ttl_secs),
    ));
    let events = EventBus::default();

    // Every NAS we hold a shared secret for is assumed reachable over
    // the RouterOS API with that same secret until real device
    // inventory lands.
    let nas = Arc::new(NasDirectory::new());
    let command_timeout = Duration::from_secs(config.nas.command_timeout_secs);
    for (ip, secret) in &config.nas_secrets {
        nas.register(
            *ip,
            Arc::new(RouterOsClient::new(
                (*ip, 8728).into(),
                "radgate",
                secret,
                command_timeout,
            )),
        );
    }

    let lifecycle = LifecycleManager::new(
        &config.lifecycle,
        registry.clone(),
        root.clone(),
        resolver.clone(),
        nas.clone(),
        events.clone(),
    );
    let sweep_tasks = lifecycle.start();

    let handlers = Arc::new(Handlers::new(
        config.clone(),
        resolver,
        root,
        lifecycle.dispatcher.clone(),
        events,
    ));
    let server = RadiusServer::bind(&config.auth_addr, &config.acct_addr, handlers).await?;
    let server_task = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server_task.abort();
    for task in sweep_tasks {
        task.abort();
    }
    Ok(())
}
