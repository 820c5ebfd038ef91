use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use warden_api::app::{Pipeline, build_app};
use warden_events::{EventProducer, InMemoryProducer};
use warden_infra::cache::EntitlementCache;
use warden_infra::{InMemoryEntitlementCache, WardenConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    warden_observability::init();

    let config = WardenConfig::from_env().context("invalid configuration")?;
    let public_key_pem = config
        .public_key_pem
        .clone()
        .context("WARDEN_JWT_PUBLIC_KEY_PEM must be set")?;

    let (producer, cache) = backends(&config)?;

    let pipeline = Pipeline::from_config(&config, public_key_pem.as_bytes(), producer.clone(), cache)
        .context("failed to build security pipeline")?;
    let app = build_app(&pipeline, config.required_entitlements.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        event_source = %pipeline.emitter().source(),
        destination = %pipeline.emitter().destination(),
        "listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Err(e) = producer.close().await {
        tracing::warn!(error = %e, "failed to close event producer");
    }

    Ok(())
}

type Backends = (Arc<dyn EventProducer>, Arc<dyn EntitlementCache>);

#[cfg(feature = "redis")]
fn backends(config: &WardenConfig) -> anyhow::Result<Backends> {
    use warden_infra::cache::RedisEntitlementCache;
    use warden_infra::producer::RedisStreamsProducer;

    let Some(url) = config.redis_url.as_deref() else {
        return Ok(in_memory_backends(config));
    };

    tracing::info!("using redis for events and entitlement cache");
    let producer = RedisStreamsProducer::new(url).context("failed to create redis producer")?;
    let cache =
        RedisEntitlementCache::new(url, config.cache_ttl).context("failed to create redis cache")?;

    Ok((Arc::new(producer), Arc::new(cache)))
}

#[cfg(not(feature = "redis"))]
fn backends(config: &WardenConfig) -> anyhow::Result<Backends> {
    if config.redis_url.is_some() {
        tracing::warn!("WARDEN_REDIS_URL is set but the redis feature is disabled; using in-memory backends");
    }
    Ok(in_memory_backends(config))
}

fn in_memory_backends(config: &WardenConfig) -> Backends {
    (
        Arc::new(InMemoryProducer::new()),
        Arc::new(InMemoryEntitlementCache::new(
            config.cache_ttl,
            config.cache_max_bytes,
        )),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
