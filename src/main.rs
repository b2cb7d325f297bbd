//! Mobile-money payment orchestrator HTTP entrypoint.
//!
//! Endpoints:
//! - `POST /payments` - initiate a payment
//! - `GET /payments/{id}` - read a transaction's current projection
//! - `POST /payments/{id}/cancel` - cancel a cancellable transaction
//! - `POST /payments/{id}/refund` - refund a confirmed transaction
//! - `POST /webhooks/{provider_tag}` - provider callback ingestion
//! - `GET /health` - liveness/readiness
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON configuration file (default `config.json`)

mod auth;
mod breaker;
mod config;
mod errors;
mod fraud;
mod handlers;
mod idempotency;
mod orchestrator;
mod provider;
mod rate_limiter;
mod retry;
mod selector;
mod state_machine;
mod store;
mod sweeper;
mod telemetry;
mod types;
mod util;
mod webhook;

use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors;

use crate::breaker::BreakerRegistry;
use crate::config::Config;
use crate::fraud::ThresholdScorer;
use crate::idempotency::IdempotencyStore;
use crate::orchestrator::Orchestrator;
use crate::provider::airteltigo::AirtelTigoAdapter;
use crate::provider::mtn::MtnAdapter;
use crate::provider::vodafone::VodafoneAdapter;
use crate::provider::{ProviderAdapter, ProviderLimits, ProviderRegistry};
use crate::rate_limiter::RateLimiter;
use crate::store::{InMemoryStore, Store};
use crate::telemetry::Telemetry;
use crate::util::SigDown;
use crate::util::money_amount::Amount;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let _telemetry = Telemetry::init();

    let config = Config::load()?;

    let mut ordered_providers: Vec<&crate::config::ProviderConfig> = config.providers.iter().collect();
    ordered_providers.sort_by_key(|p| p.priority);

    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
    let mut breaker_configs = Vec::new();
    for provider_config in ordered_providers {
        let limits = ProviderLimits {
            min: Amount::parse(&provider_config.limits.min)?,
            max: Amount::parse(&provider_config.limits.max)?,
            daily: Amount::parse(&provider_config.limits.daily)?,
        };
        let base_url = provider_config
            .credentials
            .get("base_url")
            .cloned()
            .unwrap_or_default();
        let webhook_secret = provider_config
            .credentials
            .get("webhook_secret")
            .cloned()
            .unwrap_or_default();

        let adapter: Arc<dyn ProviderAdapter> = match provider_config.tag.as_str() {
            "mtn" => Arc::new(MtnAdapter::new(
                base_url,
                provider_config.credentials.get("api_key").cloned().unwrap_or_default(),
                webhook_secret,
                limits,
            )),
            "airteltigo" => Arc::new(AirtelTigoAdapter::new(
                base_url,
                provider_config.credentials.get("client_id").cloned().unwrap_or_default(),
                provider_config.credentials.get("client_secret").cloned().unwrap_or_default(),
                webhook_secret,
                limits,
            )),
            "vodafone" => Arc::new(VodafoneAdapter::new(
                base_url,
                provider_config.credentials.get("api_key").cloned().unwrap_or_default(),
                provider_config.credentials.get("api_secret").cloned().unwrap_or_default(),
                webhook_secret,
                limits,
            )),
            other => {
                tracing::error!(tag = other, "unknown provider tag in configuration, skipping");
                continue;
            }
        };
        breaker_configs.push((provider_config.tag.clone(), provider_config.breaker));
        adapters.push(adapter);
    }

    let providers = ProviderRegistry::new(adapters);
    let breakers = BreakerRegistry::new(breaker_configs);
    let rate_limiter = RateLimiter::new();
    let idempotency = Arc::new(IdempotencyStore::new(
        config.idempotency.ttl_seconds,
        config.idempotency.processing_timeout_seconds,
    ));
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());

    let orchestrator = Arc::new(Orchestrator {
        store: store.clone(),
        providers,
        breakers,
        rate_limiter,
        idempotency: idempotency.clone(),
        fraud_scorer: Arc::new(ThresholdScorer::default()),
        config: config.clone(),
    });

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();

    let sweeper_handle = tokio::spawn(sweeper::run(
        store,
        idempotency,
        Duration::from_secs(config.sweeper.interval_seconds),
        cancellation_token.clone(),
    ));

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(orchestrator))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
        std::process::exit(1);
    });

    let shutdown_token = cancellation_token.clone();
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;

    cancellation_token.cancel();
    let _ = sweeper_handle.await;

    Ok(())
}
