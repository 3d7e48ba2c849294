//! Social Publisher Service
//!
//! Receives catalog events over HTTP and cross-posts products to Facebook and
//! Instagram in the background.
//!
//! ## Architecture
//!
//! ```text
//! Catalog admin (after commit)
//!   ↓ POST /events/product-created | /events/image-added
//! axum router → 202 Accepted
//!   ↓
//! PublishDispatcher (dedup lock, detached task)
//!   ↓
//! Graph API (Facebook page, Instagram account)
//!   ↓
//! PATCH catalog /products/{id} (published flag)
//! ```
//!
//! ## Endpoints
//!
//! - `GET /health`: liveness plus which providers are configured
//! - `GET /metrics`: Prometheus metrics
//! - `POST /events/product-created`: body is the product snapshot
//! - `POST /events/image-added`: `{product_id, image, order}`

pub mod config;
pub mod metrics;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use config::AppConfig;
use core_config::{Environment, FromEnv};
use domain_social_publishing::{
    CommitGate, DispatchOutcome, HttpCatalogStore, ImageAdded, InMemoryPublishLock, Product,
    PublishDispatcher, PublishLock, PublisherSettings, RedisPublishLock,
};
use eyre::{Result, WrapErr};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    dispatcher: PublishDispatcher,
}

#[derive(Debug, Serialize)]
struct EventAccepted {
    outcome: DispatchOutcome,
}

/// HTTP surface of the service.
///
/// Events are only sent once the catalog transaction has committed, so every
/// dispatch uses an already open [`CommitGate`].
pub fn router(dispatcher: PublishDispatcher) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route("/events/product-created", post(product_created))
        .route("/events/image-added", post(image_added))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { dispatcher })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let providers: Map<String, Value> = state
        .dispatcher
        .providers()
        .into_iter()
        .map(|(name, configured)| (name.to_string(), Value::Bool(configured)))
        .collect();
    Json(json!({ "status": "ok", "providers": providers }))
}

async fn prometheus_metrics() -> String {
    metrics::render_metrics()
}

async fn product_created(State(state): State<AppState>, Json(product): Json<Product>) -> impl IntoResponse {
    let outcome = state
        .dispatcher
        .product_created(product, CommitGate::committed())
        .await;
    (StatusCode::ACCEPTED, Json(EventAccepted { outcome }))
}

async fn image_added(State(state): State<AppState>, Json(event): Json<ImageAdded>) -> impl IntoResponse {
    let outcome = state
        .dispatcher
        .image_added(event, CommitGate::committed())
        .await;
    (StatusCode::ACCEPTED, Json(EventAccepted { outcome }))
}

/// Run the publisher service
///
/// 1. Sets up structured logging and the Prometheus recorder
/// 2. Resolves service and publishing settings once
/// 3. Picks the dedup lock (Redis when `REDIS_URL` is set)
/// 4. Serves events until SIGINT/SIGTERM
///
/// Publish tasks still in flight at shutdown are abandoned.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);
    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting social publisher"
    );
    info!("Environment: {:?}", environment);

    let config = AppConfig::from_env().wrap_err("Failed to load service configuration")?;
    let settings = PublisherSettings::from_env().wrap_err("Failed to load publisher settings")?;

    let catalog = Arc::new(
        HttpCatalogStore::new(&config.catalog_api_url, settings.limits.graph_timeout)
            .wrap_err("Failed to build catalog client")?,
    );

    let lock: Arc<dyn PublishLock> = match &config.redis {
        Some(redis) => Arc::new(
            RedisPublishLock::connect(&redis.url)
                .await
                .wrap_err("Failed to connect publish lock to Redis")?,
        ),
        None => {
            warn!("REDIS_URL not set, dedup lock is local to this process");
            Arc::new(InMemoryPublishLock::new())
        }
    };

    let dispatcher = PublishDispatcher::from_settings(settings, catalog, lock)
        .wrap_err("Failed to build publish dispatcher")?;
    for (provider, configured) in dispatcher.providers() {
        if !configured {
            warn!(provider, "Provider not configured, its posts will be skipped");
        }
    }

    let address = config.server.address();
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("Failed to bind publisher to {}", address))?;
    info!(address = %address, "Publisher listening");

    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Publisher server failed")?;

    info!("Social publisher stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
