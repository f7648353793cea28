mod clarify;
mod events;
mod extract;
mod fragment;
mod fulfill;
mod http;
mod marketplace;
mod metrics;
mod models;
mod notify;
mod queue;
mod remediation;

use axum::{Json, Router, extract::State, routing::get};
use events::{EventHandler, ReplyThrottle};
use fragment::{FragmentClient, SessionStore, StarsProvider};
use fulfill::Fulfiller;
use marketplace::HttpMarketplace;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use notify::{LogNotifier, Notifier, TelegramNotifier};
use queue::FulfillmentQueue;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "stardrop.main", "service crashed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let client = http::build_client();

    // No session, no service. A failed startup authentication is fatal.
    let session = SessionStore::init(&client).await?;
    info!(
        target = "stardrop.main",
        obtained_at = %session.obtained_at().await,
        "provider session ready",
    );
    let provider = Arc::new(FragmentClient::new(client.clone(), session));
    let balance = provider.wallet_balance().await;
    info!(target = "stardrop.main", balance = balance, "provider wallet balance");

    let marketplace = HttpMarketplace::from_env(client.clone())
        .ok_or("MARKETPLACE_BASE_URL / MARKETPLACE_AUTH_TOKEN are not set")?;
    let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_env(client.clone()) {
        Some(telegram) => Arc::new(telegram),
        None => {
            info!(
                target = "stardrop.main",
                "operator channel not configured, logging instead"
            );
            Arc::new(LogNotifier)
        }
    };

    let fulfiller = Fulfiller::new(
        provider.clone(),
        Arc::new(marketplace.clone()),
        notifier.clone(),
    );
    let (queue, worker) = FulfillmentQueue::spawn(fulfiller);

    let handler = EventHandler::new(
        Arc::new(marketplace.clone()),
        provider,
        notifier,
        queue.clone(),
        ReplyThrottle::new(reply_cooldown_from_env()),
        std::env::var("FULFILL_CATEGORY_ID").ok(),
        std::env::var("MARKETPLACE_SELF_ID")
            .ok()
            .and_then(|v| v.parse().ok()),
    );

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    tokio::spawn(serve_status(prometheus_handle));

    let (mut event_rx, poller) = marketplace.spawn_event_stream();
    info!(target = "stardrop.main", "listening for marketplace events");

    tokio::select! {
        _ = async {
            while let Some(event) = event_rx.recv().await {
                handler.handle(event).await;
            }
        } => {
            error!(target = "stardrop.main", "event stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target = "stardrop.main", "shutdown signal received");
        }
    }

    // Let the worker finish its current item; queued leftovers are dropped.
    poller.abort();
    drop(handler);
    drop(queue);
    let _ = worker.await;
    Ok(())
}

fn reply_cooldown_from_env() -> Duration {
    let secs = std::env::var("COOLDOWN_SECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1);
    Duration::from_secs(secs)
}

/// Health and metrics surface, for probes and scraping only.
async fn serve_status(prometheus_handle: PrometheusHandle) {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .with_state(prometheus_handle)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("STATUS_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(target = "stardrop.main", error = %err, "status server bind failed");
            return;
        }
    };
    info!(target = "stardrop.main", "status surface on {addr}");
    if let Err(err) = axum::serve(listener, app.into_make_service()).await {
        error!(target = "stardrop.main", error = %err, "status server crashed");
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "stardrop",
    }))
}

async fn metrics_endpoint(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
