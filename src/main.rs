use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use whatsapp_relay::ai::ChatvoltClient;
use whatsapp_relay::config::RelayConfig;
use whatsapp_relay::dispatch::{Outbox, OutboxConfig};
use whatsapp_relay::gateway::CsaClient;
use whatsapp_relay::relay::Relay;
use whatsapp_relay::session::SessionRegistry;
use whatsapp_relay::status::JobTracker;
use whatsapp_relay::webhook::{relay_routes, serve_until};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional daily-rolling file log alongside stderr
    let (file_layer, _log_guard) = match std::env::var("RELAY_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "whatsapp-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let config_path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = RelayConfig::load(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;
    let dispatch = &config.dispatch;

    eprintln!("📨 WhatsApp Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://{}/whatsapp/webhook", config.bind_addr());
    eprintln!("   Status:  http://{}/whatsapp/status", config.bind_addr());
    eprintln!(
        "   Outbox:  {} workers, capacity {}",
        dispatch.workers, dispatch.queue_capacity
    );
    eprintln!("   Session TTL: {}s\n", dispatch.session_ttl_secs);

    // ── Core ────────────────────────────────────────────────────────────
    let tracker = Arc::new(JobTracker::new(dispatch.status_capacity));
    let sessions = Arc::new(SessionRegistry::with_policy(
        dispatch.session_ttl(),
        dispatch.lookup_policy(),
    ));
    let outbox = Arc::new(Outbox::new(
        OutboxConfig {
            workers: dispatch.workers,
            queue_capacity: dispatch.queue_capacity,
            send_timeout: dispatch.send_timeout(),
        },
        Arc::new(CsaClient::new(&config.csa)),
        Some(Arc::clone(&tracker)),
    ));
    outbox.start().await;

    let relay = Arc::new(Relay::new(
        Arc::new(ChatvoltClient::new(&config.ia.chatvolt)),
        Arc::clone(&sessions),
        Arc::clone(&outbox),
        tracker,
        dispatch.query_timeout(),
    ));

    // ── HTTP ────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    tracing::info!(addr = %config.bind_addr(), "Relay server listening");

    serve_until(
        listener,
        relay_routes(relay),
        shutdown_signal(),
        dispatch.shutdown_timeout(),
    )
    .await
    .context("HTTP server failed")?;

    // ── Shutdown: server has stopped accepting, now drain the outbox ─────
    tracing::info!("Shutting down outbox");
    if tokio::time::timeout(dispatch.shutdown_timeout(), outbox.stop())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = dispatch.shutdown_timeout_secs,
            "Outbox did not stop in time, abandoning in-flight sends"
        );
    }
    sessions.shutdown().await;

    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
