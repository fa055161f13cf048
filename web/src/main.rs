//! Ticket relay HTTP server.
//!
//! Accepts support tickets over HTTP and relays them to RabbitMQ.

use anyhow::Context;
use std::sync::Arc;
use ticket_relay_rabbitmq::RabbitMqBroker;
use ticket_relay_runtime::RelayClient;
use ticket_relay_runtime::metrics::MetricsRecorder;
use ticket_relay_web::{AppState, Config, build_router};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so RUST_LOG from .env is honored
    let (config, env_file) = Config::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ticket relay");
    if let Some(path) = &env_file {
        info!(path = %path.display(), "Loaded .env file");
    }

    let broker = RabbitMqBroker::builder()
        .uri(&config.broker.url)
        .connection_name(&config.broker.connection_name)
        .build();
    info!(
        rabbitmq_url = %broker.redacted_uri(),
        queue = %config.broker.queue_name,
        "Configuration loaded"
    );

    let metrics = if config.server.metrics_enabled {
        let mut recorder = MetricsRecorder::new();
        match recorder.install() {
            Ok(()) => Some(Arc::new(recorder)),
            Err(e) => {
                warn!(error = %e, "Metrics disabled");
                None
            }
        }
    } else {
        None
    };

    info!("Connecting to RabbitMQ...");
    let client = Arc::new(
        RelayClient::new(Arc::new(broker), config.broker.client_config())
            .await
            .context("Failed to connect to RabbitMQ")?,
    );
    info!("RabbitMQ client ready");

    let mut state = AppState::new(Arc::clone(&client), config.broker.queue_name.as_str());
    if let Some(metrics) = metrics {
        state = state.with_metrics(metrics);
    }
    let app = build_router(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped, closing RabbitMQ client");
    client.close().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
