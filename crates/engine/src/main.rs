//! Guildcraft Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guildcraft_engine::api;
use guildcraft_engine::app::App;
use guildcraft_engine::infrastructure::{
    app_settings::{EngineSettings, QueueBackend},
    clock::SystemClock,
    command_channel::CommandChannel,
    persistence::{connect, SqliteJobQueue, SqliteWorldStore},
    ports::{ClockPort, CommandSink, JobQueue, WorldStore},
    queues::InMemoryJobQueue,
    rcon::RconConnector,
};
use guildcraft_engine::use_cases::{JobRecovery, JobWorker, RetryPolicy};

/// How long shutdown waits for the job in flight to finish.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may be started from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guildcraft_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Guildcraft Engine");

    let settings = EngineSettings::from_env()?;
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    // World store and job queue share one database file.
    tracing::info!(path = %settings.database.path, "Opening world database");
    let pool = connect(&settings.database.path, settings.database.max_connections).await?;
    let store: Arc<dyn WorldStore> = Arc::new(
        SqliteWorldStore::new(pool.clone(), settings.layout.clone(), clock.clone()).await?,
    );
    let queue: Arc<dyn JobQueue> = match settings.database.queue_backend {
        QueueBackend::Sqlite => Arc::new(SqliteJobQueue::new(pool).await?),
        QueueBackend::Memory => Arc::new(InMemoryJobQueue::new()),
    };
    tracing::info!(backend = ?settings.database.queue_backend, "Job queue ready");

    // Rebuild the queue from the job table before anything consumes it.
    let recovery = JobRecovery::new(store.clone(), queue.clone(), clock.clone());
    let reconciled = recovery
        .reconcile(Duration::from_secs(settings.worker.stale_after_secs))
        .await?;
    tracing::info!(
        reset = reconciled.reset,
        requeued = reconciled.requeued,
        "Startup reconciliation complete"
    );

    // World command backend
    tracing::info!(address = %settings.rcon.address, "Command backend configured");
    let connector = Arc::new(RconConnector::new(
        settings.rcon.address.clone(),
        settings.rcon.password.clone(),
        settings.rcon.timeout(),
    ));
    let channel = Arc::new(CommandChannel::new(connector, settings.throttle.clone()));
    let sink: Arc<dyn CommandSink> = channel.clone();

    let cancel = CancellationToken::new();

    // Spawn the job worker
    let retry = RetryPolicy::from_settings(&settings.worker);
    tracing::info!(
        max_attempts = retry.max_attempts,
        base_delay_ms = retry.base_delay.as_millis() as u64,
        topology = ?settings.layout.topology,
        "Job worker configured"
    );
    let worker = JobWorker::new(
        store.clone(),
        queue.clone(),
        sink,
        clock.clone(),
        settings.layout.clone(),
        retry,
    )
    .with_idle_poll(Duration::from_millis(settings.worker.idle_poll_ms));
    let worker_cancel = cancel.clone();
    let worker_task = tokio::spawn(async move { worker.run(worker_cancel).await });

    // Ctrl-C cancels everything
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested"),
            Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        signal_cancel.cancel();
    });

    // Create application
    let app = Arc::new(App::new(store, queue, settings.layout.clone()));

    let mut router = api::http::routes()
        .with_state(app)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(&settings.server.cors_allowed_origins) {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server_cancel = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            server_cancel.cancelled().await;
            tracing::info!("HTTP server received shutdown signal");
        })
        .await?;

    // The server may also stop on its own; make sure the worker follows.
    cancel.cancel();
    if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker_task)
        .await
        .is_err()
    {
        tracing::warn!("Job worker did not stop in time");
    }
    channel.close().await;
    tracing::info!("Guildcraft Engine stopped");

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer(allowed_origins: &str) -> Option<CorsLayer> {
    let allowed_origins = allowed_origins.trim();
    if allowed_origins.is_empty() {
        return None;
    }

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        // The bot posts JSON, which triggers CORS preflights.
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        tracing::warn!("CORS configured to allow ANY origin");
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
