//! API server entry point.

use api::config::{Config, LogFormat};
use audit_log::{AuditLogStore, AuditRecorder, InMemoryAuditLogStore, PostgresAuditLogStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Runs the server until shutdown, then flushes pending audit entries.
async fn serve<A>(config: Config, audit_store: A, metrics_handle: PrometheusHandle)
where
    A: AuditLogStore + Clone + 'static,
{
    let (audit, inbox) = audit_log::outbox();
    let recorder = tokio::spawn(AuditRecorder::new(inbox, audit_store.clone()).run());

    let state = api::create_default_state(audit, audit_store);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The router owned the last outbox handle; the recorder stops once drained.
    if let Err(error) = recorder.await {
        tracing::warn!(%error, "audit recorder task failed");
    }
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the audit store and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresAuditLogStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run audit log migrations");
            tracing::info!("audit log backed by Postgres");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::info!("audit log kept in memory");
            serve(config, InMemoryAuditLogStore::new(), metrics_handle).await;
        }
    }
}
