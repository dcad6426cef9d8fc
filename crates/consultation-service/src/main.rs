//! Consultation Service
//!
//! Entry point for the consultation room service. Serves the consultation
//! HTTP API and room sockets, and runs the session deadline timer.

use consultation_service::config::Config;
use consultation_service::observability::metrics::init_metrics_recorder;
use consultation_service::orchestrator::{Collaborators, RoomOrchestrator};
use consultation_service::routes::{self, AppState};
use consultation_service::services::{PgCart, PgCatalog, S3BlobStore};
use consultation_service::transcript::PgTranscriptStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "consultation_service=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Consultation Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        blob_bucket = %config.blob_bucket,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        inactivity_deadline_secs = config.room.inactivity_deadline.as_secs(),
        pending_ttl_secs = config.room.pending_ttl.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;

    info!("Database connection established");

    let blob_store =
        S3BlobStore::from_env(config.blob_bucket.clone(), config.blob_public_base_url.clone())
            .await;

    let collaborators = Collaborators {
        store: Arc::new(PgTranscriptStore::new(db_pool.clone())),
        blob_store: Arc::new(blob_store),
        catalog: Arc::new(PgCatalog::new(db_pool.clone())),
        cart: Arc::new(PgCart::new(db_pool)),
    };

    let cancel_token = CancellationToken::new();
    let orchestrator = RoomOrchestrator::start(
        collaborators,
        config.room,
        config.max_upload_bytes,
        &cancel_token,
    );

    // Timers are process-local; pick up sessions left open by the last run.
    let rearmed = orchestrator.rearm_open_sessions().await.map_err(|e| {
        error!("Failed to re-arm session deadlines: {}", e);
        e
    })?;
    info!(count = rearmed, "Session deadlines restored");

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let drain = Duration::from_secs(config.drain_seconds);

    let state = Arc::new(AppState {
        orchestrator,
        config,
    });
    let app = routes::build_routes(state, metrics_handle);

    info!("Consultation Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token, drain))
    .await?;

    info!("Consultation Service shutdown complete");

    Ok(())
}

/// `LOG_FORMAT=json` selects JSON output; anything else is human-readable.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
///
/// On signal, closes every room with reason `shutdown`, stops the deadline
/// timer and waits for the drain period before the listener stops.
async fn shutdown_signal(cancel_token: CancellationToken, drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    cancel_token.cancel();

    if drain.is_zero() {
        info!("Skipping drain period (DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
