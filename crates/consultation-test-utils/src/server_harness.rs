//! Test server harness for E2E testing
//!
//! Provides `TestServer` for spawning real consultation service instances
//! in tests, backed either by in-memory collaborators or by a Postgres pool.

use crate::fixtures::MemoryCollaborators;
use crate::test_ids::{TEST_BLOB_BASE_URL, TEST_JWT_SECRET};
use crate::token_builders::TestTokenBuilder;
use consultation_service::config::{Config, RoomSettings};
use consultation_service::orchestrator::{Collaborators, RoomOrchestrator};
use consultation_service::routes::{self, AppState};
use consultation_service::services::blob_store::mock::InMemoryBlobStore;
use consultation_service::services::{PgCart, PgCatalog};
use consultation_service::transcript::PgTranscriptStore;
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the consultation service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestServer::spawn().await?;
///
///     let response = reqwest::get(format!("{}/v1/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestServer {
    addr: SocketAddr,
    config: Config,
    orchestrator: Arc<RoomOrchestrator>,
    memory: Option<MemoryCollaborators>,
    cancel_token: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a server over seeded in-memory collaborators with default
    /// room settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_settings(RoomSettings::default()).await
    }

    /// Spawn a server over seeded in-memory collaborators.
    pub async fn spawn_with_settings(room: RoomSettings) -> Result<Self, anyhow::Error> {
        let memory = MemoryCollaborators::seeded().await;
        let collaborators = Collaborators {
            store: memory.store.clone(),
            blob_store: memory.blobs.clone(),
            catalog: memory.catalog.clone(),
            cart: memory.cart.clone(),
        };
        Self::start(collaborators, room, Some(memory)).await
    }

    /// Spawn a server over a migrated Postgres database (typically from
    /// `#[sqlx::test]`). Blobs stay in memory.
    pub async fn spawn_with_pool(pool: PgPool) -> Result<Self, anyhow::Error> {
        let collaborators = Collaborators {
            store: Arc::new(PgTranscriptStore::new(pool.clone())),
            blob_store: Arc::new(InMemoryBlobStore::accepting(TEST_BLOB_BASE_URL)),
            catalog: Arc::new(PgCatalog::new(pool.clone())),
            cart: Arc::new(PgCart::new(pool)),
        };
        Self::start(collaborators, RoomSettings::default(), None).await
    }

    async fn start(
        collaborators: Collaborators,
        room: RoomSettings,
        memory: Option<MemoryCollaborators>,
    ) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
            (
                "BLOB_PUBLIC_BASE_URL".to_string(),
                TEST_BLOB_BASE_URL.to_string(),
            ),
            ("MAX_UPLOAD_BYTES".to_string(), "65536".to_string()),
        ]);

        let mut config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;
        config.room = room;

        let cancel_token = CancellationToken::new();
        let orchestrator = RoomOrchestrator::start(
            collaborators,
            config.room,
            config.max_upload_bytes,
            &cancel_token,
        );
        orchestrator
            .rearm_open_sessions()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to re-arm deadlines: {}", e))?;

        // A recorder that is never installed globally; /metrics renders empty.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let state = Arc::new(AppState {
            orchestrator: Arc::clone(&orchestrator),
            config: config.clone(),
        });
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            orchestrator,
            memory,
            cancel_token,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL for a path, e.g. `/users/consultations/1/rooms`.
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The orchestrator behind the router, for registry status and
    /// driving deadlines directly.
    pub fn orchestrator(&self) -> &Arc<RoomOrchestrator> {
        &self.orchestrator
    }

    /// In-memory collaborators; `None` for a Postgres-backed server.
    pub fn memory(&self) -> Option<&MemoryCollaborators> {
        self.memory.as_ref()
    }

    /// Bearer token for a user id.
    pub fn user_token(&self, id: i64) -> String {
        TestTokenBuilder::new().for_user(id).sign()
    }

    /// Bearer token for a doctor id.
    pub fn doctor_token(&self, id: i64) -> String {
        TestTokenBuilder::new().for_doctor(id).sign()
    }

    /// Close every room and stop the deadline timer.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self._handle.abort();
    }
}
