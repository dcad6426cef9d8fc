//! HTTP routes for the consultation service.
//!
//! Defines the Axum router and application state.

use crate::auth::JwtValidator;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::orchestrator::RoomOrchestrator;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use common::types::Role;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Allowance for multipart framing on top of the upload cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RoomOrchestrator>,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/health` - Store ping - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/users/consultations/...` - requires a `user` bearer credential
/// - `/doctors/consultations/...` - requires a `doctor` bearer credential
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let jwt_validator = Arc::new(JwtValidator::new(
        state.config.jwt_secret.clone(),
        state.config.jwt_clock_skew_seconds,
    ));
    let upload_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let user_routes = participant_routes("/users", upload_limit)
        .route(
            "/users/consultations",
            post(handlers::create_consultation).get(handlers::list_consultations),
        )
        .route(
            "/users/consultations/:id/prescription/add",
            post(handlers::add_prescription_to_cart),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::new(AuthState {
                jwt_validator: jwt_validator.clone(),
                required_role: Role::User,
            }),
            require_auth,
        ))
        .with_state(state.clone());

    let doctor_routes = participant_routes("/doctors", upload_limit)
        .route("/doctors/consultations", get(handlers::list_consultations))
        .route(
            "/doctors/consultations/:id/certificate",
            post(handlers::create_certificate),
        )
        .route(
            "/doctors/consultations/:id/prescription",
            post(handlers::create_prescription),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::new(AuthState {
                jwt_validator,
                required_role: Role::Doctor,
            }),
            require_auth,
        ))
        .with_state(state);

    with_service_layers(
        public_routes
            .merge(metrics_routes)
            .merge(user_routes)
            .merge(doctor_routes),
        REQUEST_TIMEOUT,
    )
}

/// Each .layer() wraps everything added before it:
/// 1. TimeoutLayer - Timeout the request (innermost)
/// 2. TraceLayer - Log request details, timeouts included
/// 3. http_metrics_middleware - Record ALL responses (outermost)
fn with_service_layers(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// Routes open to either participant, under `/users` or `/doctors`.
fn participant_routes(prefix: &str, upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{prefix}/consultations/:id"),
            get(handlers::get_consultation),
        )
        .route(
            &format!("{prefix}/consultations/:id/chats"),
            post(handlers::send_message),
        )
        .route(
            &format!("{prefix}/consultations/:id/chats/file"),
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            &format!("{prefix}/consultations/:id/end"),
            post(handlers::end_session),
        )
        .route(
            &format!("{prefix}/consultations/:id/rooms"),
            get(handlers::join_room),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use tower::ServiceExt;

    async fn slow() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    #[test]
    fn test_timed_out_request_is_recorded_by_outer_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let app = with_service_layers(
                    Router::new().route("/v1/health", get(slow)),
                    Duration::from_millis(20),
                );
                let response = app
                    .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
                    .await
                    .unwrap();
                assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
            });
        });

        let timed_out = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .any(|(key, _, _, value)| {
                key.key().name() == "cs_http_requests_total"
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "status_code" && l.value() == "408")
                    && matches!(value, DebugValue::Counter(1))
            });
        assert!(timed_out);
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
