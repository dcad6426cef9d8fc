//! Metrics definitions for the consultation service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `cs_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: parameterized consultation paths, everything else is `/other`
//! - `kind`: message kinds (4) and artifact kinds (2)
//! - `by`: user, doctor, system
//! - `status`: success, error (and timeout for HTTP)
//! - `reason`: handle drop reasons (bounded by code)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle used by `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("cs_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.300, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("cs_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        // PDF rendering plus upload
        .set_buckets_for_metric(
            Matcher::Prefix("cs_artifact".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000],
        )
        .map_err(|e| format!("Failed to set artifact buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `cs_http_requests_total`, `cs_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("cs_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("cs_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Sub-resources accepted after `/{users|doctors}/consultations/{id}`.
const CONSULTATION_ACTIONS: [&str; 8] = [
    "chats",
    "chats/file",
    "end",
    "certificate",
    "prescription",
    "prescription/add",
    "rooms",
    "",
];

/// Replace consultation ids with `{id}`; unknown paths collapse to `/other`.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/v1/health" | "/metrics" => return path.to_string(),
        _ => {}
    }

    let trimmed = path.trim_start_matches('/');
    let mut parts = trimmed.splitn(4, '/');
    let (Some(role), Some("consultations")) = (parts.next(), parts.next()) else {
        return "/other".to_string();
    };
    if role != "users" && role != "doctors" {
        return "/other".to_string();
    }

    let Some(id) = parts.next() else {
        return format!("/{role}/consultations");
    };
    if id.is_empty() {
        return format!("/{role}/consultations");
    }
    if id.parse::<i64>().is_err() {
        return "/other".to_string();
    }

    let action = parts.next().unwrap_or("");
    if !CONSULTATION_ACTIONS.contains(&action) {
        return "/other".to_string();
    }

    if action.is_empty() {
        format!("/{role}/consultations/{{id}}")
    } else {
        format!("/{role}/consultations/{{id}}/{action}")
    }
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution.
///
/// Metric: `cs_db_query_duration_seconds`, `cs_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("cs_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("cs_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Consultation Lifecycle Metrics
// ============================================================================

/// Metric: `cs_messages_appended_total{kind}`
pub fn record_message_appended(kind: &str) {
    counter!("cs_messages_appended_total", "kind" => kind.to_string()).increment(1);
}

/// Metric: `cs_sessions_ended_total{by}`
pub fn record_session_ended(by: &str) {
    counter!("cs_sessions_ended_total", "by" => by.to_string()).increment(1);
}

/// Record artifact generation outcome.
///
/// Metric: `cs_artifacts_total`, `cs_artifact_duration_seconds`
/// Labels: `kind`, `status`
pub fn record_artifact(kind: &str, status: &str, duration: Duration) {
    histogram!("cs_artifact_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());

    counter!("cs_artifacts_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Metric: `cs_cart_conversions_total{status}`
///
/// Status: "success", "not_enough_stock", "error"
pub fn record_cart_conversion(status: &str) {
    counter!("cs_cart_conversions_total", "status" => status.to_string()).increment(1);
}

/// Metric: `cs_deadlines_fired_total{outcome}`
///
/// Outcome: "ended", "rearmed", "skipped"
pub fn record_deadline_fired(outcome: &str) {
    counter!("cs_deadlines_fired_total", "outcome" => outcome.to_string()).increment(1);
}

// ============================================================================
// Registry Metrics
// ============================================================================

/// Set room and connection gauges.
///
/// Metric: `cs_registry_rooms`, `cs_registry_connections`
pub fn set_registry_gauges(rooms: usize, connections: usize) {
    gauge!("cs_registry_rooms").set(rooms as f64);
    gauge!("cs_registry_connections").set(connections as f64);
}

/// Metric: `cs_registry_handles_dropped_total{reason}`
///
/// Reason: "evicted", "send_failed", "send_timeout", "queue_full", "closed"
pub fn record_handle_dropped(reason: &str) {
    counter!("cs_registry_handles_dropped_total", "reason" => reason.to_string()).increment(1);
}

/// Metric: `cs_actor_mailbox_depth{actor}`
pub fn set_actor_mailbox_depth(actor: &str, depth: usize) {
    gauge!("cs_actor_mailbox_depth", "actor" => actor.to_string()).set(depth as f64);
}
