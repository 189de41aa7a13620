//! Metrics definitions for the account service
//!
//! All metrics follow Prometheus naming conventions:
//! - `acct_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `operation`: orchestrator operations (~11 values)
//! - `status`: 2 values (success, error)
//! - `error_category`: 4 values (validation, authentication, state, internal)
//! - `action`: reversal kinds (~5 values)
//! - `kind`: token kinds (3 values)
//! - `transition`: lifecycle transitions (5 values)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its scrape listener on `bind_address`.
///
/// Must be called once, from within the runtime, before any metric is
/// recorded.
///
/// # Errors
///
/// Returns an error if the address is invalid or a recorder is already
/// installed.
pub fn init_metrics_exporter(bind_address: &str) -> Result<(), String> {
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| format!("Invalid metrics bind address: {e}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        // Saga durations span several collaborator round trips
        .set_buckets_for_metric(
            Matcher::Full("acct_saga_duration_seconds".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set saga duration buckets: {e}"))?
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

// ============================================================================
// Saga Metrics
// ============================================================================

/// Record an orchestrator operation
///
/// Metric: `acct_saga_duration_seconds`, `acct_saga_total`
/// Labels: `operation`, `status`, `error_category`
pub fn record_saga(operation: &str, status: &str, error_category: Option<&str>, duration: Duration) {
    let category = error_category.unwrap_or("none");
    histogram!("acct_saga_duration_seconds", "operation" => operation.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("acct_saga_total", "operation" => operation.to_string(), "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}

/// Record one reversal executed during compensation
///
/// Metric: `acct_compensation_actions_total`
/// Labels: `action`, `status` (success, error, timeout)
pub fn record_compensation_action(action: &str, status: &str) {
    counter!("acct_compensation_actions_total", "action" => action.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record a lifecycle transition
///
/// Metric: `acct_lifecycle_transitions_total`
/// Labels: `transition`, `status`
pub fn record_lifecycle_transition(transition: &str, status: &str) {
    counter!("acct_lifecycle_transitions_total", "transition" => transition.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record accounts hard-deleted by the purge sweeper
///
/// Metric: `acct_accounts_purged_total`
pub fn record_accounts_purged(count: u64) {
    counter!("acct_accounts_purged_total").increment(count);
}

// ============================================================================
// Login Code Metrics
// ============================================================================

/// Record a login code operation
///
/// Metric: `acct_login_codes_total`
/// Labels: `operation` (issue, validate, revoke), `outcome`
pub fn record_login_code(operation: &str, outcome: &str) {
    counter!("acct_login_codes_total", "operation" => operation.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance
///
/// Metric: `acct_token_issuance_total`
/// Labels: `kind`, `status`
pub fn record_token_issuance(kind: &str, status: &str) {
    counter!("acct_token_issuance_total", "kind" => kind.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record token validation result
///
/// Metric: `acct_token_validations_total`
/// Labels: `kind`, `status`, `error_category`
pub fn record_token_validation(kind: &str, status: &str, error_category: Option<&str>) {
    let category = error_category.unwrap_or("none");
    counter!("acct_token_validations_total", "kind" => kind.to_string(), "status" => status.to_string(), "error_category" => category.to_string())
        .increment(1);
}
