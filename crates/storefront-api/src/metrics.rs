//! Client-side counters
//!
//! Recorded through the `metrics` facade; whichever recorder the host
//! process installs (the CLI uses Prometheus) collects them.

use crate::gate::Decision;

/// Every request a caller issued, labelled by final outcome:
/// `success`, `http_error`, `timeout`, `transport_error`, `refresh_failed`,
/// `invalid_request`, `decode_error`, `storage_error`.
pub fn record_request(method: &str, outcome: &'static str) {
    metrics::counter!(
        "api_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// One count per refresh exchange performed, not per waiter.
pub fn record_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("api_token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_recovery(decision: Decision) {
    metrics::counter!("api_auth_recovery_total", "decision" => decision.as_str()).increment(1);
}
