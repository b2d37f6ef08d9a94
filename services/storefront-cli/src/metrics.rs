//! Prometheus recorder for the `--metrics` flag
//!
//! The client libraries emit `api_requests_total`, `api_token_refresh_total`
//! and `api_auth_recovery_total` through the `metrics` facade; the binary adds
//! `cli_commands_total`. Installing a recorder makes them visible; the
//! rendered text is printed after the command when `--metrics` is given.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Count one command run, labelled by name and whether it succeeded.
pub fn record_command(command: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("cli_commands_total", "command" => command, "outcome" => outcome)
        .increment(1);
}
