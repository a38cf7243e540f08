//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_server_started_total` (counter): calls started, by method
//! - `rpc_server_handled_total` (counter): calls finished, by method and code
//! - `rpc_server_handling_seconds` (histogram): call latency, by method
//! - `mux_connections_classified_total` (counter): connections routed, by rule
//! - `mux_connections_dropped_total` (counter): connections dropped before routing, by reason
//! - `password_svc_build_info` (gauge): always 1, labelled with version/revision/branch
//!
//! # Design Decisions
//! - The library only records through the `metrics` facade; the binary installs the recorder
//! - Without an installed recorder every call here is a no-op

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use crate::observability::telemetry::BuildInfo;

/// Latency buckets (seconds) for call histograms.
const HANDLING_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the process-wide Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("rpc_server_handling_seconds".to_string()),
            HANDLING_BUCKETS,
        )?
        .install_recorder()
}

pub fn record_rpc_started(method: &'static str) {
    ::metrics::counter!("rpc_server_started_total", "method" => method).increment(1);
}

pub fn record_rpc_handled(method: &'static str, code: &'static str, elapsed: Duration) {
    ::metrics::counter!("rpc_server_handled_total", "method" => method, "code" => code)
        .increment(1);
    ::metrics::histogram!("rpc_server_handling_seconds", "method" => method)
        .record(elapsed.as_secs_f64());
}

pub fn record_mux_classified(rule: &'static str) {
    ::metrics::counter!("mux_connections_classified_total", "rule" => rule).increment(1);
}

pub fn record_mux_dropped(reason: &'static str) {
    ::metrics::counter!("mux_connections_dropped_total", "reason" => reason).increment(1);
}

pub fn record_build_info(build: &BuildInfo) {
    ::metrics::gauge!(
        "password_svc_build_info",
        "version" => build.version.clone(),
        "revision" => build.revision.clone(),
        "branch" => build.branch.clone()
    )
    .set(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_recorded_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_rpc_started("hash");
            record_rpc_handled("hash", "ok", Duration::from_millis(3));
            record_mux_dropped("timeout");
            record_build_info(&BuildInfo {
                version: "1.2.3".to_string(),
                revision: "abc123".to_string(),
                branch: "main".to_string(),
                build_date: "unknown".to_string(),
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"rpc_server_started_total{method="hash"} 1"#));
        assert!(rendered.contains(r#"rpc_server_handled_total{method="hash",code="ok"} 1"#));
        assert!(rendered.contains(r#"mux_connections_dropped_total{reason="timeout"} 1"#));
        assert!(rendered.contains(r#"version="1.2.3""#));
    }
}
