use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: scheduler operations. Labels: operation, outcome.
pub const OPERATIONS_TOTAL: &str = "viewings_operations_total";

/// Histogram: scheduler operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "viewings_operation_duration_seconds";

/// Histogram: latency of a single store call in seconds. Labels: operation.
pub const STORE_CALL_DURATION_SECONDS: &str = "viewings_store_call_duration_seconds";

/// Counter: store calls abandoned after the timeout. Labels: operation.
pub const STORE_TIMEOUTS_TOTAL: &str = "viewings_store_timeouts_total";

/// Counter: notifications that failed to deliver. Labels: event_type.
pub const NOTIFICATION_FAILURES_TOTAL: &str = "viewings_notification_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: agents with a loaded calendar.
pub const AGENTS_ACTIVE: &str = "viewings_agents_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "viewings_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "viewings_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "viewings_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_without_port_is_noop() {
        assert!(init(None).is_ok());
    }

    #[test]
    fn init_tracing_twice_is_fine() {
        init_tracing();
        init_tracing();
        tracing::info!("subscriber installed");
    }
}
