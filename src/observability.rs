use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Booking decisions ───────────────────────────────────────────

/// Counter: booking attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "beachspot_bookings_total";

/// Counter: cancellations. Labels: timing (`on_time`, `late`).
pub const CANCELLATIONS_TOTAL: &str = "beachspot_cancellations_total";

/// Counter: no-show records written. Labels: kind.
pub const NO_SHOWS_RECORDED_TOTAL: &str = "beachspot_no_shows_recorded_total";

/// Counter: suspensions set or extended.
pub const SUSPENSIONS_TOTAL: &str = "beachspot_suspensions_total";

/// Counter: policy checks that hit a store error. Labels: mode (`fail_open`, `fail_closed`).
pub const POLICY_INFRA_FAILURES_TOTAL: &str = "beachspot_policy_infra_failures_total";

/// Counter: late cancellations whose penalty could not be recorded.
pub const PENALTY_BOOKKEEPING_FAILURES_TOTAL: &str = "beachspot_penalty_bookkeeping_failures_total";

/// Histogram: availability check latency in seconds.
pub const AVAILABILITY_CHECK_DURATION_SECONDS: &str = "beachspot_availability_check_duration_seconds";

/// Counter: reservations completed. Labels: source (`engine`, `sweeper`).
pub const RESERVATIONS_COMPLETED_TOTAL: &str = "beachspot_reservations_completed_total";

// ── Store ───────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "beachspot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "beachspot_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Label for a booking outcome.
pub fn booking_outcome_label(result: &Result<crate::model::Reservation, crate::engine::EngineError>) -> &'static str {
    use crate::engine::EngineError;
    match result {
        Ok(_) => "booked",
        Err(EngineError::Denied(_)) => "denied",
        Err(EngineError::CapacityExceeded { .. }) => "full",
        Err(EngineError::ClosedOnDay(_) | EngineError::OutsideOperatingHours { .. }) => "closed",
        Err(EngineError::RepositoryUnavailable(_)) => "unavailable",
        Err(_) => "rejected",
    }
}
