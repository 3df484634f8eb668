use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use ulid::Ulid;

use crate::config::{InfraFailureMode, PolicyConfig};
use crate::limits::MAX_CANCEL_REASON_LEN;
use crate::model::*;
use crate::repository::{CustomerRepository, RepoError, ReservationRepository};

use super::EngineError;

/// Why a customer may not book right now. A value, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    Suspended { until: Ms, until_date: NaiveDate },
    TooManyActiveReservations { active: u32, limit: u32 },
    /// The policy store was unreachable and the engine runs fail-closed.
    PolicyUnavailable,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::Suspended { until_date, .. } => write!(
                f,
                "account suspended until {} after repeated late cancellations or no-shows",
                until_date.format("%Y-%m-%d")
            ),
            Denial::TooManyActiveReservations { active, limit } => write!(
                f,
                "too many active reservations: {active} of {limit} allowed"
            ),
            Denial::PolicyUnavailable => f.write_str("booking temporarily unavailable, please try again"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingDecision {
    pub allowed: bool,
    pub reason: Option<Denial>,
}

impl BookingDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: Denial) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancellationOutcome {
    pub penalized: bool,
    pub hours_until_start: f64,
    pub message: String,
}

/// Booking eligibility and the consequences of cancelling.
///
/// A customer is `Normal` or `Suspended`; the state is derived from the
/// stored suspension end and recovers on its own once that instant passes.
pub struct PolicyEngine {
    reservations: Arc<dyn ReservationRepository>,
    customers: Arc<dyn CustomerRepository>,
    config: PolicyConfig,
    utc_offset: FixedOffset,
}

impl PolicyEngine {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        customers: Arc<dyn CustomerRepository>,
        config: PolicyConfig,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            reservations,
            customers,
            config,
            utc_offset,
        }
    }

    pub async fn can_book(&self, customer_id: Ulid) -> BookingDecision {
        self.can_book_at(customer_id, now_ms()).await
    }

    pub async fn can_book_at(&self, customer_id: Ulid, now: Ms) -> BookingDecision {
        let suspension = match self.customers.get_suspension(customer_id).await {
            Ok(s) => s,
            Err(e) => return self.on_infra_failure(customer_id, "suspension lookup", &e),
        };
        if let Some(s) = suspension
            && s.is_active_at(now)
        {
            tracing::info!(customer = %customer_id, until = s.until, "booking denied: suspended");
            return BookingDecision::deny(Denial::Suspended {
                until: s.until,
                until_date: self.local_date(s.until),
            });
        }

        let active = match self.reservations.count_active_for_customer(customer_id).await {
            Ok(n) => n,
            Err(e) => return self.on_infra_failure(customer_id, "active reservation count", &e),
        };
        let limit = self.config.max_active_reservations;
        if active >= limit {
            tracing::info!(customer = %customer_id, active, limit, "booking denied: active cap");
            return BookingDecision::deny(Denial::TooManyActiveReservations { active, limit });
        }

        BookingDecision::allow()
    }

    /// The store could not answer. Which way this goes is configuration.
    fn on_infra_failure(&self, customer_id: Ulid, what: &str, err: &RepoError) -> BookingDecision {
        match self.config.on_infra_failure {
            InfraFailureMode::FailOpen => {
                metrics::counter!(crate::observability::POLICY_INFRA_FAILURES_TOTAL, "mode" => "fail_open")
                    .increment(1);
                tracing::warn!(customer = %customer_id, "{what} failed, allowing booking: {err}");
                BookingDecision::allow()
            }
            InfraFailureMode::FailClosed => {
                metrics::counter!(crate::observability::POLICY_INFRA_FAILURES_TOTAL, "mode" => "fail_closed")
                    .increment(1);
                tracing::warn!(customer = %customer_id, "{what} failed, denying booking: {err}");
                BookingDecision::deny(Denial::PolicyUnavailable)
            }
        }
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: Ulid,
        customer_id: Ulid,
        reason: &str,
    ) -> Result<CancellationOutcome, EngineError> {
        self.cancel_reservation_at(reservation_id, customer_id, reason, now_ms())
            .await
    }

    /// Customers can always cancel. Inside the penalty window the cancellation
    /// also records a late-cancellation penalty; failing to record it is
    /// logged and does not undo the cancellation.
    pub async fn cancel_reservation_at(
        &self,
        reservation_id: Ulid,
        customer_id: Ulid,
        reason: &str,
        now: Ms,
    ) -> Result<CancellationOutcome, EngineError> {
        let reservation = self
            .reservations
            .get_for_customer(reservation_id, customer_id)
            .await?
            .ok_or(EngineError::NotFound(reservation_id))?;
        if !reservation.status.can_transition_to(ReservationStatus::Cancelled) {
            return Err(EngineError::InvalidTransition {
                id: reservation_id,
                from: reservation.status,
                to: ReservationStatus::Cancelled,
            });
        }

        let hours_until_start = reservation.hours_until_start(now);
        let late = reservation.start - now < self.config.penalty_window;
        let cancellation = Cancellation {
            at: now,
            reason: truncate(reason, MAX_CANCEL_REASON_LEN),
            late,
        };
        self.reservations
            .update_status(reservation_id, ReservationStatus::Cancelled, Some(cancellation))
            .await?;

        let timing = if late { "late" } else { "on_time" };
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL, "timing" => timing).increment(1);
        tracing::info!(
            reservation = %reservation_id,
            customer = %customer_id,
            hours_until_start,
            late,
            "reservation cancelled"
        );

        let window_hours = self.config.penalty_window as f64 / HOUR_MS as f64;
        if !late {
            return Ok(CancellationOutcome {
                penalized: false,
                hours_until_start,
                message: "Reservation cancelled penalty-free.".to_string(),
            });
        }

        let record = NoShowRecord::new(customer_id, reservation_id, NoShowKind::LateCancellation, now);
        if let Err(e) = self.register_no_show(record, now).await {
            metrics::counter!(crate::observability::PENALTY_BOOKKEEPING_FAILURES_TOTAL).increment(1);
            tracing::error!(
                reservation = %reservation_id,
                customer = %customer_id,
                "late cancellation penalty not recorded: {e}"
            );
        }

        Ok(CancellationOutcome {
            penalized: true,
            hours_until_start,
            message: format!(
                "Reservation cancelled less than {window_hours} hours before start; a penalty-free cancellation was no longer possible and a late cancellation was recorded."
            ),
        })
    }

    pub async fn record_no_show(&self, reservation_id: Ulid) -> Result<Option<Suspension>, EngineError> {
        self.record_no_show_at(reservation_id, now_ms()).await
    }

    /// Venue-side marking of a customer who never arrived. The reservation is
    /// closed as cancelled and a `no_show` record is written.
    pub async fn record_no_show_at(&self, reservation_id: Ulid, now: Ms) -> Result<Option<Suspension>, EngineError> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .await?
            .ok_or(EngineError::NotFound(reservation_id))?;
        if reservation.start > now {
            return Err(EngineError::InvalidRequest("reservation has not started yet"));
        }
        let cancellation = Cancellation {
            at: now,
            reason: "no-show".to_string(),
            late: true,
        };
        self.reservations
            .update_status(reservation_id, ReservationStatus::Cancelled, Some(cancellation))
            .await?;

        let record = NoShowRecord::new(reservation.customer_id, reservation_id, NoShowKind::NoShow, now);
        Ok(self.register_no_show(record, now).await?)
    }

    async fn register_no_show(&self, record: NoShowRecord, now: Ms) -> Result<Option<Suspension>, RepoError> {
        let customer_id = record.customer_id;
        let kind = record.kind;
        self.reservations.insert_no_show(record).await?;
        metrics::counter!(crate::observability::NO_SHOWS_RECORDED_TOTAL, "kind" => kind.as_str()).increment(1);
        self.evaluate_suspension_at(customer_id, now).await
    }

    /// Suspend once the all-time no-show count reaches the threshold.
    ///
    /// Every call at or above the threshold restarts the window from `now`,
    /// including calls made while a suspension is still running.
    pub(crate) async fn evaluate_suspension_at(&self, customer_id: Ulid, now: Ms) -> Result<Option<Suspension>, RepoError> {
        let count = self.reservations.count_no_shows(customer_id).await?;
        if count < self.config.no_show_threshold {
            return Ok(None);
        }
        let suspension = Suspension {
            until: now.saturating_add(self.config.suspension_duration),
            no_show_count: count,
        };
        self.customers.set_suspension(customer_id, suspension).await?;
        metrics::counter!(crate::observability::SUSPENSIONS_TOTAL).increment(1);
        tracing::info!(
            customer = %customer_id,
            no_shows = count,
            until = suspension.until,
            "customer suspended"
        );
        Ok(Some(suspension))
    }

    /// Strict read of the derived per-customer view; store errors surface.
    pub async fn booking_state_at(&self, customer_id: Ulid, now: Ms) -> Result<CustomerBookingState, EngineError> {
        let active_reservations = self.reservations.count_active_for_customer(customer_id).await?;
        let no_show_count = self.reservations.count_no_shows(customer_id).await?;
        let suspended_until = self
            .customers
            .get_suspension(customer_id)
            .await?
            .filter(|s| s.is_active_at(now))
            .map(|s| s.until);
        Ok(CustomerBookingState {
            active_reservations,
            no_show_count,
            suspended_until,
        })
    }

    fn local_date(&self, ms: Ms) -> NaiveDate {
        ms_to_local(ms, self.utc_offset)
            .map(|dt| dt.date())
            .unwrap_or_default()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
