mod availability;
mod error;
mod policy;
#[cfg(test)]
pub(crate) mod tests_support;

pub use availability::{AvailabilityChecker, capacity_snapshot};
pub use error::EngineError;
pub use policy::{BookingDecision, CancellationOutcome, Denial, PolicyEngine};

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::repository::{CustomerRepository, ReservationRepository, VenueRepository};
use crate::store::Store;

/// A customer's request for a spot. Times are venue-local wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub venue_id: Ulid,
    pub customer_id: Ulid,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub party_size: u32,
    pub participants: Vec<String>,
}

/// Booking flow on top of the schedule, policy and availability checks.
///
/// Holds no state of its own; every call reads through the repositories.
pub struct BookingEngine {
    venues: Arc<dyn VenueRepository>,
    reservations: Arc<dyn ReservationRepository>,
    availability: AvailabilityChecker,
    policy: PolicyEngine,
    utc_offset: FixedOffset,
}

impl BookingEngine {
    pub fn new(
        venues: Arc<dyn VenueRepository>,
        reservations: Arc<dyn ReservationRepository>,
        customers: Arc<dyn CustomerRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            availability: AvailabilityChecker::new(reservations.clone(), venues.clone()),
            policy: PolicyEngine::new(reservations.clone(), customers, config.policy, config.utc_offset),
            venues,
            reservations,
            utc_offset: config.utc_offset,
        }
    }

    /// All three repositories backed by one store.
    pub fn with_store(store: Arc<Store>, config: EngineConfig) -> Self {
        Self::new(store.clone(), store.clone(), store, config)
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    // ── Venues ───────────────────────────────────────────────

    pub async fn register_venue(&self, venue: Venue) -> Result<(), EngineError> {
        let id = venue.id;
        self.venues.put_venue(venue).await?;
        tracing::info!(venue = %id, "venue registered");
        Ok(())
    }

    pub async fn availability(&self, venue_id: Ulid, date: NaiveDate) -> Result<Availability, EngineError> {
        self.availability.check_availability(venue_id, date).await
    }

    // ── Booking ──────────────────────────────────────────────

    pub async fn can_book(&self, customer_id: Ulid) -> BookingDecision {
        self.policy.can_book(customer_id).await
    }

    pub async fn book(&self, request: BookingRequest) -> Result<Reservation, EngineError> {
        self.book_at(request, now_ms()).await
    }

    /// Schedule, then policy, then capacity, then persist. The new
    /// reservation is `Pending`.
    pub async fn book_at(&self, request: BookingRequest, now: Ms) -> Result<Reservation, EngineError> {
        let venue_id = request.venue_id;
        let customer_id = request.customer_id;
        let result = self.try_book(request, now).await;
        let outcome = crate::observability::booking_outcome_label(&result);
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        match &result {
            Ok(r) => tracing::info!(
                reservation = %r.id,
                venue = %venue_id,
                customer = %customer_id,
                party_size = r.party_size,
                "reservation booked"
            ),
            Err(e) => tracing::info!(venue = %venue_id, customer = %customer_id, outcome, "booking refused: {e}"),
        }
        result
    }

    async fn try_book(&self, request: BookingRequest, now: Ms) -> Result<Reservation, EngineError> {
        if request.party_size == 0 {
            return Err(EngineError::InvalidRequest("party size must be positive"));
        }
        if request.end <= request.start {
            return Err(EngineError::InvalidRequest("reservation must end after it starts"));
        }
        let date = request.start.date();
        if request.end.date() != date {
            return Err(EngineError::InvalidRequest("reservation must start and end on the same day"));
        }
        let start = local_to_ms(request.start, self.utc_offset);
        let end = local_to_ms(request.end, self.utc_offset);
        if start <= now {
            return Err(EngineError::InvalidRequest("reservation starts in the past"));
        }

        let venue = self
            .venues
            .get_venue(request.venue_id)
            .await?
            .ok_or(EngineError::NotFound(request.venue_id))?;
        let schedule = &venue.schedule;
        if !schedule.is_open_on(date) {
            return Err(EngineError::ClosedOnDay(date));
        }
        if !schedule.is_within_hours(request.start.time()) || !schedule.is_within_hours(request.end.time()) {
            return Err(EngineError::OutsideOperatingHours {
                open: schedule.open_time(),
                close: schedule.close_time(),
            });
        }

        let decision = self.policy.can_book_at(request.customer_id, now).await;
        if let Some(denial) = decision.reason {
            return Err(EngineError::Denied(denial));
        }

        if let Availability::Known(snapshot) = self.availability.check_venue(&venue, date).await?
            && !snapshot.can_seat(request.party_size)
        {
            return Err(EngineError::CapacityExceeded {
                capacity: snapshot.total_capacity,
                occupied_units: snapshot.occupied_units,
                party_size: request.party_size,
            });
        }

        let reservation = Reservation {
            id: Ulid::new(),
            venue_id: venue.id,
            customer_id: request.customer_id,
            date,
            start,
            end,
            party_size: request.party_size,
            status: ReservationStatus::Pending,
            participants: request.participants,
            created_at: now,
            cancellation: None,
        };
        self.reservations
            .insert_reservation(reservation.clone(), venue.capacity)
            .await?;
        Ok(reservation)
    }

    // ── Lifecycle ────────────────────────────────────────────

    pub async fn confirm(&self, reservation_id: Ulid) -> Result<Reservation, EngineError> {
        let r = self
            .reservations
            .update_status(reservation_id, ReservationStatus::Confirmed, None)
            .await?;
        tracing::info!(reservation = %reservation_id, "reservation confirmed");
        Ok(r)
    }

    pub async fn complete(&self, reservation_id: Ulid) -> Result<Reservation, EngineError> {
        let r = self
            .reservations
            .update_status(reservation_id, ReservationStatus::Completed, None)
            .await?;
        metrics::counter!(crate::observability::RESERVATIONS_COMPLETED_TOTAL, "source" => "engine").increment(1);
        Ok(r)
    }

    pub async fn cancel(
        &self,
        reservation_id: Ulid,
        customer_id: Ulid,
        reason: &str,
    ) -> Result<CancellationOutcome, EngineError> {
        self.policy.cancel_reservation(reservation_id, customer_id, reason).await
    }

    pub async fn cancel_at(
        &self,
        reservation_id: Ulid,
        customer_id: Ulid,
        reason: &str,
        now: Ms,
    ) -> Result<CancellationOutcome, EngineError> {
        self.policy
            .cancel_reservation_at(reservation_id, customer_id, reason, now)
            .await
    }

    pub async fn record_no_show(&self, reservation_id: Ulid) -> Result<Option<Suspension>, EngineError> {
        self.policy.record_no_show(reservation_id).await
    }

    pub async fn booking_state(&self, customer_id: Ulid) -> Result<CustomerBookingState, EngineError> {
        self.policy.booking_state_at(customer_id, now_ms()).await
    }
}
