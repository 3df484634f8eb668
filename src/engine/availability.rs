use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::repository::{ReservationRepository, VenueRepository};

use super::EngineError;

/// Snapshot from the party sizes of a date's active reservations.
///
/// Sizes are summed before rounding to units, so many small parties do not
/// each claim a whole table.
pub fn capacity_snapshot(total_capacity: u32, party_sizes: impl IntoIterator<Item = u32>) -> CapacitySnapshot {
    let people = party_sizes.into_iter().fold(0u32, u32::saturating_add);
    CapacitySnapshot::new(total_capacity, people)
}

/// Remaining capacity of a venue on a calendar date. Read-only.
pub struct AvailabilityChecker {
    reservations: Arc<dyn ReservationRepository>,
    venues: Arc<dyn VenueRepository>,
}

impl AvailabilityChecker {
    pub fn new(reservations: Arc<dyn ReservationRepository>, venues: Arc<dyn VenueRepository>) -> Self {
        Self { reservations, venues }
    }

    /// Store failures surface as `RepositoryUnavailable`; they never read as "available".
    pub async fn check_availability(&self, venue_id: Ulid, date: NaiveDate) -> Result<Availability, EngineError> {
        let venue = self
            .venues
            .get_venue(venue_id)
            .await?
            .ok_or(EngineError::NotFound(venue_id))?;
        self.check_venue(&venue, date).await
    }

    /// Same as `check_availability` for a venue already loaded.
    pub async fn check_venue(&self, venue: &Venue, date: NaiveDate) -> Result<Availability, EngineError> {
        let Some(total) = venue.capacity else {
            tracing::debug!(venue = %venue.id, "capacity not configured");
            return Ok(Availability::CapacityUnknown);
        };

        let started = Instant::now();
        let active = self
            .reservations
            .list_by_venue_date(venue.id, date, &ACTIVE_STATUSES)
            .await?;
        metrics::histogram!(crate::observability::AVAILABILITY_CHECK_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        let snapshot = capacity_snapshot(
            total,
            active.iter().filter(|r| r.is_active()).map(|r| r.party_size),
        );
        tracing::debug!(
            venue = %venue.id,
            %date,
            occupied = snapshot.occupied_units,
            available = snapshot.available_units,
            "availability checked"
        );
        Ok(Availability::Known(snapshot))
    }
}
