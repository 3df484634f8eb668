use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::repository::RepoError;

use super::{Store, WalCommand};

pub(crate) fn validate_reservation(reservation: &Reservation) -> Result<(), RepoError> {
    if reservation.end <= reservation.start {
        return Err(RepoError::LimitExceeded("reservation must end after it starts"));
    }
    if reservation.end - reservation.start > MAX_RESERVATION_SPAN_MS {
        return Err(RepoError::LimitExceeded("reservation too long"));
    }
    if reservation.party_size == 0 || reservation.party_size > MAX_PARTY_SIZE {
        return Err(RepoError::LimitExceeded("party size out of range"));
    }
    if reservation.participants.len() > MAX_PARTICIPANTS {
        return Err(RepoError::LimitExceeded("too many participants"));
    }
    if reservation
        .participants
        .iter()
        .any(|p| p.len() > MAX_PARTICIPANT_NAME_LEN)
    {
        return Err(RepoError::LimitExceeded("participant name too long"));
    }
    Ok(())
}

impl Store {
    /// Insert or replace a venue. Existing reservations are kept.
    ///
    /// A new venue enters the map already write-locked, so readers and
    /// concurrent saves of the same id wait until its event is durable.
    pub async fn save_venue(&self, venue: Venue) -> Result<(), RepoError> {
        if venue.name.len() > MAX_VENUE_NAME_LEN {
            return Err(RepoError::LimitExceeded("venue name too long"));
        }
        let _gate = self.compaction_gate.read().await;
        let event = Event::VenueSaved { venue: venue.clone() };

        let (shared, reserved) = {
            let _create = self.venue_create.lock().await;
            match self.get_venue_state(&venue.id) {
                Some(shared) => (shared, None),
                None => {
                    if self.venues.len() >= MAX_VENUES {
                        return Err(RepoError::LimitExceeded("too many venues"));
                    }
                    let shared = Arc::new(RwLock::new(VenueState::new(venue.clone())));
                    // Nobody else can see this lock yet.
                    let guard = shared
                        .clone()
                        .try_write_owned()
                        .map_err(|_| RepoError::Unavailable("new venue lock contended".into()))?;
                    self.venues.insert(venue.id, shared.clone());
                    (shared, Some(guard))
                }
            }
        };

        let Some(mut guard) = reserved else {
            let mut guard = shared.write().await;
            return self.persist_and_apply(&mut guard, &event).await;
        };
        let result = self.persist_and_apply(&mut guard, &event).await;
        if result.is_err() {
            self.venues.remove_if(&venue.id, |_, v| Arc::ptr_eq(v, &shared));
        }
        result
    }

    /// Check-and-insert under the venue write lock, so two concurrent
    /// bookings cannot both take the last unit.
    pub async fn create_reservation(
        &self,
        reservation: Reservation,
        capacity_units: Option<u32>,
    ) -> Result<(), RepoError> {
        validate_reservation(&reservation)?;
        let _gate = self.compaction_gate.read().await;
        let shared = self
            .get_venue_state(&reservation.venue_id)
            .ok_or(RepoError::NotFound(reservation.venue_id))?;
        let mut guard = shared.write().await;

        if self.reservation_venue.contains_key(&reservation.id) {
            return Err(RepoError::AlreadyExists(reservation.id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_VENUE {
            return Err(RepoError::LimitExceeded("too many reservations on venue"));
        }
        if let Some(capacity) = capacity_units
            && reservation.status.is_active()
        {
            let seated = guard.occupied_people(reservation.date);
            if units_for(seated + reservation.party_size) > capacity {
                return Err(RepoError::CapacityExceeded {
                    capacity,
                    occupied_units: units_for(seated),
                    party_size: reservation.party_size,
                });
            }
        }

        let event = Event::ReservationCreated { reservation };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn set_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<Reservation, RepoError> {
        if let Some(c) = &cancellation
            && c.reason.len() > MAX_CANCEL_REASON_LEN
        {
            return Err(RepoError::LimitExceeded("cancellation reason too long"));
        }
        let _gate = self.compaction_gate.read().await;
        let venue_id = self.venue_for_reservation(&id).ok_or(RepoError::NotFound(id))?;
        let shared = self
            .get_venue_state(&venue_id)
            .ok_or(RepoError::NotFound(venue_id))?;
        let mut guard = shared.write().await;

        let current = guard.reservation(&id).ok_or(RepoError::NotFound(id))?.status;
        if !current.can_transition_to(status) {
            return Err(RepoError::InvalidTransition {
                id,
                from: current,
                to: status,
            });
        }

        let event = Event::ReservationStatusChanged {
            id,
            venue_id,
            status,
            cancellation,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.reservation(&id).cloned().ok_or(RepoError::NotFound(id))
    }

    pub async fn add_no_show(&self, record: NoShowRecord) -> Result<(), RepoError> {
        let _gate = self.compaction_gate.read().await;
        let event = Event::NoShowRecorded { record };
        self.wal_append(&event).await?;
        self.apply_customer_event(&event);
        Ok(())
    }

    pub async fn put_suspension(&self, customer_id: Ulid, suspension: Suspension) -> Result<(), RepoError> {
        let _gate = self.compaction_gate.read().await;
        let event = Event::SuspensionSet {
            customer_id,
            suspension,
        };
        self.wal_append(&event).await?;
        self.apply_customer_event(&event);
        Ok(())
    }

    /// Confirmed reservations whose end has passed, as `(reservation, venue)`.
    /// Venues locked by a writer are skipped until the next sweep.
    pub fn collect_finished(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut finished = Vec::new();
        for entry in self.venues.iter() {
            let shared = entry.value().clone();
            if let Ok(guard) = shared.try_read() {
                finished.extend(
                    guard
                        .reservations
                        .iter()
                        .filter(|r| r.status == ReservationStatus::Confirmed && r.end <= now)
                        .map(|r| (r.id, guard.venue.id)),
                );
            }
        }
        finished
    }

    /// Rewrite the WAL as the minimal event list that rebuilds current state.
    pub async fn compact_wal(&self) -> Result<(), RepoError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();
        let venue_ids: Vec<Ulid> = self.venues.iter().map(|e| *e.key()).collect();
        for id in venue_ids {
            let Some(shared) = self.get_venue_state(&id) else { continue };
            let guard = shared.read().await;
            events.push(Event::VenueSaved {
                venue: guard.venue.clone(),
            });
            events.extend(guard.reservations.iter().map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            }));
        }

        let mut seen = HashSet::new();
        for entry in self.no_shows.iter() {
            for record in entry.value() {
                if seen.insert(record.id) {
                    events.push(Event::NoShowRecorded {
                        record: record.clone(),
                    });
                }
            }
        }
        for entry in self.suspensions.iter() {
            events.push(Event::SuspensionSet {
                customer_id: *entry.key(),
                suspension: *entry.value(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| RepoError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepoError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| RepoError::Unavailable(format!("WAL compaction failed: {e}")))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
