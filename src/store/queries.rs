use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::repository::{CustomerRepository, RepoError, ReservationRepository, VenueRepository};

use super::Store;

impl Store {
    pub async fn reservation(&self, id: Ulid) -> Option<Reservation> {
        let venue_id = self.venue_for_reservation(&id)?;
        let shared = self.get_venue_state(&venue_id)?;
        let guard = shared.read().await;
        guard.reservation(&id).cloned()
    }

    pub async fn reservations_for_customer(&self, customer_id: Ulid) -> Vec<Reservation> {
        let ids = self
            .customer_reservations
            .get(&customer_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.reservation(id).await {
                found.push(r);
            }
        }
        found
    }

    pub fn no_shows_for(&self, customer_id: &Ulid) -> Vec<NoShowRecord> {
        self.no_shows
            .get(customer_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn suspension(&self, customer_id: &Ulid) -> Option<Suspension> {
        self.suspensions.get(customer_id).map(|e| *e.value())
    }

    pub async fn venue(&self, id: &Ulid) -> Option<Venue> {
        let shared = self.get_venue_state(id)?;
        let guard = shared.read().await;
        Some(guard.venue.clone())
    }
}

#[async_trait]
impl ReservationRepository for Store {
    async fn list_by_venue_date(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, RepoError> {
        let Some(shared) = self.get_venue_state(&venue_id) else {
            return Ok(Vec::new());
        };
        let guard = shared.read().await;
        Ok(guard
            .on_date(date)
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect())
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, RepoError> {
        Ok(self.reservation(id).await)
    }

    async fn get_for_customer(
        &self,
        id: Ulid,
        customer_id: Ulid,
    ) -> Result<Option<Reservation>, RepoError> {
        Ok(self
            .reservation(id)
            .await
            .filter(|r| r.customer_id == customer_id))
    }

    async fn insert_reservation(
        &self,
        reservation: Reservation,
        capacity_units: Option<u32>,
    ) -> Result<(), RepoError> {
        self.create_reservation(reservation, capacity_units).await
    }

    async fn update_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<Reservation, RepoError> {
        self.set_status(id, status, cancellation).await
    }

    async fn count_active_for_customer(&self, customer_id: Ulid) -> Result<u32, RepoError> {
        let active = self
            .reservations_for_customer(customer_id)
            .await
            .iter()
            .filter(|r| r.is_active())
            .count();
        Ok(active as u32)
    }

    async fn insert_no_show(&self, record: NoShowRecord) -> Result<(), RepoError> {
        self.add_no_show(record).await
    }

    async fn count_no_shows(&self, customer_id: Ulid) -> Result<u32, RepoError> {
        Ok(self.no_shows.get(&customer_id).map_or(0, |e| e.value().len() as u32))
    }
}

#[async_trait]
impl CustomerRepository for Store {
    async fn get_suspension(&self, customer_id: Ulid) -> Result<Option<Suspension>, RepoError> {
        Ok(self.suspension(&customer_id))
    }

    async fn set_suspension(&self, customer_id: Ulid, suspension: Suspension) -> Result<(), RepoError> {
        self.put_suspension(customer_id, suspension).await
    }
}

#[async_trait]
impl VenueRepository for Store {
    async fn get_venue(&self, id: Ulid) -> Result<Option<Venue>, RepoError> {
        Ok(self.venue(&id).await)
    }

    async fn put_venue(&self, venue: Venue) -> Result<(), RepoError> {
        self.save_venue(venue).await
    }
}
