//! Storage collaborators of the booking core.
//!
//! The core never touches storage directly; it reads and writes through these
//! traits. [`crate::store::Store`] implements all three.

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    /// The backing store could not be reached or failed the operation.
    Unavailable(String),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Rejected by the atomic capacity guard of `insert_reservation`.
    CapacityExceeded {
        capacity: u32,
        occupied_units: u32,
        party_size: u32,
    },
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoError::Unavailable(e) => write!(f, "repository unavailable: {e}"),
            RepoError::NotFound(id) => write!(f, "not found: {id}"),
            RepoError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            RepoError::CapacityExceeded {
                capacity,
                occupied_units,
                party_size,
            } => write!(
                f,
                "capacity {capacity} exceeded: {occupied_units} units occupied, party of {party_size} does not fit"
            ),
            RepoError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot go from {from} to {to}")
            }
            RepoError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for RepoError {}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Reservations of a venue on a date whose status is one of `statuses`.
    async fn list_by_venue_date(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, RepoError>;

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, RepoError>;

    /// The reservation, only if it belongs to `customer_id`.
    async fn get_for_customer(
        &self,
        id: Ulid,
        customer_id: Ulid,
    ) -> Result<Option<Reservation>, RepoError>;

    /// Insert a new reservation. With `capacity_units` set, the implementation
    /// must check and insert atomically, failing with `CapacityExceeded` when
    /// the venue's active parties on that date would need more units.
    async fn insert_reservation(
        &self,
        reservation: Reservation,
        capacity_units: Option<u32>,
    ) -> Result<(), RepoError>;

    /// Move a reservation to `status`, rejecting transitions out of terminal states.
    async fn update_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<Reservation, RepoError>;

    async fn count_active_for_customer(&self, customer_id: Ulid) -> Result<u32, RepoError>;

    async fn insert_no_show(&self, record: NoShowRecord) -> Result<(), RepoError>;

    async fn count_no_shows(&self, customer_id: Ulid) -> Result<u32, RepoError>;
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn get_suspension(&self, customer_id: Ulid) -> Result<Option<Suspension>, RepoError>;

    async fn set_suspension(&self, customer_id: Ulid, suspension: Suspension) -> Result<(), RepoError>;
}

#[async_trait]
pub trait VenueRepository: Send + Sync {
    async fn get_venue(&self, id: Ulid) -> Result<Option<Venue>, RepoError>;

    /// Insert or replace.
    async fn put_venue(&self, venue: Venue) -> Result<(), RepoError>;
}
