use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::ReservationStatus;
use crate::repository::RepoError;

use super::policy::Denial;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The store could not be read or written. Callers should offer a retry.
    RepositoryUnavailable(String),
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
    InvalidRequest(&'static str),
    ClosedOnDay(NaiveDate),
    OutsideOperatingHours {
        open: NaiveTime,
        close: NaiveTime,
    },
    /// The booking policy said no; the denial carries the user-facing reason.
    Denied(Denial),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::RepositoryUnavailable(e) => write!(f, "repository unavailable: {e}"),
            EngineError::CapacityExceeded {
                capacity,
                occupied_units,
                party_size,
            } => write!(
                f,
                "no room for a party of {party_size}: {occupied_units} of {capacity} units taken"
            ),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot go from {from} to {to}")
            }
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::ClosedOnDay(date) => write!(f, "venue is closed on {date}"),
            EngineError::OutsideOperatingHours { open, close } => write!(
                f,
                "outside operating hours {} - {}",
                open.format("%H:%M"),
                close.format("%H:%M")
            ),
            EngineError::Denied(denial) => write!(f, "{denial}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RepoError> for EngineError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Unavailable(msg) => EngineError::RepositoryUnavailable(msg),
            RepoError::NotFound(id) => EngineError::NotFound(id),
            RepoError::AlreadyExists(id) => EngineError::AlreadyExists(id),
            RepoError::CapacityExceeded {
                capacity,
                occupied_units,
                party_size,
            } => EngineError::CapacityExceeded {
                capacity,
                occupied_units,
                party_size,
            },
            RepoError::InvalidTransition { id, from, to } => EngineError::InvalidTransition { id, from, to },
            RepoError::LimitExceeded(msg) => EngineError::InvalidRequest(msg),
        }
    }
}
