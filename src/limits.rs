use crate::model::{HOUR_MS, Ms};

pub const MAX_VENUE_NAME_LEN: usize = 200;
pub const MAX_PARTY_SIZE: u32 = 200;
pub const MAX_PARTICIPANTS: usize = 200;
pub const MAX_PARTICIPANT_NAME_LEN: usize = 120;
pub const MAX_CANCEL_REASON_LEN: usize = 500;
/// A reservation may not run longer than one day.
pub const MAX_RESERVATION_SPAN_MS: Ms = 24 * HOUR_MS;
pub const MAX_RESERVATIONS_PER_VENUE: usize = 100_000;
pub const MAX_VENUES: usize = 10_000;
