use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::schedule::OperatingSchedule;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// People seated by one table unit.
pub const PEOPLE_PER_UNIT: u32 = 4;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Venue-local wall clock time → Unix ms.
pub fn local_to_ms(local: NaiveDateTime, offset: FixedOffset) -> Ms {
    local.and_utc().timestamp_millis() - i64::from(offset.local_minus_utc()) * 1000
}

/// Unix ms → venue-local wall clock time.
pub fn ms_to_local(ms: Ms, offset: FixedOffset) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|utc| utc.with_timezone(&offset).naive_local())
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

/// Statuses that hold a seat.
pub const ACTIVE_STATUSES: [ReservationStatus; 2] =
    [ReservationStatus::Pending, ReservationStatus::Confirmed];

impl ReservationStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Cancelled | ReservationStatus::Completed)
    }

    /// pending → confirmed, pending|confirmed → cancelled, confirmed → completed.
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub at: Ms,
    pub reason: String,
    /// Cancelled inside the penalty window.
    pub late: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub venue_id: Ulid,
    pub customer_id: Ulid,
    /// Venue-local calendar date of the start.
    pub date: NaiveDate,
    pub start: Ms,
    pub end: Ms,
    pub party_size: u32,
    pub status: ReservationStatus,
    pub participants: Vec<String>,
    pub created_at: Ms,
    pub cancellation: Option<Cancellation>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Fractional hours from `now` until the start. Negative once started.
    pub fn hours_until_start(&self, now: Ms) -> f64 {
        (self.start - now) as f64 / HOUR_MS as f64
    }
}

// ── Capacity ─────────────────────────────────────────────────────

/// Capacity of one venue on one date. Computed, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub total_capacity: u32,
    /// Sum of party sizes of active reservations.
    pub occupied_people: u32,
    pub occupied_units: u32,
    pub available_units: u32,
}

impl CapacitySnapshot {
    pub fn new(total_capacity: u32, occupied_people: u32) -> Self {
        let occupied_units = units_for(occupied_people);
        Self {
            total_capacity,
            occupied_people,
            occupied_units,
            available_units: total_capacity.saturating_sub(occupied_units),
        }
    }

    /// Whether a party still fits once summed with the people already seated.
    pub fn can_seat(&self, party_size: u32) -> bool {
        units_for(self.occupied_people.saturating_add(party_size)) <= self.total_capacity
    }

    /// Share of units occupied, 0-100.
    pub fn occupancy_percent(&self) -> u32 {
        if self.total_capacity == 0 {
            return 100;
        }
        let pct = u64::from(self.occupied_units) * 100 / u64::from(self.total_capacity);
        pct.min(100) as u32
    }
}

/// Units needed to seat `people`, rounded up.
pub fn units_for(people: u32) -> u32 {
    people.div_ceil(PEOPLE_PER_UNIT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Known(CapacitySnapshot),
    /// The venue has no configured capacity; the caller decides.
    CapacityUnknown,
}

impl Availability {
    pub fn snapshot(&self) -> Option<&CapacitySnapshot> {
        match self {
            Availability::Known(s) => Some(s),
            Availability::CapacityUnknown => None,
        }
    }
}

// ── Penalties ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoShowKind {
    LateCancellation,
    NoShow,
}

impl NoShowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoShowKind::LateCancellation => "late_cancellation",
            NoShowKind::NoShow => "no_show",
        }
    }
}

/// Append-only penalty marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoShowRecord {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub reservation_id: Ulid,
    pub kind: NoShowKind,
    pub at: Ms,
}

impl NoShowRecord {
    pub fn new(customer_id: Ulid, reservation_id: Ulid, kind: NoShowKind, at: Ms) -> Self {
        Self {
            id: Ulid::new(),
            customer_id,
            reservation_id,
            kind,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    pub until: Ms,
    /// No-show count that triggered the suspension.
    pub no_show_count: u32,
}

impl Suspension {
    pub fn is_active_at(&self, now: Ms) -> bool {
        self.until > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerBookingState {
    pub active_reservations: u32,
    pub no_show_count: u32,
    /// Only set while the suspension has not expired.
    pub suspended_until: Option<Ms>,
}

// ── Venues ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Ulid,
    pub name: String,
    /// Table units; `None` when the manager never configured it.
    pub capacity: Option<u32>,
    pub schedule: OperatingSchedule,
}

impl Venue {
    /// Build a venue from the loosely typed fields of a venue record.
    /// A zero capacity counts as unset.
    pub fn from_raw(
        id: Ulid,
        name: impl Into<String>,
        capacity: Option<u32>,
        raw_days: Option<&serde_json::Value>,
        raw_hours: Option<&str>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            capacity: capacity.filter(|c| *c > 0),
            schedule: OperatingSchedule::from_raw(raw_days, raw_hours),
        }
    }
}

/// A venue and its reservations, sorted by `start`.
#[derive(Debug, Clone)]
pub struct VenueState {
    pub venue: Venue,
    pub reservations: Vec<Reservation>,
}

impl VenueState {
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.start <= reservation.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    pub fn on_date(&self, date: NaiveDate) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(move |r| r.date == date)
    }

    /// People seated by active reservations on `date`.
    pub fn occupied_people(&self, date: NaiveDate) -> u32 {
        self.on_date(date)
            .filter(|r| r.is_active())
            .map(|r| r.party_size)
            .sum()
    }
}

/// The WAL record format. Flat, no nesting beyond the entity payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    VenueSaved {
        venue: Venue,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: Ulid,
        venue_id: Ulid,
        status: ReservationStatus,
        cancellation: Option<Cancellation>,
    },
    NoShowRecorded {
        record: NoShowRecord,
    },
    SuspensionSet {
        customer_id: Ulid,
        suspension: Suspension,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn reservation(date: NaiveDate, start: Ms, party_size: u32, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            venue_id: Ulid::new(),
            customer_id: Ulid::new(),
            date,
            start,
            end: start + HOUR_MS,
            party_size,
            status,
            participants: Vec::new(),
            created_at: 0,
            cancellation: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn status_transitions() {
        use ReservationStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Pending));
        for terminal in [Cancelled, Completed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, Cancelled, Completed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn active_statuses() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
        assert!(!ReservationStatus::Completed.is_active());
    }

    #[test]
    fn snapshot_sums_before_rounding() {
        let s = CapacitySnapshot::new(10, 4 + 4 + 1);
        assert_eq!(s.occupied_units, 3);
        assert_eq!(s.available_units, 7);
        // Nine parties of one fill three units, not nine.
        let s = CapacitySnapshot::new(10, 9);
        assert_eq!(s.occupied_units, 3);
    }

    #[test]
    fn snapshot_available_floors_at_zero() {
        let s = CapacitySnapshot::new(2, 20);
        assert_eq!(s.occupied_units, 5);
        assert_eq!(s.available_units, 0);
        assert_eq!(s.occupancy_percent(), 100);
    }

    #[test]
    fn can_seat_uses_combined_party() {
        // 3 people seated in 1 unit; one more still fits that unit.
        let s = CapacitySnapshot::new(1, 3);
        assert!(s.can_seat(1));
        assert!(!s.can_seat(2));
    }

    #[test]
    fn occupancy_percent() {
        assert_eq!(CapacitySnapshot::new(4, 0).occupancy_percent(), 0);
        assert_eq!(CapacitySnapshot::new(4, 8).occupancy_percent(), 50);
        assert_eq!(CapacitySnapshot::new(0, 0).occupancy_percent(), 100);
    }

    #[test]
    fn hours_until_start() {
        let r = reservation(day(1), 10 * HOUR_MS, 2, ReservationStatus::Pending);
        assert_eq!(r.hours_until_start(6 * HOUR_MS), 4.0);
        assert!(r.hours_until_start(11 * HOUR_MS) < 0.0);
    }

    #[test]
    fn local_time_roundtrip_with_offset() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let local = day(7).and_time(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        let ms = local_to_ms(local, offset);
        // 10:00 at UTC-3 is 13:00 UTC
        assert_eq!(ms, local.and_utc().timestamp_millis() + 3 * HOUR_MS);
        assert_eq!(ms_to_local(ms, offset), Some(local));
    }

    #[test]
    fn venue_state_keeps_start_order() {
        let mut vs = VenueState::new(Venue::from_raw(Ulid::new(), "Barraca", Some(5), None, None));
        vs.insert_reservation(reservation(day(1), 300, 1, ReservationStatus::Pending));
        vs.insert_reservation(reservation(day(1), 100, 1, ReservationStatus::Pending));
        vs.insert_reservation(reservation(day(1), 200, 1, ReservationStatus::Pending));
        let starts: Vec<Ms> = vs.reservations.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn occupied_people_ignores_inactive_and_other_dates() {
        let mut vs = VenueState::new(Venue::from_raw(Ulid::new(), "Barraca", Some(5), None, None));
        vs.insert_reservation(reservation(day(1), 100, 4, ReservationStatus::Pending));
        vs.insert_reservation(reservation(day(1), 200, 3, ReservationStatus::Confirmed));
        vs.insert_reservation(reservation(day(1), 300, 6, ReservationStatus::Cancelled));
        vs.insert_reservation(reservation(day(1), 400, 2, ReservationStatus::Completed));
        vs.insert_reservation(reservation(day(2), 500, 5, ReservationStatus::Pending));
        assert_eq!(vs.occupied_people(day(1)), 7);
        assert_eq!(vs.occupied_people(day(2)), 5);
    }

    #[test]
    fn zero_capacity_counts_as_unset() {
        let v = Venue::from_raw(Ulid::new(), "Barraca", Some(0), None, None);
        assert_eq!(v.capacity, None);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            reservation: reservation(day(3), 1_000, 4, ReservationStatus::Pending),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
