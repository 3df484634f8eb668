use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use beachspot::config::{EngineConfig, brasilia_offset};
use beachspot::engine::{BookingEngine, BookingRequest, Denial, EngineError};
use beachspot::model::*;
use beachspot::store::Store;

// ── Test infrastructure ──────────────────────────────────────

fn data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("beachspot_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn open(dir: &std::path::Path) -> (Arc<Store>, BookingEngine) {
    let store = Arc::new(Store::open(dir.join("beachspot.wal")).unwrap());
    let engine = BookingEngine::with_store(store.clone(), EngineConfig::default());
    (store, engine)
}

fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 21).unwrap()
}

fn local(date: NaiveDate, h: u32) -> NaiveDateTime {
    date.and_hms_opt(h, 0, 0).unwrap()
}

fn request(venue_id: Ulid, customer_id: Ulid, date: NaiveDate, h: u32, party_size: u32) -> BookingRequest {
    BookingRequest {
        venue_id,
        customer_id,
        start: local(date, h),
        end: local(date, h + 2),
        party_size,
        participants: Vec::new(),
    }
}

fn beach_bar() -> Venue {
    // Stored the way the venue admin screens write it.
    let days = json!("[\"segunda-feira\", \"terça-feira\", \"quarta-feira\", \"quinta-feira\", \"sexta-feira\"]");
    Venue::from_raw(Ulid::new(), "Barraca do Zé", Some(5), Some(&days), Some("09:00-18:00"))
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn book_cancel_late_and_free_the_spot() {
    let dir = data_dir();
    let (store, engine) = open(&dir);
    let venue = beach_bar();
    assert_ok!(engine.register_venue(venue.clone()).await);

    let customer = Ulid::new();
    let start = local_to_ms(local(wednesday(), 10), brasilia_offset());
    let now = start - 3 * DAY_MS;

    let reservation = assert_ok!(
        engine
            .book_at(request(venue.id, customer, wednesday(), 10, 4), now)
            .await
    );
    let snapshot = *assert_ok!(engine.availability(venue.id, wednesday()).await)
        .snapshot()
        .unwrap();
    assert_eq!(snapshot.occupied_units, 1);
    assert_eq!(snapshot.available_units, 4);
    assert_eq!(snapshot.occupancy_percent(), 20);

    let outcome = assert_ok!(
        engine
            .cancel_at(reservation.id, customer, "rain", start - 2 * HOUR_MS)
            .await
    );
    assert!(outcome.penalized);

    let records = store.no_shows_for(&customer);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, NoShowKind::LateCancellation);

    let snapshot = *assert_ok!(engine.availability(venue.id, wednesday()).await)
        .snapshot()
        .unwrap();
    assert_eq!(snapshot.available_units, 5);

    // Survives a restart.
    drop(engine);
    drop(store);
    let (store, engine) = open(&dir);
    let reopened = store.reservation(reservation.id).await.unwrap();
    assert_eq!(reopened.status, ReservationStatus::Cancelled);
    assert!(reopened.cancellation.unwrap().late);
    let state = assert_ok!(engine.policy().booking_state_at(customer, now).await);
    assert_eq!(state.no_show_count, 1);
    assert_eq!(state.active_reservations, 0);
}

#[tokio::test]
async fn repeat_late_cancellations_suspend_the_customer() {
    let dir = data_dir();
    let (_, engine) = open(&dir);
    let venue = beach_bar();
    assert_ok!(engine.register_venue(venue.clone()).await);
    let customer = Ulid::new();
    let now = local_to_ms(local(wednesday(), 8), brasilia_offset()) - 2 * DAY_MS;

    let mut last_cancel = 0;
    for h in [9, 12, 15] {
        let r = assert_ok!(
            engine
                .book_at(request(venue.id, customer, wednesday(), h, 2), now)
                .await
        );
        last_cancel = r.start - 30 * 60_000;
        let outcome = assert_ok!(engine.cancel_at(r.id, customer, "", last_cancel).await);
        assert!(outcome.penalized);
    }

    let err = assert_err!(
        engine
            .book_at(
                request(venue.id, customer, wednesday().succ_opt().unwrap(), 10, 2),
                last_cancel
            )
            .await
    );
    let EngineError::Denied(Denial::Suspended { until, until_date }) = err else {
        panic!("expected suspension, got {err:?}");
    };
    assert_eq!(until, last_cancel + 7 * DAY_MS);
    assert_eq!(until_date, NaiveDate::from_ymd_opt(2026, 10, 28).unwrap());
    assert!(err.to_string().contains("2026-10-28"));
}

#[tokio::test]
async fn parallel_customers_cannot_overbook() {
    let dir = data_dir();
    let (_, engine) = open(&dir);
    let engine = Arc::new(engine);
    let venue = beach_bar();
    assert_ok!(engine.register_venue(venue.clone()).await);
    let now = local_to_ms(local(wednesday(), 8), brasilia_offset()) - DAY_MS;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let engine = engine.clone();
        let venue_id = venue.id;
        handles.push(tokio::spawn(async move {
            engine
                .book_at(request(venue_id, Ulid::new(), wednesday(), 10, 3), now)
                .await
        }));
    }
    let mut booked = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => booked += 1,
            Err(EngineError::CapacityExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    // 5 units seat 20 people: six parties of 3.
    assert_eq!(booked, 6);

    let snapshot = *assert_ok!(engine.availability(venue.id, wednesday()).await)
        .snapshot()
        .unwrap();
    assert_eq!(snapshot.available_units, 0);
    assert_eq!(snapshot.occupancy_percent(), 100);
}
