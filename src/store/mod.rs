//! Durable reference implementation of the repository traits.
//!
//! State lives in memory: one `RwLock`ed [`VenueState`] per venue holding its
//! reservations, plus customer-keyed maps for no-show records and suspensions.
//! Every mutation is appended to the WAL before it is applied, and a single
//! writer task batches concurrent appends into one fsync.

mod mutations;
mod queries;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::repository::RepoError;
use crate::wal::Wal;

pub type SharedVenueState = Arc<RwLock<VenueState>>;

type Ack = oneshot::Sender<io::Result<()>>;

enum WalCommand {
    Append { event: Event, response: Ack },
    Compact { events: Vec<Event>, response: Ack },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the WAL. Takes one append, then everything already queued behind it,
/// and commits the whole batch with one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_control(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        commit_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<(Event, Ack)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so no partial frame leaks into the
    // next batch; every sender in this batch is told it failed.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => commit_batch(wal, vec![(event, response)]),
    }
}

pub struct Store {
    venues: DashMap<Ulid, SharedVenueState>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: reservation id → venue id.
    reservation_venue: DashMap<Ulid, Ulid>,
    /// Customer id → their reservation ids, any status.
    customer_reservations: DashMap<Ulid, Vec<Ulid>>,
    no_shows: DashMap<Ulid, Vec<NoShowRecord>>,
    suspensions: DashMap<Ulid, Suspension>,
    /// Mutations hold it shared from WAL append through apply; compaction
    /// holds it exclusively so its snapshot cannot miss an appended event.
    compaction_gate: RwLock<()>,
    /// Serializes the existence and `MAX_VENUES` checks for new venues.
    venue_create: Mutex<()>,
}

impl Store {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            venues: DashMap::new(),
            wal_tx,
            reservation_venue: DashMap::new(),
            customer_reservations: DashMap::new(),
            no_shows: DashMap::new(),
            suspensions: DashMap::new(),
            compaction_gate: RwLock::new(()),
            venue_create: Mutex::new(()),
        };

        // Nobody else holds these locks yet, so try_write always succeeds;
        // blocking_write would panic inside the runtime.
        for event in events {
            match &event {
                Event::VenueSaved { venue } if !store.venues.contains_key(&venue.id) => {
                    store
                        .venues
                        .insert(venue.id, Arc::new(RwLock::new(VenueState::new(venue.clone()))));
                }
                _ => {
                    let Some(venue_id) = store.event_venue_id(&event) else {
                        store.apply_customer_event(&event);
                        continue;
                    };
                    let Some(shared) = store.get_venue_state(&venue_id) else {
                        tracing::warn!("replay: event for unknown venue {venue_id} skipped");
                        continue;
                    };
                    if let Ok(mut guard) = shared.try_write() {
                        store.apply_venue_event(&mut guard, &event);
                    }
                }
            }
        }

        tracing::info!(
            venues = store.venues.len(),
            reservations = store.reservation_venue.len(),
            "store replayed {}",
            wal_path.display()
        );
        Ok(store)
    }

    async fn wal_append(&self, event: &Event) -> Result<(), RepoError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| RepoError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepoError::Unavailable("WAL writer dropped response".into()))?
            .map_err(|e| RepoError::Unavailable(format!("WAL append failed: {e}")))
    }

    /// WAL-append then apply, under the caller's venue lock.
    async fn persist_and_apply(&self, rs: &mut VenueState, event: &Event) -> Result<(), RepoError> {
        self.wal_append(event).await?;
        self.apply_venue_event(rs, event);
        Ok(())
    }

    pub fn get_venue_state(&self, id: &Ulid) -> Option<SharedVenueState> {
        self.venues.get(id).map(|e| e.value().clone())
    }

    pub fn venue_for_reservation(&self, id: &Ulid) -> Option<Ulid> {
        self.reservation_venue.get(id).map(|e| *e.value())
    }

    pub fn venue_count(&self) -> usize {
        self.venues.len()
    }

    /// Apply a venue-scoped event; the caller holds the venue's write lock.
    fn apply_venue_event(&self, rs: &mut VenueState, event: &Event) {
        match event {
            Event::VenueSaved { venue } => rs.venue = venue.clone(),
            Event::ReservationCreated { reservation } => {
                self.reservation_venue.insert(reservation.id, reservation.venue_id);
                self.customer_reservations
                    .entry(reservation.customer_id)
                    .or_default()
                    .push(reservation.id);
                rs.insert_reservation(reservation.clone());
            }
            Event::ReservationStatusChanged {
                id,
                status,
                cancellation,
                ..
            } => {
                if let Some(r) = rs.reservation_mut(id) {
                    r.status = *status;
                    if cancellation.is_some() {
                        r.cancellation = cancellation.clone();
                    }
                }
            }
            Event::NoShowRecorded { .. } | Event::SuspensionSet { .. } => self.apply_customer_event(event),
        }
    }

    fn apply_customer_event(&self, event: &Event) {
        match event {
            Event::NoShowRecorded { record } => {
                self.no_shows
                    .entry(record.customer_id)
                    .or_default()
                    .push(record.clone());
            }
            Event::SuspensionSet {
                customer_id,
                suspension,
            } => {
                self.suspensions.insert(*customer_id, *suspension);
            }
            _ => {}
        }
    }

    /// Venue that owns a venue-scoped event; `None` for customer events.
    fn event_venue_id(&self, event: &Event) -> Option<Ulid> {
        match event {
            Event::VenueSaved { venue } => Some(venue.id),
            Event::ReservationCreated { reservation } => Some(reservation.venue_id),
            Event::ReservationStatusChanged { venue_id, .. } => Some(*venue_id),
            Event::NoShowRecorded { .. } | Event::SuspensionSet { .. } => None,
        }
    }
}
