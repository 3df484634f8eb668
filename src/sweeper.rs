use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::model::{Ms, ReservationStatus, now_ms};
use crate::store::Store;

/// Background task: completes finished reservations and compacts the WAL
/// once `compact_threshold` appends have piled up since the last compaction.
/// A threshold of 0 never compacts.
pub async fn run_sweeper(store: Arc<Store>, every: Duration, compact_threshold: u64) {
    let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        sweep_once(&store, now_ms()).await;

        let appends = store.wal_appends_since_compact().await;
        if compact_threshold > 0 && appends >= compact_threshold {
            match store.compact_wal().await {
                Ok(()) => info!(appends, "WAL compacted"),
                Err(e) => tracing::error!("WAL compaction failed: {e}"),
            }
        }
    }
}

/// Move confirmed reservations whose end has passed to `Completed`.
/// Returns how many were completed.
pub async fn sweep_once(store: &Store, now: Ms) -> usize {
    let finished = store.collect_finished(now);
    let mut completed = 0;
    for (reservation_id, venue_id) in finished {
        match store
            .set_status(reservation_id, ReservationStatus::Completed, None)
            .await
        {
            Ok(_) => {
                completed += 1;
                info!(reservation = %reservation_id, venue = %venue_id, "completed finished reservation");
            }
            // Cancelled between collect and update
            Err(e) => tracing::debug!("sweeper skip {reservation_id}: {e}"),
        }
    }
    if completed > 0 {
        metrics::counter!(crate::observability::RESERVATIONS_COMPLETED_TOTAL, "source" => "sweeper")
            .increment(completed as u64);
    }
    completed
}
