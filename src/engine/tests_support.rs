use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::repository::{CustomerRepository, RepoError, ReservationRepository};
use crate::store::Store;

pub fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("beachspot_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

pub fn test_store(name: &str) -> Arc<Store> {
    Arc::new(Store::open(test_wal_path(name)).unwrap())
}

/// Store wrapper whose reads or penalty writes can be switched to fail.
pub struct FlakyRepo {
    inner: Arc<Store>,
    reads: AtomicBool,
    penalty_writes: AtomicBool,
}

impl FlakyRepo {
    pub fn new(inner: Arc<Store>) -> Self {
        Self {
            inner,
            reads: AtomicBool::new(false),
            penalty_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.reads.store(fail, Ordering::SeqCst);
    }

    /// No-show inserts and suspension writes.
    pub fn fail_penalty_writes(&self, fail: bool) {
        self.penalty_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), RepoError> {
        if self.reads.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn check_penalty_write(&self) -> Result<(), RepoError> {
        if self.penalty_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Unavailable("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationRepository for FlakyRepo {
    async fn list_by_venue_date(
        &self,
        venue_id: Ulid,
        date: NaiveDate,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, RepoError> {
        self.check_read()?;
        self.inner.list_by_venue_date(venue_id, date, statuses).await
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, RepoError> {
        self.check_read()?;
        ReservationRepository::get(self.inner.as_ref(), id).await
    }

    async fn get_for_customer(&self, id: Ulid, customer_id: Ulid) -> Result<Option<Reservation>, RepoError> {
        self.check_read()?;
        self.inner.get_for_customer(id, customer_id).await
    }

    async fn insert_reservation(&self, reservation: Reservation, capacity_units: Option<u32>) -> Result<(), RepoError> {
        self.inner.insert_reservation(reservation, capacity_units).await
    }

    async fn update_status(
        &self,
        id: Ulid,
        status: ReservationStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<Reservation, RepoError> {
        self.inner.update_status(id, status, cancellation).await
    }

    async fn count_active_for_customer(&self, customer_id: Ulid) -> Result<u32, RepoError> {
        self.check_read()?;
        self.inner.count_active_for_customer(customer_id).await
    }

    async fn insert_no_show(&self, record: NoShowRecord) -> Result<(), RepoError> {
        self.check_penalty_write()?;
        self.inner.insert_no_show(record).await
    }

    async fn count_no_shows(&self, customer_id: Ulid) -> Result<u32, RepoError> {
        self.check_read()?;
        self.inner.count_no_shows(customer_id).await
    }
}

#[async_trait]
impl CustomerRepository for FlakyRepo {
    async fn get_suspension(&self, customer_id: Ulid) -> Result<Option<Suspension>, RepoError> {
        self.check_read()?;
        self.inner.get_suspension(customer_id).await
    }

    async fn set_suspension(&self, customer_id: Ulid, suspension: Suspension) -> Result<(), RepoError> {
        self.check_penalty_write()?;
        self.inner.set_suspension(customer_id, suspension).await
    }
}
