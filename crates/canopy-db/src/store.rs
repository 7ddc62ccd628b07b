//! `SQLite`-backed [`SnapshotStore`].

use crate::error::DatabaseError;
use crate::{listings, runs};
use async_trait::async_trait;
use canopy_core::store::check_replaceable;
use canopy_core::{
    AvailabilityDelta, CanonicalListing, ScrapeRun, Snapshot, SnapshotStore, StoreError, TargetId,
};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

/// Snapshot store persisting run headers and the current listings per target.
///
/// A snapshot replacement writes the run header, drops the target's previous
/// listings and inserts the new batch in one transaction.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    pool: Pool<Sqlite>,
}

impl SqliteSnapshotStore {
    /// Create a store over a migrated pool.
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn record_run(&self, run: &ScrapeRun) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(DatabaseError::from)?;
        runs::insert_run(&mut conn, run).await?;
        tracing::debug!(target_id = %run.target_id(), run_id = %run.id(), status = %run.status(), "recorded run");
        Ok(())
    }

    async fn replace_snapshot(
        &self,
        run: &ScrapeRun,
        listings: &[CanonicalListing],
    ) -> Result<AvailabilityDelta, StoreError> {
        check_replaceable(run, listings)?;

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;

        let prior = listings::current_ids(&mut tx, run.target_id()).await?;
        runs::insert_run(&mut tx, run).await?;
        listings::write_snapshot(&mut tx, run.target_id(), run.id(), Utc::now(), listings).await?;

        tx.commit().await.map_err(DatabaseError::from)?;

        let delta = AvailabilityDelta::between(
            prior.iter().map(String::as_str),
            listings.iter().map(|l| l.provider_item_id.as_str()),
        );
        tracing::debug!(
            target_id = %run.target_id(),
            run_id = %run.id(),
            count = listings.len(),
            appeared = delta.appeared.len(),
            disappeared = delta.disappeared.len(),
            "replaced snapshot"
        );
        Ok(delta)
    }

    async fn snapshot(&self, target_id: &TargetId) -> Result<Option<Snapshot>, StoreError> {
        Ok(listings::load_snapshot(&self.pool, target_id).await?)
    }

    async fn runs(&self, target_id: &TargetId) -> Result<Vec<ScrapeRun>, StoreError> {
        Ok(runs::list_for_target(&self.pool, target_id).await?)
    }
}
