//! In-memory snapshot store.

use async_trait::async_trait;
use canopy_core::store::check_replaceable;
use canopy_core::{
    AvailabilityDelta, CanonicalListing, ScrapeRun, Snapshot, SnapshotStore, StoreError, TargetId,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    snapshots: HashMap<TargetId, Snapshot>,
    runs: HashMap<TargetId, Vec<ScrapeRun>>,
}

/// Snapshot store kept in process memory.
///
/// Used for dry runs and tests; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn record_run(&self, run: &ScrapeRun) -> Result<(), StoreError> {
        self.lock()
            .runs
            .entry(run.target_id().clone())
            .or_default()
            .push(run.clone());
        Ok(())
    }

    async fn replace_snapshot(
        &self,
        run: &ScrapeRun,
        listings: &[CanonicalListing],
    ) -> Result<AvailabilityDelta, StoreError> {
        check_replaceable(run, listings)?;

        let mut inner = self.lock();
        let delta = {
            let prior = inner
                .snapshots
                .get(run.target_id())
                .map(|s| s.listings.as_slice())
                .unwrap_or_default();
            AvailabilityDelta::between(
                prior.iter().map(|l| l.provider_item_id.as_str()),
                listings.iter().map(|l| l.provider_item_id.as_str()),
            )
        };

        inner.snapshots.insert(
            run.target_id().clone(),
            Snapshot {
                target_id: run.target_id().clone(),
                run_id: run.id().clone(),
                replaced_at: Utc::now(),
                listings: listings.to_vec(),
            },
        );
        inner
            .runs
            .entry(run.target_id().clone())
            .or_default()
            .push(run.clone());
        Ok(delta)
    }

    async fn snapshot(&self, target_id: &TargetId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.lock().snapshots.get(target_id).cloned())
    }

    async fn runs(&self, target_id: &TargetId) -> Result<Vec<ScrapeRun>, StoreError> {
        Ok(self
            .lock()
            .runs
            .get(target_id)
            .map(|runs| runs.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{
        Category, Confidence, FailureCause, MenuType, RunHandle, RunStatus, StrategyId,
    };
    use serde_json::json;

    fn listing(id: &str) -> CanonicalListing {
        CanonicalListing {
            provider_item_id: id.to_string(),
            name: format!("Item {id}"),
            brand: String::new(),
            category: Category::Flower,
            subcategory: None,
            price: 25.0,
            discount_price: None,
            discount_text: None,
            description: None,
            size_spec: None,
            menu_type: MenuType::Recreational,
            confidence: Confidence::Mapped,
            raw_payload: json!({"id": id}),
        }
    }

    fn target() -> TargetId {
        TargetId::new("memory-store").unwrap()
    }

    #[test]
    fn test_replace_reports_delta() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();

            let first = RunHandle::start(target()).succeed(2, StrategyId::PaginatedRest);
            let delta = store
                .replace_snapshot(&first, &[listing("a"), listing("b")])
                .await
                .unwrap();
            assert_eq!(delta.appeared, ["a", "b"]);
            assert!(delta.disappeared.is_empty());

            let second = RunHandle::start(target()).succeed(2, StrategyId::PaginatedRest);
            let delta = store
                .replace_snapshot(&second, &[listing("b"), listing("c")])
                .await
                .unwrap();
            assert_eq!(delta.appeared, ["c"]);
            assert_eq!(delta.disappeared, ["a"]);
            assert_eq!(delta.retained, 1);

            let snapshot = store.snapshot(&target()).await.unwrap().unwrap();
            assert_eq!(&snapshot.run_id, second.id());
            assert_eq!(snapshot.listings.len(), 2);

            let runs = store.runs(&target()).await.unwrap();
            assert_eq!(runs.len(), 2);
            assert_eq!(runs[0].id(), second.id());
        });
    }

    #[test]
    fn test_failed_run_keeps_snapshot() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let good = RunHandle::start(target()).succeed(1, StrategyId::SearchIndex);
            store.replace_snapshot(&good, &[listing("a")]).await.unwrap();

            let failed = RunHandle::start(target()).fail(FailureCause::EmptyNoData);
            let err = store.replace_snapshot(&failed, &[]).await.unwrap_err();
            assert!(matches!(err, StoreError::FailedRunRejected { .. }));

            store.record_run(&failed).await.unwrap();
            let snapshot = store.snapshot(&target()).await.unwrap().unwrap();
            assert_eq!(&snapshot.run_id, good.id());

            let runs = store.runs(&target()).await.unwrap();
            assert_eq!(runs[0].status(), RunStatus::Failed);
        });
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let run = RunHandle::start(target()).succeed(2, StrategyId::PaginatedRest);
            let err = store
                .replace_snapshot(&run, &[listing("a"), listing("a")])
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::DuplicateListing { .. }));
            assert!(store.snapshot(&target()).await.unwrap().is_none());
        });
    }
}
