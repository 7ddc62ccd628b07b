//! Snapshot storage contract.
//!
//! Storage keeps, per target, the listings of the last non-failed run plus a
//! history of run headers. Replacing a snapshot with the output of a failed
//! run is rejected.

use crate::{
    listing::CanonicalListing,
    run::ScrapeRun,
    types::{RunId, TargetId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised by snapshot stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A failed run was offered as a snapshot replacement
    #[error("run {run_id} failed and cannot replace the stored snapshot")]
    FailedRunRejected {
        /// The rejected run
        run_id: String,
    },

    /// Two listings in one batch share a provider item id
    #[error("duplicate provider item id '{provider_item_id}' in run {run_id}")]
    DuplicateListing {
        /// The run being stored
        run_id: String,
        /// The duplicated id
        provider_item_id: String,
    },

    /// Backend-specific failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Listings stored for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Target the listings belong to
    pub target_id: TargetId,
    /// Run that produced them
    pub run_id: RunId,
    /// When the snapshot was written
    pub replaced_at: DateTime<Utc>,
    /// The listings
    pub listings: Vec<CanonicalListing>,
}

/// Which provider items appeared or disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityDelta {
    /// Ids present now but not before, sorted
    pub appeared: Vec<String>,
    /// Ids present before but not now, sorted
    pub disappeared: Vec<String>,
    /// Number of ids present in both
    pub retained: usize,
}

impl AvailabilityDelta {
    /// Compare the provider item ids of a prior and a new snapshot.
    #[must_use]
    pub fn between<'a, P, N>(prior: P, next: N) -> Self
    where
        P: IntoIterator<Item = &'a str>,
        N: IntoIterator<Item = &'a str>,
    {
        let prior: HashSet<&str> = prior.into_iter().collect();
        let next: HashSet<&str> = next.into_iter().collect();

        let mut appeared: Vec<String> = next
            .difference(&prior)
            .map(|id| (*id).to_string())
            .collect();
        let mut disappeared: Vec<String> = prior
            .difference(&next)
            .map(|id| (*id).to_string())
            .collect();
        appeared.sort();
        disappeared.sort();

        Self {
            appeared,
            disappeared,
            retained: prior.intersection(&next).count(),
        }
    }
}

/// Storage collaborator receiving run headers and listing batches.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Record a run header without touching the target's snapshot.
    async fn record_run(&self, run: &ScrapeRun) -> Result<(), StoreError>;

    /// Record a run header and atomically replace the target's snapshot.
    ///
    /// Implementations must reject failed runs with
    /// [`StoreError::FailedRunRejected`] and leave the prior snapshot intact.
    async fn replace_snapshot(
        &self,
        run: &ScrapeRun,
        listings: &[CanonicalListing],
    ) -> Result<AvailabilityDelta, StoreError>;

    /// Current snapshot for a target.
    async fn snapshot(&self, target_id: &TargetId) -> Result<Option<Snapshot>, StoreError>;

    /// Run headers for a target, most recent first.
    async fn runs(&self, target_id: &TargetId) -> Result<Vec<ScrapeRun>, StoreError>;
}

/// Reject failed runs and duplicate ids before a snapshot replacement.
///
/// # Errors
/// Returns [`StoreError::FailedRunRejected`] or [`StoreError::DuplicateListing`].
pub fn check_replaceable(run: &ScrapeRun, listings: &[CanonicalListing]) -> Result<(), StoreError> {
    if run.is_failed() {
        return Err(StoreError::FailedRunRejected {
            run_id: run.id().to_string(),
        });
    }

    let mut seen = HashSet::with_capacity(listings.len());
    for listing in listings {
        if !seen.insert(listing.provider_item_id.as_str()) {
            return Err(StoreError::DuplicateListing {
                run_id: run.id().to_string(),
                provider_item_id: listing.provider_item_id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{FailureCause, RunHandle};
    use crate::types::StrategyId;

    #[test]
    fn test_delta_between() {
        let delta = AvailabilityDelta::between(["a", "b", "c"], ["b", "c", "d", "e"]);
        assert_eq!(delta.appeared, vec!["d", "e"]);
        assert_eq!(delta.disappeared, vec!["a"]);
        assert_eq!(delta.retained, 2);
    }

    #[test]
    fn test_delta_from_empty() {
        let delta = AvailabilityDelta::between(std::iter::empty(), ["x"]);
        assert_eq!(delta.appeared, vec!["x"]);
        assert!(delta.disappeared.is_empty());
        assert_eq!(delta.retained, 0);
    }

    #[test]
    fn test_failed_run_not_replaceable() {
        let target = TargetId::new("some-target").expect("valid id");
        let run = RunHandle::start(target).fail(FailureCause::EmptyNoData);
        assert!(matches!(
            check_replaceable(&run, &[]),
            Err(StoreError::FailedRunRejected { .. })
        ));
    }

    #[test]
    fn test_success_run_replaceable() {
        let target = TargetId::new("some-target").expect("valid id");
        let run = RunHandle::start(target).succeed(0, StrategyId::PaginatedRest);
        assert!(check_replaceable(&run, &[]).is_ok());
    }
}
