//! Run orchestrator for scraping targets.
//!
//! This module provides the `ScrapeOrchestrator` which turns a target into a
//! finalized [`ScrapeRun`]: it walks the target's fallback chain under a
//! wall-clock budget, then hands the run and its listings to the snapshot
//! store.

use crate::error::Result;
use crate::resilience::{ResilienceLayer, Resolution, StrategyAttempt};
use canopy_adapters::FetchBudget;
use canopy_core::{
    AvailabilityDelta, FailureCause, RunHandle, RunStatus, ScrapeRun, ScrapingConfig,
    SnapshotStore, Target, TargetId, TargetRegistry,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Per-run limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Absolute page / scroll-iteration bound per strategy
    pub max_pages: u32,
    /// Wall-clock budget for the whole chain
    pub timeout: Duration,
    /// Whether partial runs replace the stored snapshot
    pub accept_partial: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&ScrapingConfig::default())
    }
}

impl RunOptions {
    /// Options taken from the scraping section of the configuration.
    #[must_use]
    pub fn from_config(config: &ScrapingConfig) -> Self {
        Self {
            max_pages: config.default_max_pages,
            timeout: config.run_timeout(),
            accept_partial: config.accept_partial,
        }
    }

    /// Override the page bound.
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Override the wall-clock budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether partial runs replace the stored snapshot.
    #[must_use]
    pub fn with_accept_partial(mut self, accept_partial: bool) -> Self {
        self.accept_partial = accept_partial;
        self
    }
}

/// Result of one target run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The finalized run
    pub run: ScrapeRun,
    /// Availability change, when the snapshot was replaced
    pub delta: Option<AvailabilityDelta>,
    /// Strategy attempts in order
    pub attempts: Vec<StrategyAttempt>,
}

impl RunReport {
    /// Whether the stored snapshot was replaced by this run.
    #[must_use]
    pub fn replaced_snapshot(&self) -> bool {
        self.delta.is_some()
    }
}

/// Orchestrates scrape runs across targets.
pub struct ScrapeOrchestrator {
    /// Target definitions
    registry: Arc<TargetRegistry>,
    /// Fallback chains and identity control
    resilience: Arc<ResilienceLayer>,
    /// Run headers and snapshots
    store: Arc<dyn SnapshotStore>,
    /// Per-run limits
    options: RunOptions,
    /// Maximum concurrent runs
    max_concurrent_runs: usize,
}

impl ScrapeOrchestrator {
    /// Create a new orchestrator with default run options.
    #[must_use]
    pub fn new(
        registry: Arc<TargetRegistry>,
        resilience: Arc<ResilienceLayer>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            registry,
            resilience,
            store,
            options: RunOptions::default(),
            max_concurrent_runs: 4,
        }
    }

    /// Set the per-run limits.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the maximum number of concurrent runs.
    #[must_use]
    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max.max(1);
        self
    }

    /// Per-run limits in effect.
    #[must_use]
    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Run a registered target.
    pub async fn run_one(&self, target_id: &TargetId) -> Result<RunReport> {
        let target = self.registry.get(target_id)?;
        self.run_target(&target).await
    }

    /// Run a target and persist the outcome.
    ///
    /// A failed run is recorded without touching the stored snapshot. A
    /// partial run replaces it only when partial results are accepted.
    pub async fn run_target(&self, target: &Target) -> Result<RunReport> {
        let handle = RunHandle::start(target.id.clone());
        info!(target_id = %target.id, run_id = %handle.id(), family = %target.family, "starting run");

        let budget = FetchBudget::new(self.options.max_pages);
        let chain = tokio::time::timeout(
            self.options.timeout,
            self.resilience.run_chain(target, budget),
        )
        .await;

        let (run, listings, attempts) = match chain {
            Ok(outcome) => {
                let attempts = outcome.attempts;
                match outcome.resolution {
                    Resolution::Success { strategy, listings } => {
                        (handle.succeed(listings.len(), strategy), listings, attempts)
                    }
                    Resolution::Partial {
                        strategy,
                        listings,
                        cause,
                    } => (handle.partial(listings.len(), strategy, cause), listings, attempts),
                    Resolution::Failed(cause) => (handle.fail(cause), Vec::new(), attempts),
                }
            }
            Err(_) => {
                let after_ms = u64::try_from(self.options.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(target_id = %target.id, after_ms, "run timed out");
                (
                    handle.fail(FailureCause::TimedOut { after_ms }),
                    Vec::new(),
                    Vec::new(),
                )
            }
        };

        let replace = match run.status() {
            RunStatus::Success => true,
            RunStatus::Partial => self.options.accept_partial,
            RunStatus::Failed => false,
        };

        let delta = if replace {
            let delta = self.store.replace_snapshot(&run, &listings).await?;
            info!(
                target_id = %target.id,
                run_id = %run.id(),
                status = %run.status(),
                count = run.listing_count(),
                appeared = delta.appeared.len(),
                disappeared = delta.disappeared.len(),
                "snapshot replaced"
            );
            Some(delta)
        } else {
            self.store.record_run(&run).await?;
            match run.failure() {
                Some(cause) if run.is_failed() => {
                    warn!(target_id = %target.id, run_id = %run.id(), cause = %cause, "run failed, snapshot kept");
                }
                _ => {
                    info!(target_id = %target.id, run_id = %run.id(), count = run.listing_count(), "partial run recorded, snapshot kept");
                }
            }
            None
        };

        Ok(RunReport {
            run,
            delta,
            attempts,
        })
    }

    /// Run several targets concurrently, up to `max_concurrent_runs` at once.
    ///
    /// Results are returned in the order the ids were given.
    pub async fn run_many(&self, target_ids: Vec<TargetId>) -> Vec<Result<RunReport>> {
        let mut futures = FuturesUnordered::new();
        let mut results: Vec<Option<Result<RunReport>>> =
            std::iter::repeat_with(|| None).take(target_ids.len()).collect();

        for (index, target_id) in target_ids.into_iter().enumerate() {
            futures.push(async move { (index, self.run_one(&target_id).await) });

            // Respect concurrency limit
            while futures.len() >= self.max_concurrent_runs {
                if let Some((index, result)) = futures.next().await {
                    results[index] = Some(result);
                }
            }
        }

        // Collect remaining results
        while let Some((index, result)) = futures.next().await {
            results[index] = Some(result);
        }

        results
            .into_iter()
            .flatten()
            .inspect(|result| {
                if let Err(e) = result {
                    error!("Run failed to finalize: {}", e);
                }
            })
            .collect()
    }

    /// Run every registered target.
    pub async fn run_all(&self) -> Vec<Result<RunReport>> {
        let ids = self
            .registry
            .all()
            .into_iter()
            .map(|target| target.id)
            .collect();
        self.run_many(ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_from_config() {
        let config = ScrapingConfig {
            default_max_pages: 12,
            run_timeout_secs: 30,
            accept_partial: true,
            ..ScrapingConfig::default()
        };
        let options = RunOptions::from_config(&config);
        assert_eq!(options.max_pages, 12);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.accept_partial);

        let options = options.with_max_pages(3).with_accept_partial(false);
        assert_eq!(options.max_pages, 3);
        assert!(!options.accept_partial);
    }

    #[test]
    fn test_default_options() {
        let options = RunOptions::default();
        assert_eq!(options.max_pages, 100);
        assert_eq!(options.timeout, Duration::from_secs(900));
        // Partial runs never replace a snapshot unless asked to
        assert!(!options.accept_partial);
    }
}
