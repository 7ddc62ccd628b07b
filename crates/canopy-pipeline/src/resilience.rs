//! Fallback chains.
//!
//! A target's backend family selects an ordered chain of strategies. Each
//! applicable strategy is attempted at most once, in order, until one
//! enumerates the catalog.

use canopy_adapters::{AdapterSet, CatalogAdapter, FetchBudget, IdentityController};
use canopy_core::{AdapterOutcome, CanonicalListing, FailureCause, StrategyId, Target};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one strategy attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    /// Strategy attempted
    pub strategy: StrategyId,
    /// Terminal outcome
    pub outcome: AdapterOutcome,
    /// Listings produced
    pub listings: usize,
    /// Pages walked
    pub pages: u32,
    /// Whether the page bound cut the walk short
    pub truncated: bool,
}

/// How a chain ended.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A strategy enumerated the full catalog
    Success {
        /// Winning strategy
        strategy: StrategyId,
        /// Its listings
        listings: Vec<CanonicalListing>,
    },
    /// The best result available is incomplete
    Partial {
        /// Strategy that produced the listings
        strategy: StrategyId,
        /// Its listings
        listings: Vec<CanonicalListing>,
        /// What cut it short, when it was a failure rather than the page bound
        cause: Option<FailureCause>,
    },
    /// No usable result
    Failed(FailureCause),
}

/// Result of walking a chain.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Terminal resolution
    pub resolution: Resolution,
    /// Attempts in the order they were made
    pub attempts: Vec<StrategyAttempt>,
}

/// Best incomplete result seen so far.
struct PartialCandidate {
    strategy: StrategyId,
    listings: Vec<CanonicalListing>,
    outcome: AdapterOutcome,
}

/// Orders adapters into fallback chains and decides when to escalate.
#[derive(Debug, Clone)]
pub struct ResilienceLayer {
    adapters: AdapterSet,
    controller: Arc<IdentityController>,
}

impl ResilienceLayer {
    /// Create a resilience layer over a set of adapters.
    #[must_use]
    pub fn new(adapters: AdapterSet, controller: Arc<IdentityController>) -> Self {
        Self {
            adapters,
            controller,
        }
    }

    /// Shared identity controller.
    #[must_use]
    pub fn controller(&self) -> &Arc<IdentityController> {
        &self.controller
    }

    /// Applicable adapters for a target, in fallback order.
    ///
    /// Strategies whose connection parameters are missing on the target are
    /// left out.
    #[must_use]
    pub fn chain_for(&self, target: &Target) -> Vec<Arc<dyn CatalogAdapter>> {
        target
            .family
            .strategy_chain()
            .iter()
            .filter_map(|strategy| {
                let Some(adapter) = self.adapters.get(*strategy) else {
                    debug!(target_id = %target.id, strategy = %strategy, "no adapter registered, skipping");
                    return None;
                };
                if adapter.applies_to(target) {
                    Some(adapter)
                } else {
                    debug!(target_id = %target.id, strategy = %strategy, "missing connection parameters, skipping");
                    None
                }
            })
            .collect()
    }

    /// Walk the target's chain.
    pub async fn run_chain(&self, target: &Target, budget: FetchBudget) -> ChainOutcome {
        let chain = self.chain_for(target);
        if chain.is_empty() {
            warn!(target_id = %target.id, family = %target.family, "no applicable strategy");
            return ChainOutcome {
                resolution: Resolution::Failed(FailureCause::NoApplicableStrategy),
                attempts: Vec::new(),
            };
        }

        let mut attempts = Vec::with_capacity(chain.len());
        let mut best: Option<PartialCandidate> = None;
        let mut last_outcome = AdapterOutcome::EmptyNoData;

        for adapter in chain {
            let strategy = adapter.strategy();
            info!(target_id = %target.id, strategy = %strategy, "attempting strategy");

            let (listings, summary) = adapter.fetch(target, budget).collect_all().await;
            let outcome = match summary.outcome {
                AdapterOutcome::Complete if listings.is_empty() => AdapterOutcome::EmptyNoData,
                other => other,
            };
            attempts.push(StrategyAttempt {
                strategy,
                outcome: outcome.clone(),
                listings: listings.len(),
                pages: summary.pages,
                truncated: summary.truncated,
            });

            match &outcome {
                AdapterOutcome::Complete if summary.truncated => {
                    warn!(target_id = %target.id, strategy = %strategy, count = listings.len(), "page bound reached, run is partial");
                    return ChainOutcome {
                        resolution: Resolution::Partial {
                            strategy,
                            listings,
                            cause: None,
                        },
                        attempts,
                    };
                }
                AdapterOutcome::Complete => {
                    return ChainOutcome {
                        resolution: Resolution::Success { strategy, listings },
                        attempts,
                    };
                }
                AdapterOutcome::AuthExpired { reason } => {
                    warn!(target_id = %target.id, strategy = %strategy, reason = %reason, "session material rejected, aborting chain");
                    return ChainOutcome {
                        resolution: Resolution::Failed(FailureCause::AuthExpired {
                            reason: reason.clone(),
                        }),
                        attempts,
                    };
                }
                _ => {}
            }

            info!(target_id = %target.id, strategy = %strategy, outcome = %outcome, count = listings.len(), "strategy failed, falling back");

            if outcome.forces_rotation() {
                let identity = self.controller.rotate(target.family);
                debug!(target_id = %target.id, family = %target.family, generation = identity.generation, "rotated identity");
            }

            if !listings.is_empty() && best.as_ref().map_or(true, |b| listings.len() > b.listings.len()) {
                best = Some(PartialCandidate {
                    strategy,
                    listings,
                    outcome: outcome.clone(),
                });
            }
            last_outcome = outcome;
        }

        // A block on the final strategy fails the run, whatever came before
        let last_blocked = matches!(last_outcome, AdapterOutcome::BlockedOrChallenged { .. });
        if last_blocked && best.is_some() {
            warn!(target_id = %target.id, "last strategy blocked, discarding partial result");
        }
        let resolution = match best {
            Some(candidate) if !last_blocked => Resolution::Partial {
                strategy: candidate.strategy,
                listings: candidate.listings,
                cause: FailureCause::from_outcome(&candidate.outcome),
            },
            _ => Resolution::Failed(
                FailureCause::from_outcome(&last_outcome).unwrap_or(FailureCause::EmptyNoData),
            ),
        };
        ChainOutcome {
            resolution,
            attempts,
        }
    }
}
