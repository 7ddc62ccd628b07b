//! Integration tests for fallback chains and run finalization.

use canopy_adapters::{
    AdapterSet, AdapterStep, AdapterSummary, CatalogAdapter, FetchBudget, IdentityController,
    ListingStream,
};
use canopy_core::{
    AdapterOutcome, BackendFamily, CanonicalListing, CanopyError, Category, Confidence,
    FailureCause, MenuType, RunHandle, RunStatus, SnapshotStore, StoreError, StrategyId, Target,
    TargetId, TargetRegistry,
};
use canopy_pipeline::{
    MemoryStore, PipelineError, ResilienceLayer, RunOptions, ScrapeOrchestrator,
};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn listing(id: &str) -> CanonicalListing {
    CanonicalListing {
        provider_item_id: id.to_string(),
        name: format!("Product {id}"),
        brand: "House".to_string(),
        category: Category::Flower,
        subcategory: None,
        price: 30.0,
        discount_price: None,
        discount_text: None,
        description: None,
        size_spec: None,
        menu_type: MenuType::Recreational,
        confidence: Confidence::Mapped,
        raw_payload: json!({"id": id}),
    }
}

fn listings(prefix: &str, count: usize) -> Vec<CanonicalListing> {
    (0..count).map(|i| listing(&format!("{prefix}-{i}"))).collect()
}

/// Adapter that replays a fixed result.
struct FakeAdapter {
    strategy: StrategyId,
    outcome: AdapterOutcome,
    listings: Vec<CanonicalListing>,
    truncated: bool,
    applies: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeAdapter {
    fn new(strategy: StrategyId, outcome: AdapterOutcome, listings: Vec<CanonicalListing>) -> Self {
        Self {
            strategy,
            outcome,
            listings,
            truncated: false,
            applies: true,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn empty(strategy: StrategyId) -> Self {
        Self::new(strategy, AdapterOutcome::EmptyNoData, Vec::new())
    }

    fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    fn inapplicable(mut self) -> Self {
        self.applies = false;
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CatalogAdapter for FakeAdapter {
    fn strategy(&self) -> StrategyId {
        self.strategy
    }

    fn applies_to(&self, _target: &Target) -> bool {
        self.applies
    }

    fn fetch(&self, _target: &Target, _budget: FetchBudget) -> ListingStream {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut steps: Vec<AdapterStep> = self
            .listings
            .iter()
            .cloned()
            .map(AdapterStep::Listing)
            .collect();
        steps.push(AdapterStep::Finished(AdapterSummary {
            outcome: self.outcome.clone(),
            pages: 1,
            truncated: self.truncated,
            listings: self.listings.len(),
        }));

        let delay = self.delay.unwrap_or_default();
        ListingStream::new(
            stream::once(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            })
            .flat_map(move |()| stream::iter(steps.clone())),
        )
    }
}

struct Harness {
    orchestrator: ScrapeOrchestrator,
    store: Arc<MemoryStore>,
    resilience: Arc<ResilienceLayer>,
}

fn harness(family: BackendFamily, adapters: &[Arc<FakeAdapter>]) -> Harness {
    let set = adapters
        .iter()
        .fold(AdapterSet::default(), |set, adapter| {
            set.with(adapter.clone() as Arc<dyn CatalogAdapter>)
        });
    let resilience = Arc::new(ResilienceLayer::new(
        set,
        Arc::new(IdentityController::unpaced()),
    ));
    let registry = TargetRegistry::new();
    registry.insert(Target::new(store_id(), family));
    let store = Arc::new(MemoryStore::new());

    let orchestrator = ScrapeOrchestrator::new(
        Arc::new(registry),
        resilience.clone(),
        store.clone() as Arc<dyn SnapshotStore>,
    );
    Harness {
        orchestrator,
        store,
        resilience,
    }
}

fn store_id() -> TargetId {
    TargetId::new("green-leaf-downtown").unwrap()
}

async fn seed_snapshot(store: &MemoryStore, count: usize) {
    let run = RunHandle::start(store_id()).succeed(count, StrategyId::PaginatedRest);
    store
        .replace_snapshot(&run, &listings("seed", count))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_falls_back_once_and_stops_at_first_success() {
    let rest = Arc::new(FakeAdapter::empty(StrategyId::PaginatedRest));
    let index = Arc::new(FakeAdapter::new(
        StrategyId::SearchIndex,
        AdapterOutcome::Complete,
        listings("idx", 40),
    ));
    let browser = Arc::new(FakeAdapter::empty(StrategyId::BrowserInterception));
    let h = harness(
        BackendFamily::RestCatalog,
        &[rest.clone(), index.clone(), browser.clone()],
    );

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Success);
    assert_eq!(report.run.winning_strategy(), Some(StrategyId::SearchIndex));
    assert_eq!(report.run.listing_count(), 40);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].outcome, AdapterOutcome::EmptyNoData);
    assert_eq!((rest.calls(), index.calls(), browser.calls()), (1, 1, 0));

    let delta = report.delta.unwrap();
    assert_eq!(delta.appeared.len(), 40);
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 40);
}

#[tokio::test]
async fn test_auth_expired_aborts_chain_and_keeps_snapshot() {
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::AuthExpired {
            reason: "age gate persisted".to_string(),
        },
        Vec::new(),
    ));
    let index = Arc::new(FakeAdapter::new(
        StrategyId::SearchIndex,
        AdapterOutcome::Complete,
        listings("idx", 5),
    ));
    let h = harness(BackendFamily::RestCatalog, &[rest.clone(), index.clone()]);
    seed_snapshot(&h.store, 12).await;

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert!(report.run.is_failed());
    assert!(matches!(
        report.run.failure(),
        Some(FailureCause::AuthExpired { .. })
    ));
    assert_eq!(index.calls(), 0);
    assert!(!report.replaced_snapshot());

    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 12);

    let runs = h.store.runs(&store_id()).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id(), report.run.id());
    assert_eq!(runs[0].status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_all_empty_is_failed_and_non_destructive() {
    let graph = Arc::new(FakeAdapter::empty(StrategyId::PersistedQueryGraph));
    let browser = Arc::new(FakeAdapter::empty(StrategyId::BrowserInterception));
    let h = harness(BackendFamily::GraphCatalog, &[graph, browser]);
    seed_snapshot(&h.store, 3).await;

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Failed);
    assert_eq!(report.run.failure(), Some(&FailureCause::EmptyNoData));
    assert_eq!(report.run.listing_count(), 0);
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 3);
}

#[tokio::test]
async fn test_blocked_rotates_identity_before_fallback() {
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::BlockedOrChallenged {
            reason: "cloudflare".to_string(),
        },
        Vec::new(),
    ));
    let index = Arc::new(FakeAdapter::new(
        StrategyId::SearchIndex,
        AdapterOutcome::Complete,
        listings("idx", 10),
    ));
    let h = harness(BackendFamily::RestCatalog, &[rest, index]);

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Success);
    let controller = h.resilience.controller();
    assert_eq!(controller.rotations(), 1);
    assert_eq!(controller.current_identity(BackendFamily::RestCatalog).generation, 1);
    assert_eq!(controller.current_identity(BackendFamily::GraphCatalog).generation, 0);
}

#[tokio::test]
async fn test_plain_transport_error_does_not_rotate() {
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::TransportError {
            reason: "connection reset".to_string(),
            likely_blocking: false,
        },
        Vec::new(),
    ));
    let index = Arc::new(FakeAdapter::empty(StrategyId::SearchIndex));
    let h = harness(BackendFamily::RestCatalog, &[rest, index]);

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.failure(), Some(&FailureCause::EmptyNoData));
    assert_eq!(h.resilience.controller().rotations(), 0);
}

#[tokio::test]
async fn test_largest_interrupted_result_becomes_partial() {
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::TransportError {
            reason: "HTTP 502".to_string(),
            likely_blocking: false,
        },
        listings("rest", 30),
    ));
    let index = Arc::new(FakeAdapter::empty(StrategyId::SearchIndex));
    let browser = Arc::new(FakeAdapter::new(
        StrategyId::BrowserInterception,
        AdapterOutcome::TransportError {
            reason: "page crashed".to_string(),
            likely_blocking: false,
        },
        listings("web", 10),
    ));
    let h = harness(BackendFamily::RestCatalog, &[rest, index, browser.clone()]);
    seed_snapshot(&h.store, 500).await;

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Partial);
    assert_eq!(report.run.winning_strategy(), Some(StrategyId::PaginatedRest));
    assert_eq!(report.run.listing_count(), 30);
    assert!(matches!(
        report.run.failure(),
        Some(FailureCause::TransportError { .. })
    ));
    assert_eq!(browser.calls(), 1);

    // Partial results are not accepted by default
    assert!(!report.replaced_snapshot());
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 500);
}

#[tokio::test]
async fn test_accepted_partial_replaces_snapshot() {
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::TransportError {
            reason: "HTTP 502".to_string(),
            likely_blocking: false,
        },
        listings("rest", 30),
    ));
    let index = Arc::new(FakeAdapter::empty(StrategyId::SearchIndex));
    let h = harness(BackendFamily::RestCatalog, &[rest, index]);
    seed_snapshot(&h.store, 500).await;
    let orchestrator = h
        .orchestrator
        .with_options(RunOptions::default().with_accept_partial(true));

    let report = orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Partial);
    assert!(report.replaced_snapshot());
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 30);
}

#[tokio::test]
async fn test_last_strategy_blocked_fails_despite_earlier_fragment() {
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::TransportError {
            reason: "HTTP 502".to_string(),
            likely_blocking: false,
        },
        listings("rest", 30),
    ));
    let index = Arc::new(FakeAdapter::empty(StrategyId::SearchIndex));
    let browser = Arc::new(FakeAdapter::new(
        StrategyId::BrowserInterception,
        AdapterOutcome::BlockedOrChallenged {
            reason: "cloudflare challenge".to_string(),
        },
        Vec::new(),
    ));
    let h = harness(BackendFamily::RestCatalog, &[rest, index, browser.clone()]);
    seed_snapshot(&h.store, 500).await;
    // Even with partial results accepted, a final block fails the run
    let orchestrator = h
        .orchestrator
        .with_options(RunOptions::default().with_accept_partial(true));

    let report = orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Failed);
    assert!(matches!(
        report.run.failure(),
        Some(FailureCause::BlockedOrChallenged { .. })
    ));
    assert_eq!(report.run.listing_count(), 0);
    assert_eq!(browser.calls(), 1);
    assert!(!report.replaced_snapshot());
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 500);
}

#[tokio::test]
async fn test_partial_not_accepted_keeps_snapshot() {
    let rest = Arc::new(
        FakeAdapter::new(
            StrategyId::PaginatedRest,
            AdapterOutcome::Complete,
            listings("rest", 50),
        )
        .truncated(),
    );
    let index = Arc::new(FakeAdapter::empty(StrategyId::SearchIndex));
    let h = harness(BackendFamily::RestCatalog, &[rest, index.clone()]);
    seed_snapshot(&h.store, 7).await;
    let orchestrator = h
        .orchestrator
        .with_options(RunOptions::default().with_accept_partial(false));

    let report = orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(report.run.status(), RunStatus::Partial);
    assert_eq!(report.run.failure(), None);
    assert_eq!(index.calls(), 0);
    assert!(!report.replaced_snapshot());
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_run_timeout_fails_without_touching_snapshot() {
    let rest = Arc::new(
        FakeAdapter::new(
            StrategyId::PaginatedRest,
            AdapterOutcome::Complete,
            listings("rest", 5),
        )
        .delayed(Duration::from_secs(60)),
    );
    let h = harness(BackendFamily::RestCatalog, &[rest]);
    seed_snapshot(&h.store, 2).await;
    let orchestrator = h
        .orchestrator
        .with_options(RunOptions::default().with_timeout(Duration::from_secs(5)));

    let report = orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(
        report.run.failure(),
        Some(&FailureCause::TimedOut { after_ms: 5000 })
    );
    let snapshot = h.store.snapshot(&store_id()).await.unwrap().unwrap();
    assert_eq!(snapshot.listings.len(), 2);
}

#[tokio::test]
async fn test_no_applicable_strategy() {
    let browser = Arc::new(FakeAdapter::empty(StrategyId::BrowserInterception).inapplicable());
    let h = harness(BackendFamily::RenderedCatalog, &[browser.clone()]);

    let report = h.orchestrator.run_one(&store_id()).await.unwrap();

    assert_eq!(
        report.run.failure(),
        Some(&FailureCause::NoApplicableStrategy)
    );
    assert_eq!(browser.calls(), 0);
}

#[tokio::test]
async fn test_duplicate_ids_surface_as_store_error() {
    let mut batch = listings("rest", 3);
    batch.push(listing("rest-0"));
    let rest = Arc::new(FakeAdapter::new(
        StrategyId::PaginatedRest,
        AdapterOutcome::Complete,
        batch,
    ));
    let h = harness(BackendFamily::RestCatalog, &[rest]);

    let err = h.orchestrator.run_one(&store_id()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Store(StoreError::DuplicateListing { .. })
    ));
    assert!(h.store.snapshot(&store_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_run_many_keeps_input_order() {
    let graph = Arc::new(FakeAdapter::new(
        StrategyId::PersistedQueryGraph,
        AdapterOutcome::Complete,
        listings("g", 4),
    ));
    let h = harness(BackendFamily::GraphCatalog, &[graph.clone()]);
    let orchestrator = h.orchestrator.with_max_concurrent_runs(1);

    let missing = TargetId::new("closed-store").unwrap();
    let results = orchestrator
        .run_many(vec![missing.clone(), store_id(), missing])
        .await;

    assert_eq!(results.len(), 3);
    assert!(matches!(
        &results[0],
        Err(PipelineError::Core(CanopyError::TargetNotFound { .. }))
    ));
    assert_eq!(results[1].as_ref().unwrap().run.listing_count(), 4);
    assert!(results[2].is_err());
    assert_eq!(graph.calls(), 1);
}

#[tokio::test]
async fn test_run_all() {
    let graph = Arc::new(FakeAdapter::new(
        StrategyId::PersistedQueryGraph,
        AdapterOutcome::Complete,
        listings("g", 2),
    ));
    let h = harness(BackendFamily::GraphCatalog, &[graph]);

    let results = h.orchestrator.run_all().await;
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].as_ref().unwrap().run.status(),
        RunStatus::Success
    );
}
