//! The adapter contract shared by every protocol strategy.

use crate::controller::IdentityController;
use crate::paging::{FetchBudget, SeenIds};
use crate::session::{SessionMaterial, SessionSource};
use crate::transport::{classify_failure, classify_response, detect_challenge, HttpRequest, Transport};
use canopy_browser::BrowserDriver;
use canopy_core::{AdapterOutcome, BrowserConfig, CanonicalListing, StrategyId, Target, TargetId};
use canopy_normalize::Normalizer;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

/// How an adapter invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    /// Terminal outcome
    pub outcome: AdapterOutcome,
    /// Pages (or scroll iterations) walked
    pub pages: u32,
    /// Whether the walk was cut short by the absolute bound
    pub truncated: bool,
    /// Listings produced
    pub listings: usize,
}

impl AdapterSummary {
    /// Summary of an invocation that ended before walking any page.
    #[must_use]
    pub fn immediate(outcome: AdapterOutcome) -> Self {
        Self {
            outcome,
            pages: 0,
            truncated: false,
            listings: 0,
        }
    }
}

/// One element of an adapter's output.
#[derive(Debug, Clone)]
pub enum AdapterStep {
    /// A normalized listing
    Listing(CanonicalListing),
    /// The walk is over; always the last element
    Finished(AdapterSummary),
}

/// Lazy stream of listings followed by a summary.
///
/// Pages are fetched only as the stream is polled; dropping it stops the walk.
pub struct ListingStream {
    inner: Pin<Box<dyn Stream<Item = AdapterStep> + Send>>,
    summary: Option<AdapterSummary>,
}

impl ListingStream {
    /// Wrap a step stream.
    pub fn new(inner: impl Stream<Item = AdapterStep> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(inner),
            summary: None,
        }
    }

    /// A stream that yields nothing and ends with `outcome`.
    #[must_use]
    pub fn finished(outcome: AdapterOutcome) -> Self {
        Self::new(futures::stream::iter([AdapterStep::Finished(
            AdapterSummary::immediate(outcome),
        )]))
    }

    /// Next listing, or `None` once the walk is over.
    pub async fn next(&mut self) -> Option<CanonicalListing> {
        if self.summary.is_some() {
            return None;
        }
        match self.inner.next().await {
            Some(AdapterStep::Listing(listing)) => Some(listing),
            Some(AdapterStep::Finished(summary)) => {
                self.summary = Some(summary);
                None
            }
            None => {
                self.summary = Some(AdapterSummary::immediate(AdapterOutcome::TransportError {
                    reason: "adapter ended without an outcome".to_string(),
                    likely_blocking: false,
                }));
                None
            }
        }
    }

    /// Summary, available once [`next`](Self::next) has returned `None`.
    #[must_use]
    pub fn summary(&self) -> Option<&AdapterSummary> {
        self.summary.as_ref()
    }

    /// Drain the stream.
    pub async fn collect_all(mut self) -> (Vec<CanonicalListing>, AdapterSummary) {
        let mut listings = Vec::new();
        while let Some(listing) = self.next().await {
            listings.push(listing);
        }
        let summary = self
            .summary
            .take()
            .unwrap_or_else(|| AdapterSummary::immediate(AdapterOutcome::EmptyNoData));
        (listings, summary)
    }
}

impl fmt::Debug for ListingStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingStream")
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// A protocol strategy for obtaining a target's catalog.
pub trait CatalogAdapter: Send + Sync {
    /// Strategy implemented by this adapter
    fn strategy(&self) -> StrategyId;

    /// Whether the target carries the connection parameters this strategy needs
    fn applies_to(&self, target: &Target) -> bool;

    /// Start a lazy walk of the target's catalog.
    fn fetch(&self, target: &Target, budget: FetchBudget) -> ListingStream;
}

/// Collaborators handed to every adapter.
#[derive(Clone)]
pub struct AdapterContext {
    /// Shared rate and identity controller
    pub controller: Arc<IdentityController>,
    /// HTTP transport
    pub transport: Arc<dyn Transport>,
    /// Browser driver
    pub browser: Arc<dyn BrowserDriver>,
    /// Session material source
    pub sessions: Arc<dyn SessionSource>,
    /// Browser behaviour
    pub browser_config: Arc<BrowserConfig>,
}

impl fmt::Debug for AdapterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterContext")
            .field("controller", &self.controller)
            .field("browser_config", &self.browser_config)
            .finish_non_exhaustive()
    }
}

impl AdapterContext {
    /// Load the target's session material, if it references any.
    ///
    /// Missing or expired material is `AuthExpired`.
    pub(crate) async fn session_for(
        &self,
        target: &Target,
    ) -> Result<Option<SessionMaterial>, AdapterOutcome> {
        let Some(reference) = target.params.session_ref.as_deref() else {
            return Ok(None);
        };
        self.sessions
            .load(reference)
            .await
            .map(Some)
            .map_err(|e| AdapterOutcome::AuthExpired {
                reason: e.to_string(),
            })
    }

    /// Paced request under the current identity.
    ///
    /// Returns the body of a usable response, or the outcome the failure
    /// represents.
    pub(crate) async fn request(
        &self,
        target: &Target,
        mut request: HttpRequest,
        session: Option<&SessionMaterial>,
    ) -> Result<String, AdapterOutcome> {
        for (key, value) in &target.params.headers {
            request = request.header(key.clone(), value.clone());
        }
        if let Some(session) = session {
            request = request.header("cookie", session.cookie_header());
        }

        self.controller.wait(target.family).await;
        let identity = self.controller.current_identity(target.family);
        let url = request.url.clone();

        let response = self
            .transport
            .send(request, &identity)
            .await
            .map_err(|e| classify_failure(&e))?;

        if let Some(outcome) = classify_response(&response, session.is_some()) {
            debug!(target_id = %target.id, url = %url, status = response.status, outcome = %outcome, "request rejected");
            return Err(outcome);
        }
        Ok(response.body)
    }

    /// Paced request whose body must be JSON.
    pub(crate) async fn request_json(
        &self,
        target: &Target,
        request: HttpRequest,
        session: Option<&SessionMaterial>,
    ) -> Result<Value, AdapterOutcome> {
        let body = self.request(target, request, session).await?;
        serde_json::from_str(&body).map_err(|e| match detect_challenge(&body) {
            Some(name) => AdapterOutcome::BlockedOrChallenged {
                reason: name.to_string(),
            },
            None => AdapterOutcome::TransportError {
                reason: format!("invalid JSON body: {e}"),
                likely_blocking: false,
            },
        })
    }
}

/// Per-invocation dedup and normalization.
#[derive(Debug)]
pub(crate) struct Harvest {
    target_id: TargetId,
    normalizer: Normalizer,
    seen: SeenIds,
    emitted: usize,
    rejected: usize,
}

impl Harvest {
    pub(crate) fn new(target_id: TargetId, normalizer: Normalizer) -> Self {
        Self {
            target_id,
            normalizer,
            seen: SeenIds::default(),
            emitted: 0,
            rejected: 0,
        }
    }

    /// Dedup and normalize one raw item.
    ///
    /// Items whose id was already seen are dropped before normalization;
    /// items that fail to normalize are logged and skipped.
    pub(crate) fn admit(&mut self, raw: Value, category_hint: Option<&str>) -> Option<CanonicalListing> {
        let id = self.normalizer.item_id(&raw);
        if let Some(id) = &id {
            if !self.seen.insert(id) {
                return None;
            }
        }

        match self.normalizer.normalize(raw, category_hint) {
            Ok(listing) => {
                self.emitted += 1;
                Some(listing)
            }
            Err(e) => {
                self.rejected += 1;
                warn!(target_id = %self.target_id, item = id.as_deref().unwrap_or("?"), "skipping item: {}", e);
                None
            }
        }
    }

    /// Distinct ids seen so far.
    pub(crate) fn seen(&self) -> usize {
        self.seen.len()
    }

    /// Listings produced so far.
    pub(crate) fn emitted(&self) -> usize {
        self.emitted
    }

    /// Outcome for a walk that ran to its natural end.
    pub(crate) fn natural_outcome(&self) -> AdapterOutcome {
        if self.emitted == 0 {
            AdapterOutcome::EmptyNoData
        } else {
            AdapterOutcome::Complete
        }
    }
}

/// Items under the first envelope path that resolves to an array.
///
/// An empty path means the body itself.
pub(crate) fn unwrap_items<'v>(body: &'v Value, paths: &[&str]) -> Option<&'v Vec<Value>> {
    paths.iter().find_map(|path| {
        if path.is_empty() {
            body.as_array()
        } else {
            canopy_normalize::lookup(body, path).and_then(Value::as_array)
        }
    })
}

/// First non-negative integer under any of `paths`.
pub(crate) fn declared_count(body: &Value, paths: &[&str]) -> Option<u64> {
    paths
        .iter()
        .filter_map(|path| canopy_normalize::lookup(body, path))
        .find_map(|value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        })
}

/// Adapters by strategy.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<StrategyId, Arc<dyn CatalogAdapter>>,
}

impl AdapterSet {
    /// Set with every built-in strategy.
    #[must_use]
    pub fn standard(context: &AdapterContext) -> Self {
        Self::default()
            .with(Arc::new(crate::rest::PaginatedRestAdapter::new(context.clone())))
            .with(Arc::new(crate::graph::PersistedQueryGraphAdapter::new(context.clone())))
            .with(Arc::new(crate::search_index::SearchIndexAdapter::new(context.clone())))
            .with(Arc::new(crate::browser::BrowserInterceptionAdapter::new(context.clone())))
            .with(Arc::new(crate::storefront::GenericStorefrontAdapter::new(context.clone())))
    }

    /// Add or replace the adapter for its strategy.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn CatalogAdapter>) -> Self {
        self.adapters.insert(adapter.strategy(), adapter);
        self
    }

    /// Adapter for a strategy.
    #[must_use]
    pub fn get(&self, strategy: StrategyId) -> Option<Arc<dyn CatalogAdapter>> {
        self.adapters.get(&strategy).cloned()
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut strategies: Vec<_> = self.adapters.keys().map(StrategyId::as_str).collect();
        strategies.sort_unstable();
        f.debug_struct("AdapterSet")
            .field("strategies", &strategies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{Category, MenuType};
    use canopy_normalize::{CategoryVocabulary, FieldMap};
    use serde_json::json;

    static FIELDS: FieldMap = FieldMap {
        id: &["id"],
        name: &["name"],
        brand: &[],
        category: &["category"],
        subcategory: &[],
        price: &["price"],
        discount_price: &[],
        discount_text: &[],
        description: &[],
    };
    static VOCAB: CategoryVocabulary = CategoryVocabulary::new(&[("Flower", Category::Flower)]);

    fn harvest() -> Harvest {
        Harvest::new(
            TargetId::new("store-a").unwrap(),
            Normalizer::new(&FIELDS, &VOCAB, MenuType::Recreational),
        )
    }

    #[test]
    fn test_harvest_dedups_before_normalizing() {
        let mut harvest = harvest();
        assert!(harvest.admit(json!({"id": 1, "name": "a", "price": 5}), None).is_some());
        assert!(harvest.admit(json!({"id": 1, "name": "a", "price": 6}), None).is_none());
        assert!(harvest.admit(json!({"id": 2, "name": "b"}), None).is_none());
        assert_eq!(harvest.emitted(), 1);
        assert_eq!(harvest.seen(), 2);
        assert_eq!(harvest.natural_outcome(), AdapterOutcome::Complete);
    }

    #[test]
    fn test_harvest_empty_is_no_data() {
        assert_eq!(harvest().natural_outcome(), AdapterOutcome::EmptyNoData);
    }

    #[test]
    fn test_unwrap_items() {
        let body = json!({"data": {"list": [1, 2]}, "meta": {"total": "12"}});
        assert_eq!(unwrap_items(&body, &["list", "data.list"]).map(Vec::len), Some(2));
        assert_eq!(unwrap_items(&json!([1]), &["list", ""]).map(Vec::len), Some(1));
        assert_eq!(unwrap_items(&body, &["nope"]), None);
        assert_eq!(declared_count(&body, &["total", "meta.total"]), Some(12));
    }

    #[tokio::test]
    async fn test_finished_stream() {
        let stream = ListingStream::finished(AdapterOutcome::EmptyNoData);
        let (listings, summary) = stream.collect_all().await;
        assert!(listings.is_empty());
        assert_eq!(summary.outcome, AdapterOutcome::EmptyNoData);
        assert_eq!(summary.pages, 0);
    }

    #[tokio::test]
    async fn test_stream_without_summary_is_transport_error() {
        let stream = ListingStream::new(futures::stream::empty());
        let (_, summary) = stream.collect_all().await;
        assert!(matches!(summary.outcome, AdapterOutcome::TransportError { .. }));
    }
}
