//! Hosted search index adapter.
//!
//! Some menus are served straight from a public search index. The index is
//! queried with an empty query string filtered to the store, 0-based pages
//! of [`HITS_PER_PAGE`], until the declared page count is reached.

use crate::adapter::{
    declared_count, unwrap_items, AdapterContext, AdapterStep, AdapterSummary, CatalogAdapter,
    Harvest, ListingStream,
};
use crate::paging::{FetchBudget, PageReport, PageWalker};
use crate::transport::HttpRequest;
use async_stream::stream;
use canopy_core::{Category, StrategyId, Target};
use canopy_normalize::{CategoryVocabulary, FieldMap, Normalizer};
use futures::Stream;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Hits requested per page.
pub const HITS_PER_PAGE: usize = 100;

static INDEX_FIELDS: FieldMap = FieldMap {
    id: &["objectID", "id", "product_id"],
    name: &["name", "product_name"],
    brand: &["brand", "brand_name"],
    category: &["kind", "category", "product_type"],
    subcategory: &["root_subtype", "subcategory", "kind_subtype"],
    price: &["price", "min_price", "bucket_price", "price_each"],
    discount_price: &["special_price", "discounted_price", "sale_price"],
    discount_text: &["special_title", "special_name"],
    description: &["description"],
};

static INDEX_VOCABULARY: CategoryVocabulary = CategoryVocabulary::new(&[
    ("flower", Category::Flower),
    ("pre-roll", Category::PreRolls),
    ("vape", Category::Vaporizers),
    ("extract", Category::Concentrates),
    ("edible", Category::Edibles),
    ("tincture", Category::Tinctures),
    ("topical", Category::Topicals),
    ("gear", Category::Accessories),
    ("merch", Category::Accessories),
    ("grow", Category::Other),
]);

/// Adapter for catalogs served through a hosted search index.
#[derive(Debug, Clone)]
pub struct SearchIndexAdapter {
    context: AdapterContext,
}

impl SearchIndexAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new(context: AdapterContext) -> Self {
        Self { context }
    }
}

impl CatalogAdapter for SearchIndexAdapter {
    fn strategy(&self) -> StrategyId {
        StrategyId::SearchIndex
    }

    fn applies_to(&self, target: &Target) -> bool {
        target.params.has_search_index()
    }

    fn fetch(&self, target: &Target, budget: FetchBudget) -> ListingStream {
        ListingStream::new(walk(self.context.clone(), target.clone(), budget))
    }
}

fn query_request(target: &Target, page: u32) -> HttpRequest {
    let params = &target.params;
    let host = params.index_host.as_deref().unwrap_or_default();
    let url = format!(
        "{}/1/indexes/{}/query",
        host.trim_end_matches('/'),
        params.index_name.as_deref().unwrap_or_default()
    );
    let body = json!({
        "query": "",
        "page": page,
        "hitsPerPage": HITS_PER_PAGE,
        "filters": format!("store_id = {}", params.store_id.as_deref().unwrap_or_default()),
        "facets": ["*"],
    });
    HttpRequest::post_json(url, body)
        .header(
            "X-Algolia-Application-Id",
            params.index_app_id.clone().unwrap_or_default(),
        )
        .header(
            "X-Algolia-API-Key",
            params.index_api_key.clone().unwrap_or_default(),
        )
}

fn walk(
    context: AdapterContext,
    target: Target,
    budget: FetchBudget,
) -> impl Stream<Item = AdapterStep> + Send {
    stream! {
        let normalizer = Normalizer::new(&INDEX_FIELDS, &INDEX_VOCABULARY, target.menu_type);
        let mut harvest = Harvest::new(target.id.clone(), normalizer);
        let mut walker = PageWalker::new(budget);

        let mut failure = None;
        let mut page = 0u32;
        let mut cumulative = 0usize;
        loop {
            if !walker.advance() {
                break;
            }

            // Index keys are public; no session material is sent.
            let request = query_request(&target, page);
            let body: Value = match context.request_json(&target, request, None).await {
                Ok(body) => body,
                Err(outcome) => {
                    failure = Some(outcome);
                    break;
                }
            };

            let hits = unwrap_items(&body, &["hits"]).cloned().unwrap_or_default();
            let before = harvest.seen();
            cumulative += hits.len();
            for hit in hits.iter().cloned() {
                if let Some(listing) = harvest.admit(hit, None) {
                    yield AdapterStep::Listing(listing);
                }
            }

            let report = PageReport {
                position: page + 1,
                items: hits.len(),
                new_ids: harvest.seen() - before,
                cumulative,
                page_size: HITS_PER_PAGE,
                declared_total: declared_count(&body, &["nbHits"]),
                declared_pages: declared_count(&body, &["nbPages"]),
            };
            debug!(
                target_id = %target.id,
                page,
                hits = report.items,
                new_ids = report.new_ids,
                "fetched index page"
            );
            if report.is_last() {
                break;
            }
            page += 1;
        }

        let outcome = failure.unwrap_or_else(|| harvest.natural_outcome());
        info!(
            target_id = %target.id,
            strategy = %StrategyId::SearchIndex,
            count = harvest.emitted(),
            pages = walker.pages(),
            outcome = %outcome,
            "catalog walk finished"
        );
        yield AdapterStep::Finished(AdapterSummary {
            outcome,
            pages: walker.pages(),
            truncated: walker.truncated(),
            listings: harvest.emitted(),
        });
    }
}
