//! Persisted-query GraphQL catalog adapter.
//!
//! The backend only accepts pre-registered queries: each request is a GET
//! carrying the operation name, JSON-encoded variables and the query's
//! hash. Pages are 0-based. Products list their sized options with parallel
//! price arrays per menu type, which are expanded into one listing each.

use crate::adapter::{
    declared_count, unwrap_items, AdapterContext, AdapterStep, AdapterSummary, CatalogAdapter,
    Harvest, ListingStream,
};
use crate::paging::{FetchBudget, PageReport, PageWalker};
use crate::transport::HttpRequest;
use crate::variants::expand_parallel;
use async_stream::stream;
use canopy_core::{AdapterOutcome, Category, MenuType, StrategyId, Target};
use canopy_normalize::{CategoryVocabulary, FieldMap, Normalizer};
use futures::Stream;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Products requested per page.
pub const PER_PAGE: usize = 100;

const OPERATION_NAME: &str = "FilteredProducts";

/// Categories walked when the target doesn't list its own.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Flower",
    "Vaporizers",
    "Edible",
    "Concentrate",
    "Pre-Rolls",
    "Tincture",
    "Topicals",
    "Accessories",
];

const ITEM_PATHS: &[&str] = &["data.filteredProducts.products"];
const TOTAL_PATHS: &[&str] = &["data.filteredProducts.queryInfo.totalCount"];
const PAGE_COUNT_PATHS: &[&str] = &["data.filteredProducts.queryInfo.totalPages"];

const BASE_ID: &[&str] = &["_id", "id"];
const BASE_NAME: &[&str] = &["Name", "cName", "name"];

static GRAPH_FIELDS: FieldMap = FieldMap {
    id: &["variantId", "_id", "id"],
    name: &["variantName", "Name", "cName", "name"],
    brand: &["brand.name", "brandName"],
    category: &["type"],
    subcategory: &["subcategory"],
    price: &["variantPrice", "recPrices[0]", "medicalPrices[0]", "Prices[0]"],
    discount_price: &["variantSpecialPrice"],
    discount_text: &["specialData.saleSpecials[0].specialName"],
    description: &["description"],
};

static GRAPH_VOCABULARY: CategoryVocabulary = CategoryVocabulary::new(&[
    ("Flower", Category::Flower),
    ("Pre-Rolls", Category::PreRolls),
    ("Vaporizers", Category::Vaporizers),
    ("Concentrate", Category::Concentrates),
    ("Edible", Category::Edibles),
    ("Tincture", Category::Tinctures),
    ("Topicals", Category::Topicals),
    ("Accessories", Category::Accessories),
    ("Apparel", Category::Accessories),
    ("CBD", Category::Other),
]);

/// Adapter for persisted-query GraphQL catalogs.
#[derive(Debug, Clone)]
pub struct PersistedQueryGraphAdapter {
    context: AdapterContext,
}

impl PersistedQueryGraphAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new(context: AdapterContext) -> Self {
        Self { context }
    }
}

impl CatalogAdapter for PersistedQueryGraphAdapter {
    fn strategy(&self) -> StrategyId {
        StrategyId::PersistedQueryGraph
    }

    fn applies_to(&self, target: &Target) -> bool {
        let params = &target.params;
        params.api_base.is_some() && params.query_hash.is_some() && params.store_id.is_some()
    }

    fn fetch(&self, target: &Target, budget: FetchBudget) -> ListingStream {
        ListingStream::new(walk(self.context.clone(), target.clone(), budget))
    }
}

fn variables(target: &Target, category: &str, page: u32) -> Value {
    json!({
        "includeEnterpriseSpecials": false,
        "productsFilter": {
            "dispensaryId": target.params.store_id,
            "pricingType": target.menu_type.pricing_code(),
            "strainTypes": [],
            "subcategories": [],
            "Status": "Active",
            "types": [category],
            "useCache": true,
            "isDefaultSort": true,
            "sortBy": "popularSortIdx",
            "sortDirection": 1,
            "bypassOnlineThresholds": false,
            "isKioskMenu": false,
            "removeProductsBelowOptionThresholds": true,
        },
        "page": page,
        "perPage": PER_PAGE,
    })
}

fn page_request(target: &Target, category: &str, page: u32) -> HttpRequest {
    let extensions = json!({
        "persistedQuery": {
            "version": 1,
            "sha256Hash": target.params.query_hash,
        }
    });
    HttpRequest::get(target.params.api_base.clone().unwrap_or_default())
        .query("operationName", OPERATION_NAME)
        .query("variables", variables(target, category, page).to_string())
        .query("extensions", extensions.to_string())
        .header("accept", "application/json")
        .header("apollographql-client-name", "Marketplace (production)")
}

/// GraphQL-level failure reported with a 200 status.
fn graph_error(body: &Value) -> Option<AdapterOutcome> {
    let errors = body.get("errors")?.as_array().filter(|e| !e.is_empty())?;
    if body.get("data").is_some_and(|d| !d.is_null()) {
        return None;
    }
    let message = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("; ");
    Some(AdapterOutcome::TransportError {
        reason: format!("graph error: {message}"),
        likely_blocking: false,
    })
}

fn price_paths(menu_type: MenuType) -> (&'static [&'static str], &'static [&'static str]) {
    match menu_type {
        MenuType::Recreational => (&["recPrices", "Prices"], &["recSpecialPrices"]),
        MenuType::Medical => (&["medicalPrices", "Prices"], &["medicalSpecialPrices"]),
    }
}

fn expand(product: &Value, menu_type: MenuType) -> Vec<Value> {
    let (prices, specials) = price_paths(menu_type);
    match (
        FieldMap::first_text(product, BASE_ID),
        FieldMap::first_text(product, BASE_NAME),
    ) {
        (Some(id), Some(name)) => expand_parallel(product, &id, &name, "Options", prices, specials),
        _ => vec![product.clone()],
    }
}

fn walk(
    context: AdapterContext,
    target: Target,
    budget: FetchBudget,
) -> impl Stream<Item = AdapterStep> + Send {
    stream! {
        let normalizer = Normalizer::new(&GRAPH_FIELDS, &GRAPH_VOCABULARY, target.menu_type);
        let mut harvest = Harvest::new(target.id.clone(), normalizer);
        let mut walker = PageWalker::new(budget);

        let session = match context.session_for(&target).await {
            Ok(session) => session,
            Err(outcome) => {
                yield AdapterStep::Finished(AdapterSummary::immediate(outcome));
                return;
            }
        };

        let categories: Vec<String> = if target.params.categories.is_empty() {
            DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect()
        } else {
            target.params.categories.clone()
        };

        let mut failure = None;
        'categories: for category in &categories {
            let mut page = 0u32;
            let mut cumulative = 0usize;
            loop {
                if !walker.advance() {
                    break 'categories;
                }

                let request = page_request(&target, category, page);
                let body = match context.request_json(&target, request, session.as_ref()).await {
                    Ok(body) => body,
                    Err(outcome) => {
                        failure = Some(outcome);
                        break 'categories;
                    }
                };
                if let Some(outcome) = graph_error(&body) {
                    failure = Some(outcome);
                    break 'categories;
                }

                let products = unwrap_items(&body, ITEM_PATHS).cloned().unwrap_or_default();
                let before = harvest.seen();
                cumulative += products.len();
                for product in &products {
                    for raw in expand(product, target.menu_type) {
                        if let Some(listing) = harvest.admit(raw, Some(category)) {
                            yield AdapterStep::Listing(listing);
                        }
                    }
                }

                let report = PageReport {
                    position: page + 1,
                    items: products.len(),
                    new_ids: harvest.seen() - before,
                    cumulative,
                    page_size: PER_PAGE,
                    declared_total: declared_count(&body, TOTAL_PATHS),
                    declared_pages: declared_count(&body, PAGE_COUNT_PATHS),
                };
                debug!(
                    target_id = %target.id,
                    category = %category,
                    page,
                    items = report.items,
                    new_ids = report.new_ids,
                    "fetched graph page"
                );
                if report.is_last() {
                    break;
                }
                page += 1;
            }
        }

        let outcome = failure.unwrap_or_else(|| harvest.natural_outcome());
        info!(
            target_id = %target.id,
            strategy = %StrategyId::PersistedQueryGraph,
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
