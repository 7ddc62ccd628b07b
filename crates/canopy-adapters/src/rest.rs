//! Paginated REST catalog adapter.
//!
//! Walks `POST {api_base}{products_path}` page by page, once per category.
//! Categories come from the target's fixed list, from a discovery endpoint,
//! or, when neither is configured, a single unfiltered walk is made.

use crate::adapter::{
    declared_count, unwrap_items, AdapterContext, AdapterStep, AdapterSummary, CatalogAdapter,
    Harvest, ListingStream,
};
use crate::paging::{FetchBudget, PageReport, PageWalker};
use crate::session::SessionMaterial;
use crate::transport::HttpRequest;
use crate::variants::expand_objects;
use async_stream::stream;
use canopy_core::{AdapterOutcome, Category, MenuType, StrategyId, Target};
use canopy_normalize::{CategoryVocabulary, FieldMap, Normalizer};
use futures::Stream;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Default page size requested from the catalog.
pub const DEFAULT_PAGE_SIZE: usize = 60;

const DEFAULT_PRODUCTS_PATH: &str = "/Products/GetProductList";

const ITEM_PATHS: &[&str] = &[
    "list",
    "products",
    "items",
    "data.list",
    "data.items",
    "data.products",
    "result.list",
    "data",
    "result",
    "",
];
const TOTAL_PATHS: &[&str] = &["total", "totalCount", "count", "data.total", "meta.total"];
const PAGE_COUNT_PATHS: &[&str] = &["totalPages", "pageCount", "data.totalPages", "meta.total_pages"];
const CATEGORY_LIST_PATHS: &[&str] = &["", "data", "result", "items", "categories", "list"];

const BASE_ID: &[&str] = &["id", "productId", "ProductId"];
const BASE_NAME: &[&str] = &["name", "productName"];

static REST_FIELDS: FieldMap = FieldMap {
    id: &["variantId", "id", "productId", "ProductId"],
    name: &["variantName", "name", "productName"],
    brand: &["brand.name", "brand", "brandName"],
    category: &["category.name", "category", "categoryName"],
    subcategory: &["subcategory.name", "subcategory", "subCategory"],
    price: &[
        "variantPrice",
        "variants[0].price",
        "variants[0].basePrice",
        "variants[0].regularPrice",
        "price",
        "basePrice",
        "unitPrice",
    ],
    discount_price: &[
        "variantSpecialPrice",
        "variants[0].discountPrice",
        "variants[0].salePrice",
        "variants[0].specialPrice",
        "discountPrice",
        "salePrice",
    ],
    discount_text: &["variants[0].discountText", "variants[0].promoText", "promoText"],
    description: &["description", "shortDescription"],
};

static REST_VOCABULARY: CategoryVocabulary = CategoryVocabulary::new(&[
    ("Flower", Category::Flower),
    ("Pre-Rolls", Category::PreRolls),
    ("Prerolls", Category::PreRolls),
    ("Vapes", Category::Vaporizers),
    ("Cartridges", Category::Vaporizers),
    ("Concentrates", Category::Concentrates),
    ("Extracts", Category::Concentrates),
    ("Edibles", Category::Edibles),
    ("Tinctures", Category::Tinctures),
    ("Topicals", Category::Topicals),
    ("Accessories", Category::Accessories),
    ("Gear", Category::Accessories),
]);

/// One outer-loop category.
#[derive(Debug, Clone, PartialEq)]
struct CategoryFilter {
    filters: Value,
    label: Option<String>,
}

impl CategoryFilter {
    fn all() -> Self {
        Self {
            filters: json!({}),
            label: None,
        }
    }

    fn with_id(id: Value, label: Option<String>) -> Self {
        Self {
            filters: json!({ "category": [id] }),
            label,
        }
    }
}

/// Adapter for paginated REST catalogs.
#[derive(Debug, Clone)]
pub struct PaginatedRestAdapter {
    context: AdapterContext,
    page_size: usize,
}

impl PaginatedRestAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new(context: AdapterContext) -> Self {
        Self {
            context,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the requested page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl CatalogAdapter for PaginatedRestAdapter {
    fn strategy(&self) -> StrategyId {
        StrategyId::PaginatedRest
    }

    fn applies_to(&self, target: &Target) -> bool {
        target.params.api_base.is_some()
    }

    fn fetch(&self, target: &Target, budget: FetchBudget) -> ListingStream {
        ListingStream::new(walk(
            self.context.clone(),
            target.clone(),
            budget,
            self.page_size,
        ))
    }
}

fn sale_type(menu_type: MenuType) -> &'static str {
    match menu_type {
        MenuType::Recreational => "Recreational",
        MenuType::Medical => "Medical",
    }
}

fn endpoint(target: &Target, path: &str) -> String {
    let base = target.params.api_base.as_deref().unwrap_or_default();
    format!(
        "{}{}",
        base.trim_end_matches('/'),
        target.params.expand_path(path)
    )
}

fn with_store_headers(target: &Target, request: HttpRequest) -> HttpRequest {
    let mut request = request
        .header("accept", "application/json, text/plain, */*")
        .header("saletype", sale_type(target.menu_type));
    if let Some(store_id) = &target.params.store_id {
        request = request.header("storeid", store_id.clone());
    }
    request
}

fn product_request(target: &Target, category: &CategoryFilter, page: u32, page_size: usize) -> HttpRequest {
    let path = target
        .params
        .products_path
        .as_deref()
        .unwrap_or(DEFAULT_PRODUCTS_PATH);
    let body = json!({
        "filters": category.filters,
        "page": page,
        "pageSize": page_size,
        "sortingMethodId": 7,
        "searchTerm": "",
        "saleType": sale_type(target.menu_type),
        "platformOs": "web",
    });
    with_store_headers(target, HttpRequest::post_json(endpoint(target, path), body))
}

/// Category id as sent in filters: numeric when it looks numeric.
fn category_id(raw: &str) -> Value {
    raw.trim()
        .parse::<i64>()
        .map_or_else(|_| Value::String(raw.trim().to_string()), Value::from)
}

async fn categories(
    context: &AdapterContext,
    target: &Target,
    session: Option<&SessionMaterial>,
) -> Result<Vec<CategoryFilter>, AdapterOutcome> {
    if !target.params.categories.is_empty() {
        return Ok(target
            .params
            .categories
            .iter()
            .map(|c| CategoryFilter::with_id(category_id(c), Some(c.clone())))
            .collect());
    }

    let Some(path) = target.params.categories_path.as_deref() else {
        return Ok(vec![CategoryFilter::all()]);
    };

    let request = with_store_headers(
        target,
        HttpRequest::post_json(
            endpoint(target, path),
            json!({ "saleType": sale_type(target.menu_type) }),
        ),
    );
    let body = context.request_json(target, request, session).await?;

    let discovered: Vec<CategoryFilter> = unwrap_items(&body, CATEGORY_LIST_PATHS)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let id = FieldMap::first(item, &["id", "categoryId"])?.clone();
                    Some(CategoryFilter::with_id(
                        id,
                        FieldMap::first_text(item, &["name", "title"]),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    debug!(target_id = %target.id, count = discovered.len(), "discovered categories");
    if discovered.is_empty() {
        Ok(vec![CategoryFilter::all()])
    } else {
        Ok(discovered)
    }
}

fn expand(product: &Value) -> Vec<Value> {
    match (
        FieldMap::first_text(product, BASE_ID),
        FieldMap::first_text(product, BASE_NAME),
    ) {
        (Some(id), Some(name)) => expand_objects(product, &id, &name, "variants"),
        _ => vec![product.clone()],
    }
}

fn walk(
    context: AdapterContext,
    target: Target,
    budget: FetchBudget,
    page_size: usize,
) -> impl Stream<Item = AdapterStep> + Send {
    stream! {
        let normalizer = Normalizer::new(&REST_FIELDS, &REST_VOCABULARY, target.menu_type);
        let mut harvest = Harvest::new(target.id.clone(), normalizer);
        let mut walker = PageWalker::new(budget);

        let session = match context.session_for(&target).await {
            Ok(session) => session,
            Err(outcome) => {
                yield AdapterStep::Finished(AdapterSummary::immediate(outcome));
                return;
            }
        };

        let categories = match categories(&context, &target, session.as_ref()).await {
            Ok(categories) => categories,
            Err(outcome) => {
                yield AdapterStep::Finished(AdapterSummary::immediate(outcome));
                return;
            }
        };

        let mut failure = None;
        'categories: for category in &categories {
            let mut page = 1u32;
            let mut cumulative = 0usize;
            loop {
                if !walker.advance() {
                    break 'categories;
                }

                let request = product_request(&target, category, page, page_size);
                let body = match context.request_json(&target, request, session.as_ref()).await {
                    Ok(body) => body,
                    Err(outcome) => {
                        failure = Some(outcome);
                        break 'categories;
                    }
                };

                let items = unwrap_items(&body, ITEM_PATHS).cloned().unwrap_or_default();
                let before = harvest.seen();
                cumulative += items.len();
                for product in &items {
                    for raw in expand(product) {
                        if let Some(listing) = harvest.admit(raw, category.label.as_deref()) {
                            yield AdapterStep::Listing(listing);
                        }
                    }
                }

                let report = PageReport {
                    position: page,
                    items: items.len(),
                    new_ids: harvest.seen() - before,
                    cumulative,
                    page_size,
                    declared_total: declared_count(&body, TOTAL_PATHS),
                    declared_pages: declared_count(&body, PAGE_COUNT_PATHS),
                };
                debug!(
                    target_id = %target.id,
                    category = category.label.as_deref().unwrap_or("all"),
                    page,
                    items = report.items,
                    new_ids = report.new_ids,
                    "fetched catalog page"
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
            strategy = %StrategyId::PaginatedRest,
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
