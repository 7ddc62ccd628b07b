//! Generic e-commerce storefront adapter.
//!
//! Small shops run on off-the-shelf platforms. The adapter probes the
//! platforms' public catalog endpoints first, then falls back to scraping
//! the menu page: product markup by common selectors, then product-like
//! objects embedded in the page's JSON scripts. The first source that
//! yields listings wins.

use crate::adapter::{
    unwrap_items, AdapterContext, AdapterStep, AdapterSummary, CatalogAdapter, Harvest,
    ListingStream,
};
use crate::paging::{FetchBudget, PageReport, PageWalker};
use crate::transport::{detect_challenge, HttpRequest};
use async_stream::stream;
use canopy_core::{AdapterOutcome, Category, StrategyId, Target};
use canopy_normalize::{find_product_like, CategoryVocabulary, FieldMap, Normalizer, HEURISTIC_FIELDS};
use futures::Stream;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Product containers tried in order; the first that matches anything wins.
const PRODUCT_SELECTORS: &[&str] = &[
    ".product",
    ".product-item",
    ".product-card",
    "[data-product]",
    ".woocommerce-loop-product__title",
    ".shopify-product",
    "article.product",
];
const NAME_SELECTOR: &str = ".product-title, .product-name, h2, h3, a";
const PRICE_SELECTOR: &str = ".price, .product-price, [data-price]";
const SCRIPT_SELECTORS: &[&str] = &[
    r#"script[type="application/ld+json"]"#,
    "script#__NEXT_DATA__",
    r#"script[type="application/json"]"#,
];

static STOREFRONT_FIELDS: FieldMap = FieldMap {
    id: &["id", "product_id", "sku"],
    name: &["title", "name"],
    brand: &["vendor", "brands[0].name", "brand"],
    category: &["product_type", "categories[0].name", "category"],
    subcategory: &["categories[1].name"],
    price: &["listPrice", "price"],
    discount_price: &["salePrice"],
    discount_text: &[],
    description: &["plainDescription"],
};

static EMBEDDED_FIELDS: FieldMap = HEURISTIC_FIELDS;

static STOREFRONT_VOCABULARY: CategoryVocabulary = CategoryVocabulary::new(&[
    ("Flower", Category::Flower),
    ("Pre-Rolls", Category::PreRolls),
    ("Vape", Category::Vaporizers),
    ("Vapes", Category::Vaporizers),
    ("Concentrates", Category::Concentrates),
    ("Edibles", Category::Edibles),
    ("Tinctures", Category::Tinctures),
    ("Topicals", Category::Topicals),
    ("Glass", Category::Accessories),
    ("Papers", Category::Accessories),
    ("Accessories", Category::Accessories),
    ("CBD", Category::Other),
]);

/// A platform's public catalog endpoint.
#[derive(Debug, Clone, Copy)]
struct CatalogApi {
    name: &'static str,
    path: &'static str,
    size_param: &'static str,
    page_size: usize,
    items: &'static [&'static str],
    prepare: fn(&Value) -> Value,
}

const CATALOG_APIS: &[CatalogApi] = &[
    CatalogApi {
        name: "products.json",
        path: "/products.json",
        size_param: "limit",
        page_size: 250,
        items: &["products"],
        prepare: hosted_cart_item,
    },
    CatalogApi {
        name: "store-api",
        path: "/wp-json/wc/store/products",
        size_param: "per_page",
        page_size: 100,
        items: &["", "products"],
        prepare: store_api_item,
    },
];

impl CatalogApi {
    fn request(&self, origin: &str, page: u32) -> HttpRequest {
        HttpRequest::get(format!("{origin}{}", self.path))
            .query(self.size_param, self.page_size.to_string())
            .query("page", page.to_string())
            .header("accept", "application/json")
    }
}

/// Adapter for generic e-commerce storefronts.
#[derive(Debug, Clone)]
pub struct GenericStorefrontAdapter {
    context: AdapterContext,
}

impl GenericStorefrontAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new(context: AdapterContext) -> Self {
        Self { context }
    }
}

impl CatalogAdapter for GenericStorefrontAdapter {
    fn strategy(&self) -> StrategyId {
        StrategyId::GenericStorefront
    }

    fn applies_to(&self, target: &Target) -> bool {
        target.params.base_url.is_some()
    }

    fn fetch(&self, target: &Target, budget: FetchBudget) -> ListingStream {
        ListingStream::new(walk(self.context.clone(), target.clone(), budget))
    }
}

fn origin_of(base_url: &str) -> String {
    url::Url::parse(base_url).map_or_else(
        |_| base_url.trim_end_matches('/').to_string(),
        |url| url.origin().ascii_serialization(),
    )
}

fn with_fields(product: &Value, fields: &[(&str, Option<Value>)]) -> Value {
    let mut item = product.as_object().cloned().unwrap_or_else(Map::new);
    for (key, value) in fields {
        if let Some(value) = value {
            item.insert((*key).to_string(), value.clone());
        }
    }
    Value::Object(item)
}

/// Text content of an HTML fragment, whitespace collapsed.
fn plain_text(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let text = fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Product from a hosted-cart `products.json`: first variant's price, with
/// `compare_at_price` as the regular price when the product is on sale.
fn hosted_cart_item(product: &Value) -> Value {
    let price = FieldMap::first_price(product, &["variants[0].price"]);
    let compare_at = FieldMap::first_price(product, &["variants[0].compare_at_price"]);
    let (list, sale) = match (price, compare_at) {
        (Some(price), Some(compare_at)) if compare_at > price => (Some(compare_at), Some(price)),
        (price, _) => (price, None),
    };
    let description = product
        .get("body_html")
        .and_then(Value::as_str)
        .and_then(plain_text);

    with_fields(
        product,
        &[
            ("listPrice", list.map(Value::from)),
            ("salePrice", sale.map(Value::from)),
            ("plainDescription", description.map(Value::from)),
        ],
    )
}

/// Product from a store API, whose prices are integer strings in minor
/// currency units.
fn store_api_item(product: &Value) -> Value {
    let minor_unit = product
        .pointer("/prices/currency_minor_unit")
        .and_then(Value::as_u64)
        .unwrap_or(2);
    let scale = 10f64.powi(i32::try_from(minor_unit).unwrap_or(2));
    let major = |path: &str| FieldMap::first_price(product, &[path]).map(|minor| minor / scale);

    let current = major("prices.price");
    let regular = major("prices.regular_price").or(current);
    let sale = major("prices.sale_price")
        .or(current)
        .filter(|sale| regular.is_some_and(|regular| *sale < regular));
    let description = FieldMap::first_text(product, &["short_description", "description"])
        .and_then(|html| plain_text(&html));

    with_fields(
        product,
        &[
            ("listPrice", regular.map(Value::from)),
            ("salePrice", sale.map(Value::from)),
            ("plainDescription", description.map(Value::from)),
        ],
    )
}

/// Prices in a text such as `"$24.99 $19.99"`.
fn prices_in(text: &str) -> Vec<f64> {
    text.split(|c: char| c.is_whitespace() || c == '$')
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_digit()).replace(',', ""))
        .filter_map(|token| token.parse::<f64>().ok())
        .filter(|price| price.is_finite() && *price > 0.0)
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn markup_item(element: ElementRef<'_>, name: &Selector, price: &Selector) -> Option<Value> {
    let title = element
        .select(name)
        .map(element_text)
        .find(|text| !text.is_empty())
        .or_else(|| Some(element_text(element)).filter(|text| !text.is_empty()))?;

    let price_text = element
        .select(price)
        .map(|el| {
            el.value()
                .attr("data-price")
                .map_or_else(|| element_text(el), ToString::to_string)
        })
        .find(|text| !prices_in(text).is_empty())
        .or_else(|| element.value().attr("data-price").map(ToString::to_string))?;
    let prices = prices_in(&price_text);
    let list = prices.iter().copied().fold(f64::MIN, f64::max);
    let sale = prices.iter().copied().fold(f64::MAX, f64::min);

    let mut item = json!({
        "name": title,
        "category": title,
        "listPrice": list,
    });
    if prices.len() > 1 && sale < list {
        item["salePrice"] = json!(sale);
    }
    if let Some(id) = element
        .value()
        .attr("data-product-id")
        .or_else(|| element.value().attr("data-product"))
        .filter(|id| !id.is_empty() && *id != "true")
    {
        item["id"] = json!(id);
    }
    Some(item)
}

/// Product markup from the first container selector that matches.
fn markup_products(document: &Html) -> Vec<Value> {
    let (Ok(name), Ok(price)) = (Selector::parse(NAME_SELECTOR), Selector::parse(PRICE_SELECTOR)) else {
        return Vec::new();
    };
    PRODUCT_SELECTORS
        .iter()
        .filter_map(|selector| Selector::parse(selector).ok())
        .map(|selector| {
            document
                .select(&selector)
                .filter_map(|element| markup_item(element, &name, &price))
                .collect::<Vec<_>>()
        })
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}

/// Product-like objects in the page's JSON scripts.
fn embedded_products(document: &Html) -> Vec<Value> {
    let mut found = Vec::new();
    for selector in SCRIPT_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()) {
        for script in document.select(&selector) {
            let text: String = script.text().collect();
            if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
                found.extend(find_product_like(&value).into_iter().cloned());
            }
        }
    }
    found
}

/// Markup and embedded products of a menu page.
///
/// Parsed synchronously: the DOM is not `Send`.
fn scan_page(html: &str) -> (Vec<Value>, Vec<Value>) {
    let document = Html::parse_document(html);
    (markup_products(&document), embedded_products(&document))
}

/// Whether a probe failure means the whole storefront is unusable rather
/// than the platform endpoint simply not existing.
fn is_decisive(outcome: &AdapterOutcome) -> bool {
    match outcome {
        AdapterOutcome::BlockedOrChallenged { .. } | AdapterOutcome::AuthExpired { .. } => true,
        AdapterOutcome::TransportError { likely_blocking, .. } => *likely_blocking,
        AdapterOutcome::Complete | AdapterOutcome::EmptyNoData => false,
    }
}

fn walk(
    context: AdapterContext,
    target: Target,
    budget: FetchBudget,
) -> impl Stream<Item = AdapterStep> + Send {
    stream! {
        let mut walker = PageWalker::new(budget);
        let Some(base_url) = target.params.base_url.clone() else {
            yield AdapterStep::Finished(AdapterSummary::immediate(AdapterOutcome::TransportError {
                reason: "target has no storefront URL".to_string(),
                likely_blocking: false,
            }));
            return;
        };
        let origin = origin_of(&base_url);

        let session = match context.session_for(&target).await {
            Ok(session) => session,
            Err(outcome) => {
                yield AdapterStep::Finished(AdapterSummary::immediate(outcome));
                return;
            }
        };

        let mut decisive: Option<AdapterOutcome> = None;

        for api in CATALOG_APIS {
            let normalizer = Normalizer::new(&STOREFRONT_FIELDS, &STOREFRONT_VOCABULARY, target.menu_type);
            let mut harvest = Harvest::new(target.id.clone(), normalizer);
            let mut failure = None;
            let mut page = 1u32;
            let mut cumulative = 0usize;
            loop {
                if !walker.advance() {
                    break;
                }
                let request = api.request(&origin, page);
                let body = match context.request_json(&target, request, session.as_ref()).await {
                    Ok(body) => body,
                    Err(outcome) => {
                        failure = Some(outcome);
                        break;
                    }
                };

                let products = unwrap_items(&body, api.items).cloned().unwrap_or_default();
                let before = harvest.seen();
                cumulative += products.len();
                for product in &products {
                    if let Some(listing) = harvest.admit((api.prepare)(product), None) {
                        yield AdapterStep::Listing(listing);
                    }
                }

                let report = PageReport {
                    position: page,
                    items: products.len(),
                    new_ids: harvest.seen() - before,
                    cumulative,
                    page_size: api.page_size,
                    declared_total: None,
                    declared_pages: None,
                };
                debug!(target_id = %target.id, source = api.name, page, items = report.items, "fetched storefront page");
                if report.is_last() {
                    break;
                }
                page += 1;
            }

            if harvest.emitted() > 0 {
                let outcome = failure.unwrap_or(AdapterOutcome::Complete);
                info!(
                    target_id = %target.id,
                    strategy = %StrategyId::GenericStorefront,
                    source = api.name,
                    count = harvest.emitted(),
                    outcome = %outcome,
                    "catalog walk finished"
                );
                yield AdapterStep::Finished(AdapterSummary {
                    outcome,
                    pages: walker.pages(),
                    truncated: walker.truncated(),
                    listings: harvest.emitted(),
                });
                return;
            }

            match failure {
                Some(outcome) if is_decisive(&outcome) => {
                    debug!(target_id = %target.id, source = api.name, outcome = %outcome, "storefront probe rejected");
                    decisive.get_or_insert(outcome);
                }
                Some(outcome) => {
                    debug!(target_id = %target.id, source = api.name, outcome = %outcome, "storefront endpoint unavailable");
                }
                None => {}
            }
        }

        if !walker.advance() {
            yield AdapterStep::Finished(AdapterSummary {
                outcome: decisive.unwrap_or(AdapterOutcome::EmptyNoData),
                pages: walker.pages(),
                truncated: walker.truncated(),
                listings: 0,
            });
            return;
        }

        let html = match context
            .request(&target, HttpRequest::get(base_url.clone()), session.as_ref())
            .await
        {
            Ok(html) => html,
            Err(outcome) => {
                yield AdapterStep::Finished(AdapterSummary {
                    outcome: decisive.unwrap_or(outcome),
                    pages: walker.pages(),
                    truncated: walker.truncated(),
                    listings: 0,
                });
                return;
            }
        };

        let (markup, embedded) = scan_page(&html);
        // Only the recursive JSON search is a heuristic; selector hits are mapped.
        let sources = [
            (
                "markup",
                markup,
                Normalizer::new(&STOREFRONT_FIELDS, &STOREFRONT_VOCABULARY, target.menu_type).with_name_ids(),
            ),
            (
                "embedded-json",
                embedded,
                Normalizer::new(&EMBEDDED_FIELDS, &STOREFRONT_VOCABULARY, target.menu_type).heuristic(),
            ),
        ];
        for (source, items, normalizer) in sources {
            let mut harvest = Harvest::new(target.id.clone(), normalizer);
            for item in items {
                if let Some(listing) = harvest.admit(item, None) {
                    yield AdapterStep::Listing(listing);
                }
            }
            if harvest.emitted() > 0 {
                info!(
                    target_id = %target.id,
                    strategy = %StrategyId::GenericStorefront,
                    source,
                    count = harvest.emitted(),
                    "catalog walk finished"
                );
                yield AdapterStep::Finished(AdapterSummary {
                    outcome: AdapterOutcome::Complete,
                    pages: walker.pages(),
                    truncated: walker.truncated(),
                    listings: harvest.emitted(),
                });
                return;
            }
        }

        let outcome = decisive.unwrap_or_else(|| match detect_challenge(&html) {
            Some(name) => AdapterOutcome::BlockedOrChallenged {
                reason: name.to_string(),
            },
            None => AdapterOutcome::EmptyNoData,
        });
        info!(target_id = %target.id, strategy = %StrategyId::GenericStorefront, outcome = %outcome, "no storefront source produced listings");
        yield AdapterStep::Finished(AdapterSummary {
            outcome,
            pages: walker.pages(),
            truncated: walker.truncated(),
            listings: 0,
        });
    }
}
