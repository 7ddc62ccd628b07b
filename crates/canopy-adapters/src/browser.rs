//! Headless browser network interception adapter.
//!
//! Opens the public menu page in a real browser under the current identity,
//! passes the age gate, scrolls and clicks through category tabs, and
//! harvests catalog items from the JSON responses the page fetches for
//! itself. Used when the catalog API can't be called directly.

use crate::adapter::{
    AdapterContext, AdapterStep, AdapterSummary, CatalogAdapter, Harvest, ListingStream,
};
use crate::paging::{FetchBudget, PageWalker, Stagnation};
use crate::transport::detect_challenge;
use crate::variants::{expand_objects, expand_parallel};
use async_stream::stream;
use canopy_browser::{BrowserError, CapturedResponse, PageSession, ResponseSink, SessionOptions};
use canopy_core::{AdapterOutcome, BrowserConfig, Category, MenuType, StrategyId, Target};
use canopy_normalize::{lookup, CategoryVocabulary, FieldMap, Normalizer};
use futures::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Envelopes catalog responses are unwrapped from, in order.
const ENVELOPE_PATHS: &[&str] = &[
    "data.filteredProducts.products",
    "list",
    "products",
    "hits",
    "data.products",
    "data.list",
    "items",
    "results[0].hits",
    "data",
];

const AGE_GATE_URL_MARKERS: &[&str] = &["age-gate", "agegate", "age-verification", "verify-age"];
const AGE_GATE_TEXT_MARKERS: &[&str] = &[
    "verify your age",
    "are you 21",
    "are you at least 21",
    "you must be 21",
    "age verification",
];

static BROWSER_FIELDS: FieldMap = FieldMap {
    id: &["variantId", "_id", "id", "objectID", "productId"],
    name: &["variantName", "Name", "name", "cName", "productName", "product_name"],
    brand: &["brand.name", "brand", "brandName", "brand_name"],
    category: &["type", "category.name", "category", "kind"],
    subcategory: &["subcategory.name", "subcategory", "root_subtype"],
    price: &[
        "variantPrice",
        "price",
        "Prices[0]",
        "recPrices[0]",
        "variants[0].price",
        "min_price",
    ],
    discount_price: &["variantSpecialPrice", "special_price", "discountPrice", "salePrice"],
    discount_text: &[
        "specialData.saleSpecials[0].specialName",
        "promoText",
        "special_title",
    ],
    description: &["description"],
};

static BROWSER_VOCABULARY: CategoryVocabulary = CategoryVocabulary::new(&[
    ("Flower", Category::Flower),
    ("Pre-Rolls", Category::PreRolls),
    ("pre-roll", Category::PreRolls),
    ("Vaporizers", Category::Vaporizers),
    ("vape", Category::Vaporizers),
    ("Concentrate", Category::Concentrates),
    ("extract", Category::Concentrates),
    ("Edible", Category::Edibles),
    ("Tincture", Category::Tinctures),
    ("Topicals", Category::Topicals),
    ("Accessories", Category::Accessories),
    ("gear", Category::Accessories),
]);

/// Adapter that drives a headless browser and intercepts catalog traffic.
#[derive(Debug, Clone)]
pub struct BrowserInterceptionAdapter {
    context: AdapterContext,
}

impl BrowserInterceptionAdapter {
    /// Create the adapter.
    #[must_use]
    pub fn new(context: AdapterContext) -> Self {
        Self { context }
    }
}

impl CatalogAdapter for BrowserInterceptionAdapter {
    fn strategy(&self) -> StrategyId {
        StrategyId::BrowserInterception
    }

    fn applies_to(&self, target: &Target) -> bool {
        target.params.base_url.is_some()
    }

    fn fetch(&self, target: &Target, budget: FetchBudget) -> ListingStream {
        ListingStream::new(walk(self.context.clone(), target.clone(), budget))
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    items: Vec<(Value, Option<String>)>,
    index: HashMap<String, usize>,
    drained: usize,
    hint: Option<String>,
    responses: usize,
}

/// Collects catalog items from captured responses.
///
/// Items are upserted by provider id; an item seen again replaces the
/// earlier copy if that copy hasn't been drained yet.
#[derive(Debug)]
struct Capture {
    normalizer: Normalizer,
    state: Mutex<CaptureState>,
}

impl Capture {
    fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            state: Mutex::new(CaptureState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Category label attached to items captured from now on.
    fn set_hint(&self, hint: Option<String>) {
        self.lock().hint = hint;
    }

    /// Items captured since the last drain.
    fn drain_new(&self) -> Vec<(Value, Option<String>)> {
        let mut state = self.lock();
        let fresh = state.items[state.drained..].to_vec();
        state.drained = state.items.len();
        fresh
    }

    fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn responses(&self) -> usize {
        self.lock().responses
    }
}

impl ResponseSink for Capture {
    fn on_response(&self, response: CapturedResponse) {
        let Some(items) = unwrap_envelope(&response.body) else {
            return;
        };

        let mut state = self.lock();
        state.responses += 1;
        let hint = state.hint.clone();
        let mut added = 0usize;
        for item in items {
            let Some(id) = self.normalizer.item_id(item) else {
                continue;
            };
            if FieldMap::first_text(item, BROWSER_FIELDS.name).is_none() {
                continue;
            }
            match state.index.get(&id).copied() {
                Some(position) if position >= state.drained => {
                    state.items[position] = (item.clone(), hint.clone());
                }
                Some(_) => {}
                None => {
                    let position = state.items.len();
                    state.items.push((item.clone(), hint.clone()));
                    state.index.insert(id, position);
                    added += 1;
                }
            }
        }
        debug!(url = %response.url, added, "captured catalog response");
    }
}

/// Catalog items in a captured body, if it looks like a catalog response.
fn unwrap_envelope(body: &Value) -> Option<&Vec<Value>> {
    if let Some(items) = body.as_array() {
        return Some(items);
    }
    ENVELOPE_PATHS
        .iter()
        .filter_map(|path| lookup(body, path))
        .find_map(Value::as_array)
}

fn expand(product: &Value, menu_type: MenuType) -> Vec<Value> {
    let id = FieldMap::first_text(product, &["_id", "id", "objectID", "productId"]);
    let name = FieldMap::first_text(product, &["Name", "name", "cName", "productName"]);
    let (Some(id), Some(name)) = (id, name) else {
        return vec![product.clone()];
    };

    if product.get("Options").is_some_and(Value::is_array) {
        let (prices, specials): (&[&str], &[&str]) = match menu_type {
            MenuType::Recreational => (&["recPrices", "Prices"], &["recSpecialPrices"]),
            MenuType::Medical => (&["medicalPrices", "Prices"], &["medicalSpecialPrices"]),
        };
        expand_parallel(product, &id, &name, "Options", prices, specials)
    } else {
        expand_objects(product, &id, &name, "variants")
    }
}

/// Map a browser failure to an adapter outcome.
fn browser_failure(err: &BrowserError) -> AdapterOutcome {
    let reason = err.to_string();
    let lower = reason.to_ascii_lowercase();
    let likely_blocking = lower.contains("proxy") || lower.contains("tunnel");
    AdapterOutcome::TransportError {
        reason: format!("browser: {reason}"),
        likely_blocking,
    }
}

async fn at_age_gate(page: &dyn PageSession) -> Result<bool, BrowserError> {
    let url = page.current_url().await?.to_ascii_lowercase();
    if AGE_GATE_URL_MARKERS.iter().any(|marker| url.contains(marker)) {
        return Ok(true);
    }
    let html = page.content().await?.to_lowercase();
    Ok(AGE_GATE_TEXT_MARKERS
        .iter()
        .any(|marker| html.contains(marker)))
}

/// Dismiss an age-verification interstitial if one is shown.
///
/// A gate that can't be dismissed, or that comes back after dismissal, means
/// the stored session is no longer accepted.
async fn pass_age_gate(page: &dyn PageSession, config: &BrowserConfig) -> Result<(), AdapterOutcome> {
    let gated = at_age_gate(page).await.map_err(|e| browser_failure(&e))?;
    if !gated {
        return Ok(());
    }

    let clicked = page
        .click_text(&config.age_gate_labels)
        .await
        .map_err(|e| browser_failure(&e))?;
    let Some(label) = clicked else {
        return Err(AdapterOutcome::AuthExpired {
            reason: "age gate shown and no confirmation control found".to_string(),
        });
    };
    debug!(label = %label, "clicked age gate");
    tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;

    if at_age_gate(page).await.map_err(|e| browser_failure(&e))? {
        return Err(AdapterOutcome::AuthExpired {
            reason: "age gate persists; session cookies likely expired".to_string(),
        });
    }
    Ok(())
}

fn walk(
    context: AdapterContext,
    target: Target,
    budget: FetchBudget,
) -> impl Stream<Item = AdapterStep> + Send {
    stream! {
        let config = context.browser_config.clone();
        let normalizer = Normalizer::new(&BROWSER_FIELDS, &BROWSER_VOCABULARY, target.menu_type);
        let mut harvest = Harvest::new(target.id.clone(), normalizer);
        let mut walker = PageWalker::new(budget);

        let Some(base_url) = target.params.base_url.clone() else {
            yield AdapterStep::Finished(AdapterSummary::immediate(AdapterOutcome::TransportError {
                reason: "target has no menu URL".to_string(),
                likely_blocking: false,
            }));
            return;
        };

        let session = match context.session_for(&target).await {
            Ok(session) => session,
            Err(outcome) => {
                yield AdapterStep::Finished(AdapterSummary::immediate(outcome));
                return;
            }
        };

        let identity = context.controller.current_identity(target.family);
        let options = SessionOptions {
            user_agent: Some(identity.fingerprint.user_agent.clone()),
            proxy_server: identity.proxy.as_ref().map(crate::ProxyEndpoint::server),
            viewport: Some((
                identity.fingerprint.viewport_width,
                identity.fingerprint.viewport_height,
            )),
            cookies: session
                .as_ref()
                .map(crate::session::SessionMaterial::browser_cookies)
                .unwrap_or_default(),
        };

        let capture = Arc::new(Capture::new(normalizer));
        context.controller.wait(target.family).await;
        let page = match context.browser.open(options, capture.clone()).await {
            Ok(page) => page,
            Err(e) => {
                yield AdapterStep::Finished(AdapterSummary::immediate(browser_failure(&e)));
                return;
            }
        };
        let settle = Duration::from_millis(config.settle_ms);

        let mut failure = None;
        'drive: {
            if let Err(e) = page.goto(&base_url).await {
                failure = Some(browser_failure(&e));
                break 'drive;
            }
            tokio::time::sleep(settle).await;

            if let Err(outcome) = pass_age_gate(page.as_ref(), &config).await {
                failure = Some(outcome);
                break 'drive;
            }

            if capture.is_empty() {
                if let Ok(html) = page.content().await {
                    if let Some(name) = detect_challenge(&html) {
                        failure = Some(AdapterOutcome::BlockedOrChallenged {
                            reason: name.to_string(),
                        });
                        break 'drive;
                    }
                }
            }

            let tabs: Vec<Option<String>> = std::iter::once(None)
                .chain(config.category_tabs.iter().cloned().map(Some))
                .collect();

            'tabs: for tab in tabs {
                if let Some(label) = &tab {
                    match page.click_text(std::slice::from_ref(label)).await {
                        Ok(Some(_)) => tokio::time::sleep(settle).await,
                        Ok(None) => {
                            debug!(target_id = %target.id, tab = %label, "category tab not found");
                            continue;
                        }
                        Err(e) => {
                            failure = Some(browser_failure(&e));
                            break 'drive;
                        }
                    }
                }
                capture.set_hint(tab.clone());

                let mut stagnation = Stagnation::new(config.stagnation_limit);
                let mut scrolls = 0u32;
                loop {
                    let before = harvest.seen();
                    for (raw, hint) in capture.drain_new() {
                        for item in expand(&raw, target.menu_type) {
                            if let Some(listing) = harvest.admit(item, hint.as_deref()) {
                                yield AdapterStep::Listing(listing);
                            }
                        }
                    }
                    let new_ids = harvest.seen() - before;
                    if scrolls > 0 && stagnation.observe(new_ids) {
                        break;
                    }
                    if scrolls >= config.max_scroll_iterations {
                        walker.mark_truncated();
                        break;
                    }
                    if !walker.advance() {
                        break 'tabs;
                    }

                    scrolls += 1;
                    if let Err(e) = page.scroll_by(config.scroll_step_px).await {
                        failure = Some(browser_failure(&e));
                        break 'drive;
                    }
                    tokio::time::sleep(settle).await;
                }
                debug!(
                    target_id = %target.id,
                    tab = tab.as_deref().unwrap_or("initial"),
                    scrolls,
                    total = harvest.emitted(),
                    "finished category tab"
                );
            }
        }

        // Traffic behind a gate or a challenge is not trusted catalog data.
        let gated = matches!(
            failure,
            Some(AdapterOutcome::AuthExpired { .. } | AdapterOutcome::BlockedOrChallenged { .. })
        );
        if gated {
            debug!(
                target_id = %target.id,
                discarded = capture.drain_new().len(),
                "dropping responses captured behind a gate"
            );
        } else {
            // Items captured before a failure are still valid listings.
            for (raw, hint) in capture.drain_new() {
                for item in expand(&raw, target.menu_type) {
                    if let Some(listing) = harvest.admit(item, hint.as_deref()) {
                        yield AdapterStep::Listing(listing);
                    }
                }
            }
        }

        if let Err(e) = page.close().await {
            warn!(target_id = %target.id, "failed to close browser session: {}", e);
        }

        let outcome = failure.unwrap_or_else(|| harvest.natural_outcome());
        info!(
            target_id = %target.id,
            strategy = %StrategyId::BrowserInterception,
            count = harvest.emitted(),
            responses = capture.responses(),
            scrolls = walker.pages(),
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
