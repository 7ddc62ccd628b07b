//! Adapter walks against scripted backends.

use async_trait::async_trait;
use canopy_adapters::{
    AdapterContext, BrowserInterceptionAdapter, CatalogAdapter, FetchBudget,
    GenericStorefrontAdapter, HttpRequest, HttpResponse, Identity, IdentityController, Method,
    PaginatedRestAdapter, PersistedQueryGraphAdapter, SearchIndexAdapter, SessionError, SessionMaterial, SessionSource,
    Transport, TransportFailure,
};
use canopy_browser::{
    BrowserDriver, BrowserError, CapturedResponse, PageSession, ResponseSink, SessionOptions,
};
use canopy_core::{
    AdapterOutcome, BackendFamily, BrowserConfig, Category, Confidence, ConnectionParams, Target,
    TargetId,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Script = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

struct ScriptedTransport {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    fn new(script: impl Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: HttpRequest,
        _identity: &Identity,
    ) -> Result<HttpResponse, TransportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.script)(&request))
    }
}

struct NoSessions;

#[async_trait]
impl SessionSource for NoSessions {
    async fn load(&self, reference: &str) -> Result<SessionMaterial, SessionError> {
        Err(SessionError::NotFound {
            reference: reference.to_string(),
        })
    }
}

/// A page whose scrolls release queued catalog responses.
struct ScriptedPage {
    url: Mutex<String>,
    gate_sticks: bool,
    batches: Mutex<VecDeque<Value>>,
    sink: Arc<dyn ResponseSink>,
}

impl ScriptedPage {
    fn release_next(&self) {
        if let Some(body) = self.batches.lock().unwrap().pop_front() {
            self.sink.on_response(CapturedResponse {
                url: "https://api.example.com/graphql".to_string(),
                status: 200,
                body,
            });
        }
    }
}

#[async_trait]
impl PageSession for ScriptedPage {
    async fn goto(&self, url: &str) -> canopy_browser::Result<()> {
        if !self.gate_sticks {
            *self.url.lock().unwrap() = url.to_string();
        }
        self.release_next();
        Ok(())
    }

    async fn current_url(&self) -> canopy_browser::Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn content(&self) -> canopy_browser::Result<String> {
        Ok("<html><body><div id=\"menu\"></div></body></html>".to_string())
    }

    async fn click_text(&self, labels: &[String]) -> canopy_browser::Result<Option<String>> {
        if self.gate_sticks {
            return Ok(None);
        }
        Ok(labels.first().cloned())
    }

    async fn scroll_by(&self, _pixels: u32) -> canopy_browser::Result<()> {
        self.release_next();
        Ok(())
    }

    async fn close(&self) -> canopy_browser::Result<()> {
        Ok(())
    }
}

struct ScriptedDriver {
    start_url: String,
    gate_sticks: bool,
    batches: Vec<Value>,
    opened: AtomicUsize,
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn open(
        &self,
        _options: SessionOptions,
        sink: Arc<dyn ResponseSink>,
    ) -> canopy_browser::Result<Box<dyn PageSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage {
            url: Mutex::new(self.start_url.clone()),
            gate_sticks: self.gate_sticks,
            batches: Mutex::new(self.batches.iter().cloned().collect()),
            sink,
        }))
    }
}

struct NoBrowser;

#[async_trait]
impl BrowserDriver for NoBrowser {
    async fn open(
        &self,
        _options: SessionOptions,
        _sink: Arc<dyn ResponseSink>,
    ) -> canopy_browser::Result<Box<dyn PageSession>> {
        Err(BrowserError::ChromiumError("no browser in tests".to_string()))
    }
}

fn context(transport: Arc<dyn Transport>, browser: Arc<dyn BrowserDriver>) -> AdapterContext {
    AdapterContext {
        controller: Arc::new(IdentityController::unpaced()),
        transport,
        browser,
        sessions: Arc::new(NoSessions),
        browser_config: Arc::new(BrowserConfig {
            settle_ms: 0,
            stagnation_limit: 2,
            category_tabs: Vec::new(),
            ..BrowserConfig::default()
        }),
    }
}

fn rest_target(categories: &[&str]) -> Target {
    Target::new(TargetId::new("rest-store").unwrap(), BackendFamily::RestCatalog).with_params(
        ConnectionParams {
            store_id: Some("100".into()),
            api_base: Some("https://pos.example.com/api".into()),
            categories: categories.iter().map(ToString::to_string).collect(),
            ..ConnectionParams::default()
        },
    )
}

fn products(prefix: &str, range: std::ops::Range<usize>) -> Vec<Value> {
    range
        .map(|i| {
            json!({
                "id": format!("{prefix}-{i}"),
                "name": format!("Item {prefix} {i}"),
                "category": {"name": "Flower"},
                "variants": [{"price": 10 + (i % 5)}]
            })
        })
        .collect()
}

fn rest_page(request: &HttpRequest) -> (String, u64) {
    let body = request.json.as_ref().expect("json body");
    let category = body["filters"]["category"][0].to_string();
    let page = body["page"].as_u64().expect("page");
    (category, page)
}

#[tokio::test]
async fn test_rest_walks_every_category_until_short_page() {
    let transport = ScriptedTransport::new(|request| {
        let (category, page) = rest_page(request);
        let size = match category.as_str() {
            "1" | "2" => 100,
            _ => 50,
        };
        let list = if page == 1 {
            products(&category, 0..size)
        } else {
            Vec::new()
        };
        HttpResponse::json(200, &json!({ "list": list }))
    });
    let adapter = PaginatedRestAdapter::new(context(transport.clone(), Arc::new(NoBrowser))).with_page_size(100);

    let (listings, summary) = adapter
        .fetch(&rest_target(&["1", "2", "3"]), FetchBudget::new(50))
        .collect_all()
        .await;

    assert_eq!(listings.len(), 250);
    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert!(!summary.truncated);
    // Two pages for each full category, one for the short one
    assert_eq!(summary.pages, 5);
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_rest_stops_at_page_bound_against_endless_backend() {
    let transport = ScriptedTransport::new(|request| {
        let (_, page) = rest_page(request);
        let start = usize::try_from(page).unwrap() * 1000;
        HttpResponse::json(200, &json!({ "list": products("p", start..start + 100), "total": 1_000_000 }))
    });
    let adapter = PaginatedRestAdapter::new(context(transport.clone(), Arc::new(NoBrowser))).with_page_size(100);

    let (listings, summary) = adapter
        .fetch(&rest_target(&["7"]), FetchBudget::new(4))
        .collect_all()
        .await;

    assert_eq!(listings.len(), 400);
    assert_eq!(summary.pages, 4);
    assert!(summary.truncated);
    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn test_rest_repeated_page_is_deduplicated() {
    let transport = ScriptedTransport::new(|_| HttpResponse::json(200, &json!({ "list": products("same", 0..100) })));
    let adapter = PaginatedRestAdapter::new(context(transport.clone(), Arc::new(NoBrowser))).with_page_size(100);

    let (listings, summary) = adapter
        .fetch(&rest_target(&["1"]), FetchBudget::new(50))
        .collect_all()
        .await;

    let mut ids: Vec<_> = listings.iter().map(|l| l.provider_item_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100);
    assert_eq!(listings.len(), 100);
    assert_eq!(transport.calls(), 2);
    assert!(!summary.truncated);
}

#[tokio::test]
async fn test_rest_rerun_yields_same_unique_ids() {
    // Categories overlap, so some products come back twice in one run
    let transport = ScriptedTransport::new(|request| {
        let (category, page) = rest_page(request);
        let list = match (category.as_str(), page) {
            ("1", 1) => products("shared", 0..60),
            ("2", 1) => products("shared", 40..90),
            _ => Vec::new(),
        };
        HttpResponse::json(200, &json!({ "list": list }))
    });
    let adapter = PaginatedRestAdapter::new(context(transport, Arc::new(NoBrowser))).with_page_size(100);
    let target = rest_target(&["1", "2"]);

    let mut runs = Vec::new();
    for _ in 0..2 {
        let (listings, summary) = adapter.fetch(&target, FetchBudget::new(20)).collect_all().await;
        assert_eq!(summary.outcome, AdapterOutcome::Complete);
        let mut ids: Vec<_> = listings.into_iter().map(|l| l.provider_item_id).collect();
        let emitted = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), emitted);
        runs.push(ids);
    }

    assert_eq!(runs[0].len(), 90);
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_rest_block_is_reported() {
    let transport = ScriptedTransport::new(|_| HttpResponse::text(403, "<title>Access Denied</title>"));
    let adapter = PaginatedRestAdapter::new(context(transport, Arc::new(NoBrowser)));

    let (listings, summary) = adapter
        .fetch(&rest_target(&["1"]), FetchBudget::new(10))
        .collect_all()
        .await;

    assert!(listings.is_empty());
    assert!(matches!(summary.outcome, AdapterOutcome::BlockedOrChallenged { .. }));
}

#[tokio::test]
async fn test_rest_missing_session_is_auth_expired() {
    let transport = ScriptedTransport::new(|_| HttpResponse::json(200, &json!({ "list": [] })));
    let adapter = PaginatedRestAdapter::new(context(transport.clone(), Arc::new(NoBrowser)));
    let mut target = rest_target(&["1"]);
    target.params.session_ref = Some("expired-store".into());

    let (_, summary) = adapter.fetch(&target, FetchBudget::new(10)).collect_all().await;

    assert!(matches!(summary.outcome, AdapterOutcome::AuthExpired { .. }));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_search_index_single_short_page() {
    let transport = ScriptedTransport::new(|_| {
        let hits: Vec<Value> = (0..40)
            .map(|i| json!({"objectID": i, "name": format!("Hit {i}"), "kind": "flower", "price": 25}))
            .collect();
        HttpResponse::json(200, &json!({"hits": hits, "nbHits": 40, "nbPages": 1, "page": 0}))
    });
    let adapter = SearchIndexAdapter::new(context(transport.clone(), Arc::new(NoBrowser)));
    let target = Target::new(TargetId::new("index-store").unwrap(), BackendFamily::IndexedCatalog)
        .with_params(ConnectionParams {
            store_id: Some("55".into()),
            index_host: Some("https://search.example.net".into()),
            index_name: Some("menu-products".into()),
            index_app_id: Some("APP".into()),
            index_api_key: Some("KEY".into()),
            ..ConnectionParams::default()
        });
    assert!(adapter.applies_to(&target));

    let (listings, summary) = adapter.fetch(&target, FetchBudget::new(10)).collect_all().await;

    assert_eq!(listings.len(), 40);
    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert_eq!(transport.calls(), 1);
}

fn graph_target() -> Target {
    Target::new(TargetId::new("graph-store").unwrap(), BackendFamily::GraphCatalog).with_params(
        ConnectionParams {
            store_id: Some("5f3d".into()),
            api_base: Some("https://menu.example.com/graphql".into()),
            query_hash: Some("deadbeef".into()),
            categories: vec!["Flower".into(), "Edible".into()],
            ..ConnectionParams::default()
        },
    )
}

fn graph_page(request: &HttpRequest) -> (String, u64) {
    let variables: Value = serde_json::from_str(request.query_value("variables").expect("variables")).unwrap();
    let category = variables["productsFilter"]["types"][0].as_str().unwrap().to_string();
    let page = variables["page"].as_u64().expect("page");
    (category, page)
}

#[tokio::test]
async fn test_graph_walks_declared_pages_and_expands_options() {
    let transport = ScriptedTransport::new(|request| {
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query_value("operationName"), Some("FilteredProducts"));
        let (category, page) = graph_page(request);
        let (products, total_pages): (Vec<Value>, u64) = if category == "Flower" {
            // Full pages forever; only the declared page count ends the walk
            let start = usize::try_from(page).unwrap() * 100;
            let products = (start..start + 100)
                .map(|i| {
                    json!({
                        "_id": format!("f{i}"),
                        "Name": format!("Strain {i}"),
                        "type": "Flower",
                        "Options": ["1g", "1/8oz"],
                        "recPrices": [12, 40]
                    })
                })
                .collect();
            (products, 2)
        } else {
            let products = (0..10)
                .map(|i| json!({"_id": format!("e{i}"), "Name": format!("Gummy {i}"), "type": "Edible", "Prices": [20]}))
                .collect();
            (products, 1)
        };
        HttpResponse::json(
            200,
            &json!({"data": {"filteredProducts": {
                "products": products,
                "queryInfo": {"totalCount": 1000, "totalPages": total_pages}
            }}}),
        )
    });
    let adapter = PersistedQueryGraphAdapter::new(context(transport.clone(), Arc::new(NoBrowser)));
    let target = graph_target();
    assert!(adapter.applies_to(&target));

    let (listings, summary) = adapter.fetch(&target, FetchBudget::new(20)).collect_all().await;

    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert!(!summary.truncated);
    // Pages 0 and 1 of Flower, page 0 of Edible
    assert_eq!(transport.calls(), 3);
    assert_eq!(summary.pages, 3);
    assert_eq!(listings.len(), 410);

    let eighth = listings
        .iter()
        .find(|l| l.provider_item_id == "f150_1")
        .expect("expanded option");
    assert_eq!(eighth.name, "Strain 150 - 1/8oz");
    assert_eq!(eighth.price, 40.0);
    assert_eq!(eighth.category, Category::Flower);
    assert_eq!(eighth.confidence, Confidence::Mapped);
    assert_eq!(
        listings.iter().filter(|l| l.category == Category::Edibles).count(),
        10
    );
}

#[tokio::test]
async fn test_graph_error_envelope_aborts_walk() {
    let transport = ScriptedTransport::new(|_| {
        HttpResponse::json(200, &json!({"errors": [{"message": "PersistedQueryNotFound"}], "data": null}))
    });
    let adapter = PersistedQueryGraphAdapter::new(context(transport.clone(), Arc::new(NoBrowser)));

    let (listings, summary) = adapter
        .fetch(&graph_target(), FetchBudget::new(20))
        .collect_all()
        .await;

    assert!(listings.is_empty());
    assert!(matches!(
        summary.outcome,
        AdapterOutcome::TransportError { ref reason, .. } if reason.contains("PersistedQueryNotFound")
    ));
    assert_eq!(transport.calls(), 1);
}

fn browser_target() -> Target {
    Target::new(TargetId::new("rendered-store").unwrap(), BackendFamily::RenderedCatalog).with_params(
        ConnectionParams {
            base_url: Some("https://shop.example.com/menu".into()),
            ..ConnectionParams::default()
        },
    )
}

#[tokio::test]
async fn test_browser_sticky_age_gate_is_auth_expired() {
    let driver = Arc::new(ScriptedDriver {
        start_url: "https://shop.example.com/age-gate?redirect=/menu".to_string(),
        gate_sticks: true,
        batches: Vec::new(),
        opened: AtomicUsize::new(0),
    });
    let transport = ScriptedTransport::new(|_| HttpResponse::text(500, ""));
    let adapter = BrowserInterceptionAdapter::new(context(transport, driver.clone()));

    let (listings, summary) = adapter
        .fetch(&browser_target(), FetchBudget::new(20))
        .collect_all()
        .await;

    assert!(listings.is_empty());
    assert!(matches!(summary.outcome, AdapterOutcome::AuthExpired { .. }));
    assert_eq!(driver.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_browser_drops_traffic_behind_sticky_gate() {
    // The gate page still fires a catalog request before redirecting nowhere
    let driver = Arc::new(ScriptedDriver {
        start_url: "https://shop.example.com/age-gate?redirect=/menu".to_string(),
        gate_sticks: true,
        batches: vec![json!({"data": {"filteredProducts": {"products": [
            {"_id": "g1", "Name": "Leaked Cart", "type": "Vaporizers", "Prices": [30]},
            {"_id": "g2", "Name": "Leaked Gummy", "type": "Edible", "Prices": [18]}
        ]}}})],
        opened: AtomicUsize::new(0),
    });
    let transport = ScriptedTransport::new(|_| HttpResponse::text(500, ""));
    let adapter = BrowserInterceptionAdapter::new(context(transport, driver));

    let (listings, summary) = adapter
        .fetch(&browser_target(), FetchBudget::new(20))
        .collect_all()
        .await;

    assert!(matches!(summary.outcome, AdapterOutcome::AuthExpired { .. }));
    assert!(listings.is_empty());
    assert_eq!(summary.listings, 0);
}

#[tokio::test]
async fn test_browser_harvests_intercepted_responses() {
    let batch = |range: std::ops::Range<usize>| {
        json!({"data": {"filteredProducts": {"products": range.map(|i| json!({
            "_id": format!("b{i}"),
            "Name": format!("Cart {i}"),
            "type": "Vaporizers",
            "Prices": [30]
        })).collect::<Vec<_>>()}}})
    };
    let driver = Arc::new(ScriptedDriver {
        start_url: "about:blank".to_string(),
        gate_sticks: false,
        batches: vec![batch(0..10), batch(10..20), batch(5..25)],
        opened: AtomicUsize::new(0),
    });
    let transport = ScriptedTransport::new(|_| HttpResponse::text(500, ""));
    let adapter = BrowserInterceptionAdapter::new(context(transport, driver));

    let (listings, summary) = adapter
        .fetch(&browser_target(), FetchBudget::new(20))
        .collect_all()
        .await;

    assert_eq!(listings.len(), 25);
    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert!(!summary.truncated);
}

#[tokio::test]
async fn test_browser_unavailable_is_transport_error() {
    let transport = ScriptedTransport::new(|_| HttpResponse::text(500, ""));
    let adapter = BrowserInterceptionAdapter::new(context(transport, Arc::new(NoBrowser)));

    let (_, summary) = adapter
        .fetch(&browser_target(), FetchBudget::new(5))
        .collect_all()
        .await;

    assert!(matches!(summary.outcome, AdapterOutcome::TransportError { .. }));
}

#[tokio::test]
async fn test_storefront_falls_through_to_store_api() {
    let transport = ScriptedTransport::new(|request| {
        if request.url.ends_with("/products.json") {
            return HttpResponse::text(404, "not found");
        }
        if request.url.ends_with("/wp-json/wc/store/products") {
            let page = request.query_value("page").unwrap_or("1");
            if page != "1" {
                return HttpResponse::json(200, &json!([]));
            }
            return HttpResponse::json(
                200,
                &json!([
                    {"id": 1, "name": "Glass Bubbler", "prices": {"price": "4500", "regular_price": "4500", "currency_minor_unit": 2}},
                    {"id": 2, "name": "Hemp Wick", "prices": {"price": "399", "regular_price": "499", "sale_price": "399", "currency_minor_unit": 2}}
                ]),
            );
        }
        HttpResponse::text(500, "")
    });
    let adapter = GenericStorefrontAdapter::new(context(transport, Arc::new(NoBrowser)));
    let target = Target::new(TargetId::new("smoke-shop").unwrap(), BackendFamily::Storefront).with_params(
        ConnectionParams {
            base_url: Some("https://smoke.example.com/shop/".into()),
            ..ConnectionParams::default()
        },
    );

    let (listings, summary) = adapter.fetch(&target, FetchBudget::new(10)).collect_all().await;

    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[0].price, 45.0);
    assert_eq!(listings[1].discount_price, Some(3.99));
}

#[tokio::test]
async fn test_storefront_scrapes_markup_when_no_api() {
    let transport = ScriptedTransport::new(|request| {
        if request.url == "https://smoke.example.com/shop/" {
            return HttpResponse::text(
                200,
                r#"<html><body>
                    <div class="product-card"><h3>Rolling Tray</h3><span class="price">$12.00</span></div>
                    <div class="product-card"><h3>Butane 300ml</h3><span class="price">$6.50</span></div>
                </body></html>"#,
            );
        }
        HttpResponse::text(404, "")
    });
    let adapter = GenericStorefrontAdapter::new(context(transport, Arc::new(NoBrowser)));
    let target = Target::new(TargetId::new("smoke-shop").unwrap(), BackendFamily::Storefront).with_params(
        ConnectionParams {
            base_url: Some("https://smoke.example.com/shop/".into()),
            ..ConnectionParams::default()
        },
    );

    let (listings, summary) = adapter.fetch(&target, FetchBudget::new(10)).collect_all().await;

    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert_eq!(listings.len(), 2);
    assert!(listings.iter().all(|l| l.confidence == Confidence::Mapped));
}

#[tokio::test]
async fn test_storefront_page_with_captcha_widget_is_scraped() {
    let transport = ScriptedTransport::new(|request| {
        if request.url == "https://smoke.example.com/shop/" {
            return HttpResponse::text(
                200,
                r#"<html><body>
                    <form id="newsletter"><div class="g-recaptcha" data-sitekey="k"></div></form>
                    <div class="product-card"><h3>Hemp Wraps</h3><span class="price">$3.00</span></div>
                </body></html>"#,
            );
        }
        HttpResponse::text(404, "")
    });
    let adapter = GenericStorefrontAdapter::new(context(transport, Arc::new(NoBrowser)));
    let target = Target::new(TargetId::new("smoke-shop").unwrap(), BackendFamily::Storefront).with_params(
        ConnectionParams {
            base_url: Some("https://smoke.example.com/shop/".into()),
            ..ConnectionParams::default()
        },
    );

    let (listings, summary) = adapter.fetch(&target, FetchBudget::new(10)).collect_all().await;

    assert_eq!(summary.outcome, AdapterOutcome::Complete);
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].price, 3.0);
}
