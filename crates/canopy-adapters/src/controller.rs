//! Request pacing and outbound identity.
//!
//! One [`IdentityController`] is shared by every run of an orchestrator. It
//! paces requests per backend family and hands out each family's current
//! outbound identity (proxy session plus browser fingerprint). A family's
//! identity is rotated when one of its adapters reports a blocking pattern;
//! other families keep theirs.

use canopy_browser::FingerprintConfig;
use canopy_core::{BackendFamily, ProxyConfig, RateLimitConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Pacing state for one backend family.
#[derive(Debug)]
struct RateLimiterState {
    last_dispatch: Option<Instant>,
    min_interval: Duration,
}

/// An authenticated proxy endpoint bound to one sticky session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Effective username, including the sticky session suffix
    pub username: String,
    /// Account password
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// Proxy URL with credentials, for HTTP clients.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "http://{}:{}@{}:{}",
                self.username, password, self.host, self.port
            ),
            None => format!("http://{}@{}:{}", self.username, self.host, self.port),
        }
    }

    /// Proxy server without credentials, for browser launch arguments.
    #[must_use]
    pub fn server(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// The identity presented by outbound requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Incremented on every rotation
    pub generation: u64,
    /// Proxy endpoint, when egress goes through a proxy
    pub proxy: Option<ProxyEndpoint>,
    /// Browser fingerprint (user agent, viewport, language)
    pub fingerprint: FingerprintConfig,
}

impl Identity {
    /// Direct identity with a random fingerprint.
    #[must_use]
    pub fn direct() -> Self {
        Self {
            generation: 0,
            proxy: None,
            fingerprint: FingerprintConfig::randomized(),
        }
    }
}

/// Sticky proxy sessions, handed out round-robin per family.
#[derive(Debug)]
struct ProxyPool {
    host: String,
    port: u16,
    username: String,
    password: Option<String>,
    session_minutes: u32,
    sessions: Vec<String>,
}

impl ProxyPool {
    fn from_config(config: &ProxyConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let host = config.host.clone()?;

        let sessions = if config.sessions.is_empty() {
            (0..config.session_pool_size.max(1))
                .map(|_| random_session_id())
                .collect()
        } else {
            config.sessions.clone()
        };

        Some(Self {
            host,
            port: config.port,
            username: config.username.clone().unwrap_or_default(),
            password: config.password.clone(),
            session_minutes: config.session_minutes,
            sessions,
        })
    }

    fn endpoint(&self, session: &str) -> ProxyEndpoint {
        let username = if self.username.is_empty() {
            String::new()
        } else {
            format!(
                "{}-sid-{}-t-{}",
                self.username, session, self.session_minutes
            )
        };
        ProxyEndpoint {
            host: self.host.clone(),
            port: self.port,
            username,
            password: self.password.clone(),
        }
    }

    /// Endpoint for the session at `cursor`, advancing it.
    fn advance(&self, cursor: &AtomicUsize) -> ProxyEndpoint {
        let index = cursor.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        self.endpoint(&self.sessions[index])
    }
}

fn random_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Pacing and identity of one backend family.
#[derive(Debug)]
struct FamilyState {
    limiter: Mutex<RateLimiterState>,
    identity: RwLock<Identity>,
    session_cursor: AtomicUsize,
}

/// Shared rate and identity controller.
///
/// Not a singleton: every orchestrator owns one and several may coexist.
#[derive(Debug)]
pub struct IdentityController {
    families: HashMap<BackendFamily, FamilyState>,
    proxy: Option<ProxyPool>,
    rotations: AtomicU64,
}

impl IdentityController {
    /// Build a controller from rate-limit and proxy configuration.
    #[must_use]
    pub fn new(rate_limits: &RateLimitConfig, proxy: &ProxyConfig) -> Self {
        let proxy = ProxyPool::from_config(proxy);

        let families = BackendFamily::ALL
            .iter()
            .map(|family| {
                let session_cursor = AtomicUsize::new(0);
                let identity = Identity {
                    generation: 0,
                    proxy: proxy.as_ref().map(|pool| pool.advance(&session_cursor)),
                    fingerprint: FingerprintConfig::randomized(),
                };
                let state = FamilyState {
                    limiter: Mutex::new(RateLimiterState {
                        last_dispatch: None,
                        min_interval: rate_limits.interval_for(*family),
                    }),
                    identity: RwLock::new(identity),
                    session_cursor,
                };
                (*family, state)
            })
            .collect();

        info!(
            proxied = proxy.is_some(),
            "initialized identity controller"
        );

        Self {
            families,
            proxy,
            rotations: AtomicU64::new(0),
        }
    }

    /// Controller without proxy egress or pacing, for tests and local runs.
    #[must_use]
    pub fn unpaced() -> Self {
        let rate_limits = RateLimitConfig {
            default_requests_per_minute: 0,
            families: std::collections::BTreeMap::new(),
        };
        Self::new(&rate_limits, &ProxyConfig::default())
    }

    /// Wait until a request to `family` may be dispatched.
    ///
    /// Only callers of the same family queue behind each other.
    pub async fn wait(&self, family: BackendFamily) {
        let Some(state) = self.families.get(&family) else {
            return;
        };
        let mut state = state.limiter.lock().await;

        if let Some(last) = state.last_dispatch {
            let ready_at = last + state.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        state.last_dispatch = Some(Instant::now());
    }

    /// Current outbound identity of a backend family.
    #[must_use]
    pub fn current_identity(&self, family: BackendFamily) -> Identity {
        self.families.get(&family).map_or_else(Identity::direct, |state| {
            state
                .identity
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Switch a family to its next proxy session and a fresh fingerprint.
    ///
    /// Returns the new identity. Other families are unaffected.
    pub fn rotate(&self, family: BackendFamily) -> Identity {
        let Some(state) = self.families.get(&family) else {
            return Identity::direct();
        };
        let mut identity = state
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let next = Identity {
            generation: identity.generation + 1,
            proxy: self
                .proxy
                .as_ref()
                .map(|pool| pool.advance(&state.session_cursor)),
            fingerprint: FingerprintConfig::randomized(),
        };
        *identity = next.clone();
        self.rotations.fetch_add(1, Ordering::Relaxed);

        debug!(family = %family, generation = next.generation, "rotated outbound identity");
        next
    }

    /// Number of rotations performed so far, across families.
    #[must_use]
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}
