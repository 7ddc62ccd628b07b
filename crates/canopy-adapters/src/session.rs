//! Stored session material (cookies) referenced by targets.
//!
//! Session files are exported browser cookie lists. The pipeline never
//! refreshes them: missing or fully expired material is reported as
//! `AuthExpired` and left for an operator to renew.

use crate::error::SessionError;
use async_trait::async_trait;
use canopy_browser::BrowserCookie;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One stored cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name
    pub name: String,
    /// Cookie value
    pub value: String,
    /// Cookie domain
    #[serde(default)]
    pub domain: String,
    /// Cookie path
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiry as a Unix timestamp; absent or negative for session cookies
    #[serde(default)]
    pub expires: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl SessionCookie {
    /// Whether the cookie has expired at `now` (Unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: f64) -> bool {
        match self.expires {
            Some(expires) if expires >= 0.0 => expires <= now,
            _ => false,
        }
    }
}

/// Valid cookies for one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionMaterial {
    /// Unexpired cookies
    pub cookies: Vec<SessionCookie>,
}

impl SessionMaterial {
    /// `Cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Cookies in the form the browser driver installs.
    #[must_use]
    pub fn browser_cookies(&self) -> Vec<BrowserCookie> {
        self.cookies
            .iter()
            .map(|c| BrowserCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
            })
            .collect()
    }
}

/// Resolves a target's session reference to session material.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Load unexpired cookies for `reference`.
    async fn load(&self, reference: &str) -> Result<SessionMaterial, SessionError>;
}

/// Reads `<dir>/<reference>.json` cookie files.
#[derive(Debug, Clone)]
pub struct FileSessionSource {
    dir: PathBuf,
}

impl FileSessionSource {
    /// Session files live in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, reference: &str) -> PathBuf {
        let candidate = Path::new(reference);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        if candidate.extension().is_some() {
            self.dir.join(candidate)
        } else {
            self.dir.join(format!("{reference}.json"))
        }
    }
}

#[async_trait]
impl SessionSource for FileSessionSource {
    async fn load(&self, reference: &str) -> Result<SessionMaterial, SessionError> {
        let path = self.path_for(reference);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound {
                    reference: reference.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let cookies: Vec<SessionCookie> =
            serde_json::from_str(&contents).map_err(|source| SessionError::Parse {
                reference: reference.to_string(),
                source,
            })?;
        filter_unexpired(reference, cookies, unix_now())
    }
}

#[allow(clippy::cast_precision_loss)]
fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Drop expired cookies; an empty result is an error.
pub fn filter_unexpired(
    reference: &str,
    cookies: Vec<SessionCookie>,
    now: f64,
) -> Result<SessionMaterial, SessionError> {
    let total = cookies.len();
    let valid: Vec<SessionCookie> = cookies.into_iter().filter(|c| !c.is_expired(now)).collect();
    let expired = total - valid.len();

    if valid.is_empty() {
        return Err(SessionError::Expired {
            reference: reference.to_string(),
            expired,
        });
    }
    if expired > 0 {
        warn!(reference, expired, "dropping expired session cookies");
    }
    debug!(reference, cookies = valid.len(), "loaded session material");
    Ok(SessionMaterial { cookies: valid })
}
