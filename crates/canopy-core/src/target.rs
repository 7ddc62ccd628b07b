//! Storefront targets.
//!
//! A [`Target`] is read-only input to a run. Its [`ConnectionParams`] are a
//! bag of protocol-specific settings; each adapter reads only the fields it
//! needs and declares itself inapplicable when they are missing.

use crate::types::{BackendFamily, MenuType, TargetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A storefront configured for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Unique identifier
    pub id: TargetId,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Backend family tag selecting the fallback chain
    pub family: BackendFamily,
    /// Menu the target's prices are read from
    #[serde(default)]
    pub menu_type: MenuType,
    /// Protocol-specific connection parameters
    #[serde(default)]
    pub params: ConnectionParams,
}

impl Target {
    /// Create a target with empty connection parameters.
    #[must_use]
    pub fn new(id: TargetId, family: BackendFamily) -> Self {
        Self {
            name: id.to_string(),
            id,
            family,
            menu_type: MenuType::default(),
            params: ConnectionParams::default(),
        }
    }

    /// Set connection parameters.
    #[must_use]
    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Set the menu type.
    #[must_use]
    pub fn with_menu_type(mut self, menu_type: MenuType) -> Self {
        self.menu_type = menu_type;
        self
    }
}

/// Connection parameters for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Store / dispensary identifier on the backend
    pub store_id: Option<String>,
    /// URL slug of the store
    pub slug: Option<String>,
    /// Public menu page URL (browser and storefront strategies)
    pub base_url: Option<String>,
    /// Catalog API base URL (REST and graph strategies)
    pub api_base: Option<String>,
    /// Products endpoint path template, `{store_id}` and `{slug}` are substituted
    pub products_path: Option<String>,
    /// Category discovery endpoint path template
    pub categories_path: Option<String>,
    /// Fixed category list for the outer pagination loop
    pub categories: Vec<String>,
    /// Persisted query hash for graph backends
    pub query_hash: Option<String>,
    /// Search index host, e.g. `https://xyz-dsn.algolia.net`
    pub index_host: Option<String>,
    /// Search index name
    pub index_name: Option<String>,
    /// Search index application id
    pub index_app_id: Option<String>,
    /// Search index public API key
    pub index_api_key: Option<String>,
    /// Reference to stored session material (cookies)
    pub session_ref: Option<String>,
    /// Extra request headers sent to the catalog API
    pub headers: BTreeMap<String, String>,
}

impl ConnectionParams {
    /// Substitute `{store_id}` and `{slug}` placeholders in a path template.
    #[must_use]
    pub fn expand_path(&self, template: &str) -> String {
        template
            .replace("{store_id}", self.store_id.as_deref().unwrap_or_default())
            .replace("{slug}", self.slug.as_deref().unwrap_or_default())
    }

    /// Whether the target has all search-index parameters.
    #[must_use]
    pub fn has_search_index(&self) -> bool {
        self.index_host.is_some()
            && self.index_name.is_some()
            && self.index_app_id.is_some()
            && self.index_api_key.is_some()
            && self.store_id.is_some()
    }
}
