//! Shared identifier newtypes and closed enums.

use crate::error::CanopyError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Newtype for target identifiers with validation.
///
/// Target IDs are lowercase alphanumeric with hyphens or underscores,
/// 2-64 characters, starting and ending with an alphanumeric character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId(String);

impl TargetId {
    /// Create a new `TargetId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, CanopyError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), CanopyError> {
        static TARGET_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = TARGET_REGEX.get_or_init(|| {
            Regex::new(r"^[a-z0-9][a-z0-9_-]{0,62}[a-z0-9]$").expect("valid regex")
        });

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(CanopyError::Validation(format!(
                "invalid target ID: must be 2-64 lowercase alphanumeric characters, hyphens or underscores, got '{id}'"
            )))
        }
    }
}

impl TryFrom<String> for TargetId {
    type Error = CanopyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TargetId> for String {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one scrape run (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Create a new random `RunId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap a stored run identifier.
    #[must_use]
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of backend a storefront runs on.
///
/// The family selects the fallback chain of strategies tried for a target and
/// scopes the rate limiter and proxy session used for its requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendFamily {
    /// Paginated REST catalog API
    RestCatalog,
    /// GraphQL catalog behind persisted queries
    GraphCatalog,
    /// Catalog served through a hosted search index
    IndexedCatalog,
    /// Client-rendered catalog, usually behind an anti-bot challenge
    RenderedCatalog,
    /// Generic e-commerce storefront
    Storefront,
}

impl BackendFamily {
    /// All families, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::RestCatalog,
        Self::GraphCatalog,
        Self::IndexedCatalog,
        Self::RenderedCatalog,
        Self::Storefront,
    ];

    /// Stable string form used in config files and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RestCatalog => "rest-catalog",
            Self::GraphCatalog => "graph-catalog",
            Self::IndexedCatalog => "indexed-catalog",
            Self::RenderedCatalog => "rendered-catalog",
            Self::Storefront => "storefront",
        }
    }

    /// Ordered fallback chain of strategies for this family.
    #[must_use]
    pub fn strategy_chain(&self) -> &'static [StrategyId] {
        match self {
            Self::RestCatalog => &[
                StrategyId::PaginatedRest,
                StrategyId::SearchIndex,
                StrategyId::BrowserInterception,
            ],
            Self::GraphCatalog => &[
                StrategyId::PersistedQueryGraph,
                StrategyId::BrowserInterception,
            ],
            Self::IndexedCatalog => &[StrategyId::SearchIndex, StrategyId::BrowserInterception],
            Self::RenderedCatalog => &[StrategyId::BrowserInterception],
            Self::Storefront => &[
                StrategyId::GenericStorefront,
                StrategyId::BrowserInterception,
            ],
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendFamily {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| CanopyError::Validation(format!("unknown backend family '{s}'")))
    }
}

/// Identifier of one adapter strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyId {
    /// Paginated REST adapter
    PaginatedRest,
    /// Persisted-query GraphQL adapter
    PersistedQueryGraph,
    /// Hosted search index adapter
    SearchIndex,
    /// Headless browser network interception adapter
    BrowserInterception,
    /// Generic e-commerce storefront adapter
    GenericStorefront,
}

impl StrategyId {
    /// All strategies, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::PaginatedRest,
        Self::PersistedQueryGraph,
        Self::SearchIndex,
        Self::BrowserInterception,
        Self::GenericStorefront,
    ];

    /// Stable string form used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaginatedRest => "paginated-rest",
            Self::PersistedQueryGraph => "persisted-query-graph",
            Self::SearchIndex => "search-index",
            Self::BrowserInterception => "browser-interception",
            Self::GenericStorefront => "generic-storefront",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| CanopyError::Validation(format!("unknown strategy '{s}'")))
    }
}

/// Which price list a menu is scraped from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuType {
    /// Adult-use menu
    #[default]
    #[serde(alias = "rec")]
    Recreational,
    /// Medical menu
    #[serde(alias = "med")]
    Medical,
}

impl MenuType {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recreational => "recreational",
            Self::Medical => "medical",
        }
    }

    /// Short pricing-type code used by catalog APIs.
    #[must_use]
    pub fn pricing_code(&self) -> &'static str {
        match self {
            Self::Recreational => "rec",
            Self::Medical => "med",
        }
    }
}

impl fmt::Display for MenuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MenuType {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recreational" | "rec" => Ok(Self::Recreational),
            "medical" | "med" => Ok(Self::Medical),
            other => Err(CanopyError::Validation(format!("unknown menu type '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_id_valid() {
        assert!(TargetId::new("green-leaf-downtown").is_ok());
        assert!(TargetId::new("store_42").is_ok());
        assert!(TargetId::new("ab").is_ok());
    }

    #[test]
    fn test_target_id_invalid() {
        assert!(TargetId::new("").is_err());
        assert!(TargetId::new("a").is_err());
        assert!(TargetId::new("Green-Leaf").is_err());
        assert!(TargetId::new("-leading").is_err());
        assert!(TargetId::new("trailing-").is_err());
        assert!(TargetId::new("has space").is_err());
        assert!(TargetId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_target_id_deserialize_validates() {
        let ok: Result<TargetId, _> = serde_json::from_str("\"valid-id\"");
        assert!(ok.is_ok());
        let bad: Result<TargetId, _> = serde_json::from_str("\"NOT VALID\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_run_id_generate_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
    }

    #[test]
    fn test_family_chains() {
        assert_eq!(
            BackendFamily::RestCatalog.strategy_chain(),
            &[
                StrategyId::PaginatedRest,
                StrategyId::SearchIndex,
                StrategyId::BrowserInterception
            ]
        );
        assert_eq!(
            BackendFamily::RenderedCatalog.strategy_chain(),
            &[StrategyId::BrowserInterception]
        );
        for family in BackendFamily::ALL {
            let chain = family.strategy_chain();
            assert!(!chain.is_empty());
            assert_eq!(chain.last(), Some(&StrategyId::BrowserInterception));
        }
    }

    #[test]
    fn test_string_forms_round_trip() {
        for family in BackendFamily::ALL {
            assert_eq!(family.as_str().parse::<BackendFamily>().ok(), Some(family));
        }
        for strategy in StrategyId::ALL {
            assert_eq!(strategy.as_str().parse::<StrategyId>().ok(), Some(strategy));
        }
        assert!("graphql".parse::<BackendFamily>().is_err());
    }

    #[test]
    fn test_menu_type_aliases() {
        let rec: MenuType = serde_json::from_str("\"rec\"").expect("parse rec alias");
        assert_eq!(rec, MenuType::Recreational);
        let med: MenuType = serde_json::from_str("\"medical\"").expect("parse medical");
        assert_eq!(med.pricing_code(), "med");
        assert_eq!(MenuType::default(), MenuType::Recreational);
    }
}
