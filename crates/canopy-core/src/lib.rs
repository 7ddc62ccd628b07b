//! Canopy Core - Foundation crate for the Canopy catalog ingestion pipeline.
//!
//! This crate provides the shared types, error handling, configuration
//! management, target registry and storage contract that every other Canopy
//! crate depends on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Identifier newtypes and closed enums (`TargetId`, `BackendFamily`, `StrategyId`)
//! - [`target`] - Storefront targets and their connection parameters
//! - [`listing`] - Canonical listing records, categories and size specs
//! - [`run`] - Adapter outcomes and scrape-run lifecycle
//! - [`registry`] - In-memory target registry loaded from TOML
//! - [`store`] - Snapshot storage contract
//!
//! # Example
//!
//! ```rust
//! use canopy_core::{AppConfig, TargetRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! config.validate()?;
//!
//! let registry = TargetRegistry::from_toml_str(
//!     r#"
//! [[targets]]
//! id = "green-leaf-downtown"
//! family = "rest-catalog"
//! [targets.params]
//! api_base = "https://api.example.com"
//! store_id = "42"
//! "#,
//! )?;
//! assert_eq!(registry.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod listing;
pub mod registry;
pub mod run;
pub mod store;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, ProxyConfig, RateLimitConfig, ScrapingConfig, StorageConfig,
};
pub use error::{CanopyError, ConfigError, ConfigResult, Result};
pub use listing::{CanonicalListing, Category, Confidence, SizeSpec, SizeUnit, VapeForm};
pub use registry::TargetRegistry;
pub use run::{AdapterOutcome, FailureCause, RunHandle, RunStatus, ScrapeRun};
pub use store::{AvailabilityDelta, Snapshot, SnapshotStore, StoreError};
pub use target::{ConnectionParams, Target};
pub use types::{BackendFamily, MenuType, RunId, StrategyId, TargetId};
