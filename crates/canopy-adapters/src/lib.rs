//! Canopy Adapters - protocol strategies for reading storefront catalogs.
//!
//! Every backend protocol is one [`CatalogAdapter`]. An adapter turns a
//! [`Target`](canopy_core::Target) into a lazy [`ListingStream`] of
//! canonical listings that ends with an
//! [`AdapterOutcome`](canopy_core::AdapterOutcome).
//!
//! # Modules
//!
//! - [`adapter`] - The adapter contract, listing streams and the adapter set
//! - [`controller`] - Per-family request pacing and outbound identity rotation
//! - [`transport`] - HTTP transport seam and response classification
//! - [`paging`] - Page-walk bounds, dedup and stagnation tracking
//! - [`session`] - Stored session material (cookies)
//! - [`variants`] - Expansion of per-option variants into separate items
//! - [`rest`] - Paginated REST catalogs
//! - [`graph`] - Persisted-query GraphQL catalogs
//! - [`search_index`] - Hosted search index catalogs
//! - [`browser`] - Headless browser network interception
//! - [`storefront`] - Generic e-commerce storefronts

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod adapter;
pub mod browser;
pub mod controller;
pub mod error;
pub mod graph;
pub mod paging;
pub mod rest;
pub mod search_index;
pub mod session;
pub mod storefront;
pub mod transport;
pub mod variants;

// Re-export commonly used types
pub use adapter::{AdapterContext, AdapterSet, AdapterStep, AdapterSummary, CatalogAdapter, ListingStream};
pub use browser::BrowserInterceptionAdapter;
pub use controller::{Identity, IdentityController, ProxyEndpoint};
pub use error::{SessionError, TransportFailure};
pub use graph::PersistedQueryGraphAdapter;
pub use paging::{FetchBudget, PageReport, PageWalker, SeenIds, Stagnation};
pub use rest::PaginatedRestAdapter;
pub use search_index::SearchIndexAdapter;
pub use session::{FileSessionSource, SessionCookie, SessionMaterial, SessionSource};
pub use storefront::GenericStorefrontAdapter;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
