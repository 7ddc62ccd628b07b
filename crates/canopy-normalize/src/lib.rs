//! Canopy Normalize - Raw catalog records to canonical listings.
//!
//! # Modules
//!
//! - [`fields`] - Dotted field paths and per-backend field maps
//! - [`category`] - Category vocabularies and keyword inference
//! - [`size`] - Category-directed size parsing
//! - [`heuristic`] - Best-effort search for product-like objects
//! - [`normalizer`] - Raw item to [`CanonicalListing`](canopy_core::CanonicalListing)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod category;
pub mod error;
pub mod fields;
pub mod heuristic;
pub mod normalizer;
pub mod size;
mod text;

// Re-export commonly used types
pub use category::{infer_category, CategoryVocabulary};
pub use error::ParseError;
pub use fields::{lookup, FieldMap};
pub use heuristic::{find_product_like, looks_like_product, HEURISTIC_FIELDS};
pub use normalizer::Normalizer;
pub use size::normalize_size;
