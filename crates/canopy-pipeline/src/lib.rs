//! Canopy Pipeline - fallback chains and scrape-run orchestration.
//!
//! # Modules
//!
//! - [`resilience`] - Ordered fallback chains per backend family
//! - [`orchestrator`] - Timed, bounded-concurrency target runs and snapshot finalization
//! - [`store`] - In-memory snapshot store
//! - [`error`] - Pipeline error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod orchestrator;
pub mod resilience;
pub mod store;

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use orchestrator::{RunOptions, RunReport, ScrapeOrchestrator};
pub use resilience::{ChainOutcome, ResilienceLayer, Resolution, StrategyAttempt};
pub use store::MemoryStore;
