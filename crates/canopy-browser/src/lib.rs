//! Browser automation for client-rendered catalogs.
//!
//! Provides a headless browser driver that harvests the page's own JSON
//! network traffic through a passive response listener, plus randomized
//! fingerprints for outbound identities.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;

pub use actions::{
    BrowserCookie, BrowserDriver, CapturedResponse, PageSession, ResponseSink, SessionOptions,
};
pub use engine::ChromiumDriver;
pub use error::{BrowserError, Result};
pub use fingerprint::FingerprintConfig;
