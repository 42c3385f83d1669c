//! Fieldsnap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Fieldsnap workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`FieldsnapError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by env or a builder
//! - **Checksums**: SHA-256 helpers used when storing objects
//! - **Types**: validated site/category path segments and content types
//!
//! # Example
//!
//! ```no_run
//! use fieldsnap_common::{Result, types::SiteKey};
//!
//! fn parse_site(raw: &str) -> Result<SiteKey> {
//!     SiteKey::parse(raw)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{FieldsnapError, Result};
