//! Civici Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the civici workspace.
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Checksums**: integrity digests used by the index manifest
//!
//! # Example
//!
//! ```
//! use civici_common::checksum::sha256_hex;
//!
//! let checksum = sha256_hex(b"[]");
//! assert_eq!(checksum.len(), 64);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
