//! Civici Index Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams the national address CSV once and writes the static JSON shards
//! the address picker loads on demand.
//!
//! # Pipeline
//!
//! - **Source** ([`source`]): lossy UTF-8 CSV rows, plain or gzipped
//! - **Classification** ([`classify`]): preamble, header resolution, data rows
//! - **Accumulation** ([`index`]): region, province and street indices
//! - **Keys** ([`key`]): shard file names shared with the web UI
//! - **Ordering** ([`natural`]): natural order for civic numbers
//! - **Output** ([`writer`]): cleared output root, concurrent shard writes, manifest
//!
//! # Example
//!
//! ```no_run
//! use civici_index::{IndexConfig, Pipeline};
//!
//! # async fn example() -> civici_index::Result<()> {
//! let config = IndexConfig::builder()
//!     .input("data/civici.csv")
//!     .output_dir("public/data")
//!     .build();
//!
//! let summary = Pipeline::new(config).run().await?;
//! println!("{} street shards", summary.write.strade_written);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod key;
pub mod natural;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod writer;

// Re-export commonly used types
pub use cli::Cli;
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{Indices, IndexBuilder};
pub use pipeline::{Pipeline, PipelineState, RunSummary};
pub use writer::{FsShardStore, ShardStore, ShardWriter, WriteSummary};
