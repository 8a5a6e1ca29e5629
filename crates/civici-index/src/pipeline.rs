//! Pipeline orchestration
//!
//! ```text
//! Init -> Streaming -> Draining -> Done
//!             |
//!             +-> Fatal     (header missing or incomplete)
//!             +-> Aborted   (input read error)
//! ```
//!
//! Streaming runs on a blocking worker that owns the [`IndexBuilder`]. Its
//! finished [`Indices`] move into an `Arc` and the writer tasks only read
//! them. Nothing touches the output directory before `Draining`, so a run
//! that fails or is interrupted while streaming leaves the previous output
//! as it was.

use crate::classify::{Classified, RowClassifier};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::{BuildStats, IndexBuilder, Indices, KeyCollision};
use crate::progress::{create_row_spinner, format_bytes};
use crate::source::RowSource;
use crate::writer::{FsShardStore, ShardStore, ShardWriter, WriteSummary};
use indicatif::ProgressBar;
use serde::Serialize;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Rows between two spinner updates
const SPINNER_STRIDE: u64 = 4096;

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Init,
    Streaming,
    /// Terminal: the header row was missing or lacked required columns
    Fatal,
    /// Terminal: the input could not be read to the end
    Aborted,
    Draining,
    Done,
}

/// Result of the streaming phase
#[derive(Debug)]
pub struct Streamed {
    /// All rows read, preamble and header included
    pub rows_read: u64,
    pub indices: Indices,
}

/// Final report of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rows_read: u64,
    pub stats: BuildStats,
    pub regions: usize,
    pub collisions: Vec<KeyCollision>,
    pub write: WriteSummary,
    pub duration_seconds: f64,
}

impl RunSummary {
    /// True when every artifact was written
    pub fn is_success(&self) -> bool {
        self.write.is_success()
    }

    /// Emit the summary as tracing events
    pub fn log(&self) {
        info!(
            rows = self.rows_read,
            data_rows = self.stats.data_rows,
            ignored_rows = self.stats.ignored_rows,
            regions = self.regions,
            comuni_shards = self.write.comuni_written,
            strade_shards = self.write.strade_written,
            collisions = self.collisions.len(),
            failures = self.write.failures.len(),
            "Completed in {:.2}s",
            self.duration_seconds
        );

        for failure in &self.write.failures {
            error!(kind = %failure.kind, path = %failure.path, error = %failure.error, "Shard not written");
        }
    }
}

/// One run of the CSV-to-index transform
pub struct Pipeline<S: ShardStore + ?Sized + 'static> {
    config: IndexConfig,
    store: Arc<S>,
    state: PipelineState,
}

impl Pipeline<FsShardStore> {
    /// Pipeline writing to `config.output_dir` on the local filesystem
    pub fn new(config: IndexConfig) -> Self {
        let store = Arc::new(FsShardStore::new(config.output_dir.clone()));
        Self::with_store(config, store)
    }
}

impl<S: ShardStore + ?Sized + 'static> Pipeline<S> {
    pub fn with_store(config: IndexConfig, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state change");
        self.state = next;
    }

    /// Stream the input, then write every shard.
    ///
    /// Returns `Err` only when no output was produced (invalid config, fatal
    /// header, unreadable input, output root not resettable). Shard-level
    /// failures come back inside the summary.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let start = Instant::now();
        self.config.validate()?;

        info!(
            input = %self.config.input.display(),
            output = %self.config.output_dir.display(),
            header_row = self.config.header_row,
            "Starting index build"
        );
        self.transition(PipelineState::Streaming);

        let config = self.config.clone();
        let streamed = match tokio::task::spawn_blocking(move || stream_input(&config)).await {
            Ok(Ok(streamed)) => streamed,
            Ok(Err(e)) => {
                self.transition(if e.is_schema_error() {
                    PipelineState::Fatal
                } else {
                    PipelineState::Aborted
                });
                return Err(e);
            },
            Err(e) => {
                self.transition(PipelineState::Aborted);
                return Err(e.into());
            },
        };

        self.transition(PipelineState::Draining);
        let rows_read = streamed.rows_read;
        let indices = Arc::new(streamed.indices);
        let stats = indices.stats;
        let regions = indices.regions.len();
        let collisions = indices.collisions.clone();

        info!(
            rows = rows_read,
            regions,
            province_shards = indices.provinces.len(),
            street_shards = indices.streets.len(),
            civic_entries = indices.streets.entry_count(),
            "Stream complete"
        );

        let writer = ShardWriter::new(Arc::clone(&self.store), self.config.concurrency);
        let write = match writer.write(indices).await {
            Ok(write) => write,
            Err(e) => {
                self.transition(PipelineState::Aborted);
                return Err(e);
            },
        };

        self.transition(PipelineState::Done);

        let summary = RunSummary {
            rows_read,
            stats,
            regions,
            collisions,
            write,
            duration_seconds: start.elapsed().as_secs_f64(),
        };
        summary.log();
        Ok(summary)
    }
}

/// Open the configured input and accumulate it, with progress reporting
pub fn stream_input(config: &IndexConfig) -> Result<Streamed> {
    if let Ok(metadata) = std::fs::metadata(&config.input) {
        info!(size = %format_bytes(metadata.len()), "Streaming input");
    }

    let source = RowSource::open(&config.input, config.delimiter)?;
    let progress = create_row_spinner(config.show_progress);
    let result = accumulate(
        source,
        config.header_row_u64(),
        config.progress_interval,
        &progress,
    );

    match &result {
        Ok(streamed) => {
            progress.set_position(streamed.rows_read);
            progress.finish_with_message("done");
        },
        Err(e) => {
            progress.abandon_with_message("aborted");
            warn!(error = %e, "Streaming stopped; no output will be written");
        },
    }
    result
}

/// Classify every row and fold data rows into a fresh [`IndexBuilder`].
///
/// Stops at the first fatal condition without reading further rows.
pub fn accumulate<R: Read>(
    source: RowSource<R>,
    header_row: u64,
    progress_interval: u64,
    progress: &ProgressBar,
) -> Result<Streamed> {
    let mut classifier = RowClassifier::new(header_row);
    let mut builder = IndexBuilder::new();
    let mut rows_read = 0u64;

    for row in source {
        let row = row?;
        let previous = rows_read;
        rows_read = row.index + 1;

        match classifier.classify(row.index, &row.record)? {
            Classified::Preamble => {},
            Classified::Header(columns) => debug!(?columns, "Resolved header columns"),
            Classified::Record(record) => builder.apply(&record),
        }

        // Blank lines advance the index by more than one
        if crossed(previous, rows_read, SPINNER_STRIDE) {
            progress.set_position(rows_read);
        }
        if progress_interval > 0 && crossed(previous, rows_read, progress_interval) {
            info!(rows = rows_read, "Processed {} rows", rows_read);
        }
    }

    if !classifier.has_header() {
        return Err(IndexError::HeaderNotFound {
            header_row,
            rows_read,
        });
    }

    info!(rows = rows_read, "Total rows processed");
    Ok(Streamed {
        rows_read,
        indices: builder.finish(),
    })
}

fn crossed(previous: u64, current: u64, step: u64) -> bool {
    previous / step != current / step
}
