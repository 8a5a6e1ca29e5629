//! Shard writer: serializes finished indices into the output tree
//!
//! ```text
//! <output_dir>/
//!   regioni_province.json          region -> sorted provinces
//!   comuni/<PROVINCE_KEY>.json     sorted comuni of one province
//!   strade/<PROVINCE_COMUNE>.json  street -> civic entries
//!   manifest.json                  counts and sha256 of every written file
//! ```
//!
//! The output root is cleared before the first write. Shards are serialized
//! and written on worker tasks, at most `concurrency` at a time; one failed
//! shard is recorded and never stops its siblings.

use crate::error::Result;
use crate::index::Indices;
use crate::key::ShardKey;
use async_trait::async_trait;
use civici_common::checksum::sha256_hex;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const REGIONS_FILE: &str = "regioni_province.json";
pub const COMUNI_DIR: &str = "comuni";
pub const STRADE_DIR: &str = "strade";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Destination for output artifacts
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// Remove any previous output, then create the root and `subdirs`
    async fn reset(&self, subdirs: &[&str]) -> io::Result<()>;

    /// Write one artifact at `relative` (a `/`-separated path below the root)
    async fn put(&self, relative: &str, contents: Vec<u8>) -> io::Result<()>;
}

/// Local filesystem store rooted at the output directory
#[derive(Debug, Clone)]
pub struct FsShardStore {
    root: PathBuf,
}

impl FsShardStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ShardStore for FsShardStore {
    async fn reset(&self, subdirs: &[&str]) -> io::Result<()> {
        if tokio::fs::try_exists(&self.root).await? {
            debug!(root = %self.root.display(), "Removing previous output");
            tokio::fs::remove_dir_all(&self.root).await?;
        }

        tokio::fs::create_dir_all(&self.root).await?;
        for subdir in subdirs {
            tokio::fs::create_dir(self.root.join(subdir)).await?;
        }
        Ok(())
    }

    /// Writes to a `.part` sibling and renames it into place.
    async fn put(&self, relative: &str, contents: Vec<u8>) -> io::Result<()> {
        let target = self.root.join(relative);
        let mut part_name = target
            .file_name()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("no file name in {relative}"))
            })?
            .to_os_string();
        part_name.push(".part");
        let part = target.with_file_name(part_name);

        if let Err(e) = tokio::fs::write(&part, &contents).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
        tokio::fs::rename(&part, &target).await
    }
}

/// Artifact family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardKind {
    Regions,
    Comuni,
    Strade,
    Manifest,
}

impl fmt::Display for ShardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardKind::Regions => write!(f, "regions"),
            ShardKind::Comuni => write!(f, "comuni"),
            ShardKind::Strade => write!(f, "strade"),
            ShardKind::Manifest => write!(f, "manifest"),
        }
    }
}

/// One artifact to produce
#[derive(Debug, Clone)]
enum ShardJob {
    Regions,
    Comuni(ShardKey),
    Strade(ShardKey),
}

impl ShardJob {
    fn kind(&self) -> ShardKind {
        match self {
            ShardJob::Regions => ShardKind::Regions,
            ShardJob::Comuni(_) => ShardKind::Comuni,
            ShardJob::Strade(_) => ShardKind::Strade,
        }
    }

    fn path(&self) -> String {
        match self {
            ShardJob::Regions => REGIONS_FILE.to_string(),
            ShardJob::Comuni(key) => format!("{}/{}", COMUNI_DIR, key.file_name()),
            ShardJob::Strade(key) => format!("{}/{}", STRADE_DIR, key.file_name()),
        }
    }

    fn render(&self, indices: &Indices) -> serde_json::Result<Vec<u8>> {
        match self {
            ShardJob::Regions => serde_json::to_vec_pretty(&indices.regions),
            ShardJob::Comuni(key) => serde_json::to_vec_pretty(&indices.provinces.comuni(key)),
            ShardJob::Strade(key) => serde_json::to_vec_pretty(&indices.streets.shard(key)),
        }
    }
}

/// A written artifact as listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub regions: usize,
    pub comuni_shards: usize,
    pub strade_shards: usize,
    pub failed: usize,
    pub files: Vec<ManifestEntry>,
}

/// An artifact that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardFailure {
    pub kind: ShardKind,
    pub path: String,
    pub error: String,
}

/// Outcome of the write phase
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteSummary {
    pub regions_written: bool,
    pub comuni_written: usize,
    pub strade_written: usize,
    pub manifest_written: bool,
    pub failures: Vec<ShardFailure>,
}

impl WriteSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, kind: ShardKind) {
        match kind {
            ShardKind::Regions => self.regions_written = true,
            ShardKind::Comuni => self.comuni_written += 1,
            ShardKind::Strade => self.strade_written += 1,
            ShardKind::Manifest => self.manifest_written = true,
        }
    }
}

/// Writes every shard of a finished index set
pub struct ShardWriter<S: ShardStore + ?Sized + 'static> {
    store: Arc<S>,
    concurrency: usize,
}

impl<S: ShardStore + ?Sized + 'static> ShardWriter<S> {
    pub fn new(store: Arc<S>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Clear the output, then write all shards and the manifest.
    ///
    /// Only a failed reset is returned as an error; per-shard failures are
    /// collected in the summary.
    pub async fn write(&self, indices: Arc<Indices>) -> Result<WriteSummary> {
        self.store.reset(&[COMUNI_DIR, STRADE_DIR]).await?;

        let jobs = std::iter::once(ShardJob::Regions)
            .chain(indices.provinces.iter().map(|(key, _)| ShardJob::Comuni(key.clone())))
            .chain(indices.streets.iter().map(|(key, _)| ShardJob::Strade(key.clone())))
            .collect::<Vec<_>>();
        let total = jobs.len();

        info!(
            shards = total,
            concurrency = self.concurrency,
            "Writing shards"
        );

        let outcomes: Vec<(ShardKind, String, std::result::Result<ManifestEntry, String>)> =
            stream::iter(jobs)
                .map(|job| {
                    let store = Arc::clone(&self.store);
                    let indices = Arc::clone(&indices);
                    let kind = job.kind();
                    let path = job.path();
                    let handle = tokio::spawn(async move { write_job(&*store, &indices, &job).await });

                    async move {
                        let outcome = match handle.await {
                            Ok(outcome) => outcome,
                            Err(e) => Err(format!("writer task failed: {}", e)),
                        };
                        (kind, path, outcome)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut summary = WriteSummary::default();
        let mut files = Vec::with_capacity(outcomes.len());

        for (kind, path, outcome) in outcomes {
            match outcome {
                Ok(entry) => {
                    summary.record(kind);
                    files.push(entry);
                },
                Err(e) => {
                    error!(kind = %kind, path = %path, error = %e, "Failed to write shard");
                    summary.failures.push(ShardFailure { kind, path, error: e });
                },
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        summary.failures.sort_by(|a, b| a.path.cmp(&b.path));

        let manifest = Manifest {
            regions: indices.regions.len(),
            comuni_shards: summary.comuni_written,
            strade_shards: summary.strade_written,
            failed: summary.failures.len(),
            files,
        };
        match self.write_manifest(&manifest).await {
            Ok(()) => summary.record(ShardKind::Manifest),
            Err(e) => {
                error!(path = MANIFEST_FILE, error = %e, "Failed to write manifest");
                summary.failures.push(ShardFailure {
                    kind: ShardKind::Manifest,
                    path: MANIFEST_FILE.to_string(),
                    error: e.to_string(),
                });
            },
        }

        info!(
            comuni = summary.comuni_written,
            strade = summary.strade_written,
            failed = summary.failures.len(),
            "Finished writing shards"
        );

        Ok(summary)
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        self.store.put(MANIFEST_FILE, bytes).await?;
        Ok(())
    }
}

async fn write_job<S: ShardStore + ?Sized>(
    store: &S,
    indices: &Indices,
    job: &ShardJob,
) -> std::result::Result<ManifestEntry, String> {
    let path = job.path();
    let bytes = job.render(indices).map_err(|e| e.to_string())?;
    let entry = ManifestEntry {
        sha256: sha256_hex(&bytes),
        bytes: bytes.len(),
        path: path.clone(),
    };

    store.put(&path, bytes).await.map_err(|e| e.to_string())?;
    debug!(path = %path, bytes = entry.bytes, "Shard written");
    Ok(entry)
}
