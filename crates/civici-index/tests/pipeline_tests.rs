//! End-to-end tests for the index pipeline
//!
//! These run the library against real files in temporary directories:
//! - Output layout and exact shard contents
//! - Deterministic output across runs
//! - Fatal header errors leaving previous output untouched
//! - Shard write isolation with a failing store

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use civici_common::checksum::sha256_hex;
use civici_index::writer::{COMUNI_DIR, MANIFEST_FILE, REGIONS_FILE, STRADE_DIR};
use civici_index::key::{comune_key, province_key};
use civici_index::{FsShardStore, IndexConfig, IndexError, Pipeline, PipelineState, ShardStore};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const PREAMBLE: &str = "\
Archivio nazionale numeri civici,,,,,
Estrazione di prova,,,,,
,,,,,
";

const HEADER: &str = "id,regione,provincia,comune,strada,civico,barrato\n";

const ROWS: &str = "\
1,Piemonte,Torino,Ivrea,VIA ROMA,10,
2,Piemonte,Torino,Ivrea,VIA ROMA,2,B
3,Piemonte,Torino,Ivrea,VIA ROMA,1/A,
4,Piemonte,Torino,Ivrea,PIAZZA OTTINETTI,5,
5,Piemonte,Torino,Chieri,VIA VITTORIO EMANUELE,7,
6,Piemonte,Cuneo,Alba,,,
7,Valle d'Aosta,Aosta,Aosta,VIA CHAMBERY,3,
8,Piemonte,Torino,Ivrea,VIA ROMA,2,B
";

struct Fixture {
    dir: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Fixture {
    fn new(contents: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("civici.csv");
        std::fs::write(&input, contents).unwrap();
        let output = dir.path().join("public").join("data");
        Self { dir, input, output }
    }

    fn config(&self) -> IndexConfig {
        IndexConfig::builder()
            .input(&self.input)
            .output_dir(&self.output)
            .concurrency(4)
            .show_progress(false)
            .build()
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.output.join(relative)).unwrap()
    }

    fn json(&self, relative: &str) -> serde_json::Value {
        serde_json::from_str(&self.read(relative)).unwrap()
    }
}

fn full_input() -> String {
    format!("{PREAMBLE}{HEADER}{ROWS}")
}

/// Every file below `root`, keyed by relative path
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_full_run_produces_expected_shards() {
    let fixture = Fixture::new(&full_input());
    let mut pipeline = Pipeline::new(fixture.config());
    let summary = pipeline.run().await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert!(summary.is_success());
    assert_eq!(summary.rows_read, 12);
    assert_eq!(summary.stats.data_rows, 8);
    assert_eq!(summary.regions, 2);
    assert!(summary.collisions.is_empty());

    assert_eq!(
        fixture.json(REGIONS_FILE),
        serde_json::json!({
            "Piemonte": ["Cuneo", "Torino"],
            "Valle d'Aosta": ["Aosta"]
        })
    );
    assert_eq!(fixture.json("comuni/TORINO.json"), serde_json::json!(["Chieri", "Ivrea"]));
    assert_eq!(fixture.json("comuni/CUNEO.json"), serde_json::json!(["Alba"]));

    assert_eq!(
        fixture.json("strade/TORINO_IVREA.json"),
        serde_json::json!({
            "PIAZZA OTTINETTI": [{ "civico": "5", "barrato": null }],
            "VIA ROMA": [
                { "civico": "1/A", "barrato": null },
                { "civico": "2", "barrato": "B" },
                { "civico": "2", "barrato": "B" },
                { "civico": "10", "barrato": null }
            ]
        })
    );
}

#[tokio::test]
async fn test_every_street_shard_is_reachable_from_regions() {
    let fixture = Fixture::new(&full_input());
    Pipeline::new(fixture.config()).run().await.unwrap();

    let regions: BTreeMap<String, Vec<String>> =
        serde_json::from_value(fixture.json(REGIONS_FILE)).unwrap();

    let mut reachable = Vec::new();
    for provinces in regions.values() {
        for provincia in provinces {
            let shard = format!("{}/{}", COMUNI_DIR, province_key(provincia).file_name());
            let comuni: Vec<String> = serde_json::from_value(fixture.json(&shard)).unwrap();
            for comune in comuni {
                reachable.push(format!("{}/{}", STRADE_DIR, comune_key(provincia, &comune).file_name()));
            }
        }
    }

    let files = snapshot(&fixture.output);
    let strade: Vec<&String> = files.keys().filter(|p| p.starts_with("strade/")).collect();
    assert_eq!(strade.len(), 3);
    for shard in strade {
        assert!(reachable.contains(shard), "{shard} is not reachable");
    }
    // A comune without streets is listed but has no street shard
    assert!(reachable.contains(&"strade/CUNEO_ALBA.json".to_string()));
    assert!(!files.contains_key("strade/CUNEO_ALBA.json"));
}

#[tokio::test]
async fn test_output_is_byte_identical_across_runs() {
    let fixture = Fixture::new(&full_input());

    Pipeline::new(fixture.config()).run().await.unwrap();
    let first = snapshot(&fixture.output);

    let mut config = fixture.config();
    config.concurrency = 1;
    Pipeline::new(config).run().await.unwrap();
    let second = snapshot(&fixture.output);

    assert_eq!(first, second);
    assert!(first.contains_key(MANIFEST_FILE));
}

#[tokio::test]
async fn test_manifest_checksums_match_written_files() {
    let fixture = Fixture::new(&full_input());
    Pipeline::new(fixture.config()).run().await.unwrap();

    let manifest = fixture.json(MANIFEST_FILE);
    assert_eq!(manifest["regions"], 2);
    assert_eq!(manifest["comuni_shards"], 3);
    assert_eq!(manifest["failed"], 0);

    let files = manifest["files"].as_array().unwrap();
    assert_eq!(files.len(), 1 + 3 + 3);
    for file in files {
        let path = fixture.output.join(file["path"].as_str().unwrap());
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(file["sha256"].as_str().unwrap(), sha256_hex(&bytes));
    }
}

#[tokio::test]
async fn test_gzip_input_matches_plain_input() {
    let plain = Fixture::new(&full_input());
    Pipeline::new(plain.config()).run().await.unwrap();

    let gz = Fixture::new("");
    let gz_input = gz.dir.path().join("civici.csv.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(full_input().as_bytes()).unwrap();
    std::fs::write(&gz_input, encoder.finish().unwrap()).unwrap();

    let mut config = gz.config();
    config.input = gz_input;
    Pipeline::new(config).run().await.unwrap();

    assert_eq!(snapshot(&plain.output), snapshot(&gz.output));
}

#[tokio::test]
async fn test_semicolon_delimited_input() {
    let input = full_input().replace(',', ";");
    let fixture = Fixture::new(&input);
    let mut config = fixture.config();
    config.delimiter = b';';

    let summary = Pipeline::new(config).run().await.unwrap();
    assert_eq!(summary.write.strade_written, 3);
}

#[tokio::test]
async fn test_header_only_input_writes_empty_regions() {
    let fixture = Fixture::new(&format!("{PREAMBLE}{HEADER}"));
    let summary = Pipeline::new(fixture.config()).run().await.unwrap();

    assert!(summary.is_success());
    assert_eq!(fixture.read(REGIONS_FILE), "{}");
    assert!(fixture.output.join(COMUNI_DIR).is_dir());
    assert!(fixture.output.join(STRADE_DIR).is_dir());
    assert_eq!(std::fs::read_dir(fixture.output.join(STRADE_DIR)).unwrap().count(), 0);
}

// ============================================================================
// Preamble and Header Handling
// ============================================================================

#[tokio::test]
async fn test_header_lookalike_in_preamble_is_ignored() {
    let input = format!("{HEADER},,,,,\n,,,,,\nregione,provincia,comune,strada,civico,barrato\nLazio,Roma,Roma,VIA APPIA,1,\n");
    let fixture = Fixture::new(&input);
    let summary = Pipeline::new(fixture.config()).run().await.unwrap();

    assert_eq!(summary.stats.data_rows, 1);
    assert_eq!(fixture.json(REGIONS_FILE), serde_json::json!({ "Lazio": ["Roma"] }));
}

#[tokio::test]
async fn test_missing_column_is_fatal_and_leaves_output_alone() {
    let fixture = Fixture::new(&full_input().replace(",civico,", ",numero,"));
    std::fs::create_dir_all(&fixture.output).unwrap();
    std::fs::write(fixture.output.join(REGIONS_FILE), "previous").unwrap();

    let mut pipeline = Pipeline::new(fixture.config());
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, IndexError::MissingColumns { row: 3, .. }));
    assert!(err.to_string().contains("civico"));
    assert_eq!(pipeline.state(), PipelineState::Fatal);
    assert_eq!(fixture.read(REGIONS_FILE), "previous");
    assert!(!fixture.output.join(STRADE_DIR).exists());
}

#[tokio::test]
async fn test_input_shorter_than_preamble_is_fatal() {
    let fixture = Fixture::new("solo una riga\n");
    let mut pipeline = Pipeline::new(fixture.config());
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, IndexError::HeaderNotFound { header_row: 3, rows_read: 1 }));
    assert_eq!(pipeline.state(), PipelineState::Fatal);
    assert!(!fixture.output.exists());
}

#[tokio::test]
async fn test_missing_input_file_aborts() {
    let fixture = Fixture::new("");
    let mut config = fixture.config();
    config.input = fixture.dir.path().join("absent.csv");

    let mut pipeline = Pipeline::new(config);
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, IndexError::Open { .. }));
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert!(!fixture.output.exists());
}

#[tokio::test]
async fn test_corrupt_gzip_aborts_without_output() {
    let fixture = Fixture::new("");
    let input = fixture.dir.path().join("civici.csv.gz");
    std::fs::write(&input, b"definitely not gzip").unwrap();
    let mut config = fixture.config();
    config.input = input;

    let mut pipeline = Pipeline::new(config);
    let err = pipeline.run().await.unwrap_err();

    assert!(matches!(err, IndexError::Input { .. }));
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert!(!fixture.output.exists());
}

#[tokio::test]
async fn test_truncated_gzip_discards_accumulated_rows() {
    let mut plain = format!("{PREAMBLE}{HEADER}");
    for i in 0..20_000 {
        plain.push_str(&format!("{i},Piemonte,Torino,Ivrea,VIA ROMA {},{i},\n", i % 97));
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let fixture = Fixture::new("");
    let input = fixture.dir.path().join("civici.csv.gz");
    std::fs::write(&input, &compressed[..compressed.len() / 2]).unwrap();
    let mut config = fixture.config();
    config.input = input;

    let mut pipeline = Pipeline::new(config);
    match pipeline.run().await {
        Err(IndexError::Input { row, .. }) => assert!(row > 4, "failed at row {row}"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(pipeline.state(), PipelineState::Aborted);
    assert!(!fixture.output.exists());
}

#[tokio::test]
async fn test_output_containing_input_is_rejected() {
    let fixture = Fixture::new(&full_input());
    let mut config = fixture.config();
    config.output_dir = fixture.dir.path().to_path_buf();

    let err = Pipeline::new(config).run().await.unwrap_err();
    assert!(matches!(err, IndexError::Config(_)));
    assert!(fixture.input.exists());
}

// ============================================================================
// Output Reset
// ============================================================================

#[tokio::test]
async fn test_stale_shards_are_removed() {
    let fixture = Fixture::new(&full_input());
    let stale = fixture.output.join(STRADE_DIR).join("GONE_GONE.json");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "{}").unwrap();

    Pipeline::new(fixture.config()).run().await.unwrap();

    assert!(!stale.exists());
    assert!(fixture.output.join("strade/TORINO_IVREA.json").exists());
}

// ============================================================================
// Key Collisions
// ============================================================================

#[tokio::test]
async fn test_colliding_comuni_merge_into_one_shard() {
    let rows = "\
1,Piemonte,Torino,San Mauro,VIA A,1,
2,Piemonte,Torino,San-Mauro,VIA B,2,
";
    let fixture = Fixture::new(&format!("{PREAMBLE}{HEADER}{rows}"));
    let summary = Pipeline::new(fixture.config()).run().await.unwrap();

    // '-' survives normalization
    assert!(summary.collisions.is_empty());
    assert_eq!(summary.write.strade_written, 2);

    let rows = "\
1,Piemonte,Torino,Sant'Ambrogio,VIA A,1,
2,Piemonte,Torino,Sant Ambrogio,VIA B,2,
";
    let fixture = Fixture::new(&format!("{PREAMBLE}{HEADER}{rows}"));
    let summary = Pipeline::new(fixture.config()).run().await.unwrap();

    assert_eq!(summary.collisions.len(), 1);
    assert_eq!(summary.write.strade_written, 1);
    assert_eq!(
        fixture.json("strade/TORINO_SANT_AMBROGIO.json"),
        serde_json::json!({
            "VIA A": [{ "civico": "1", "barrato": null }],
            "VIA B": [{ "civico": "2", "barrato": null }]
        })
    );
}

// ============================================================================
// Shard Write Isolation
// ============================================================================

/// Filesystem store that refuses to write selected paths
struct FailingStore {
    inner: FsShardStore,
    fail: Vec<String>,
}

#[async_trait]
impl ShardStore for FailingStore {
    async fn reset(&self, subdirs: &[&str]) -> io::Result<()> {
        self.inner.reset(subdirs).await
    }

    async fn put(&self, relative: &str, contents: Vec<u8>) -> io::Result<()> {
        if self.fail.iter().any(|p| p == relative) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "disk says no"));
        }
        self.inner.put(relative, contents).await
    }
}

/// Store whose output root cannot be prepared
struct UnresettableStore;

#[async_trait]
impl ShardStore for UnresettableStore {
    async fn reset(&self, _subdirs: &[&str]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }

    async fn put(&self, _relative: &str, _contents: Vec<u8>) -> io::Result<()> {
        unreachable!("put after failed reset")
    }
}

#[tokio::test]
async fn test_failed_shard_does_not_stop_siblings() {
    let fixture = Fixture::new(&full_input());
    let store = Arc::new(FailingStore {
        inner: FsShardStore::new(&fixture.output),
        fail: vec!["strade/TORINO_IVREA.json".to_string()],
    });

    let mut pipeline = Pipeline::with_store(fixture.config(), store);
    let summary = pipeline.run().await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert!(!summary.is_success());
    assert_eq!(summary.write.failures.len(), 1);
    assert_eq!(summary.write.failures[0].path, "strade/TORINO_IVREA.json");
    assert_eq!(summary.write.strade_written, 2);
    assert!(summary.write.regions_written);
    assert!(summary.write.manifest_written);

    assert!(!fixture.output.join("strade/TORINO_IVREA.json").exists());
    assert!(fixture.output.join("strade/TORINO_CHIERI.json").exists());

    let manifest = fixture.json(MANIFEST_FILE);
    assert_eq!(manifest["failed"], 1);
    assert_eq!(manifest["strade_shards"], 2);
}

#[tokio::test]
async fn test_unresettable_output_aborts() {
    let fixture = Fixture::new(&full_input());
    let mut pipeline = Pipeline::with_store(fixture.config(), Arc::new(UnresettableStore));

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, IndexError::Io(_)));
    assert_eq!(pipeline.state(), PipelineState::Aborted);
}

#[tokio::test]
async fn test_dyn_store_is_accepted() {
    let fixture = Fixture::new(&full_input());
    let store: Arc<dyn ShardStore> = Arc::new(FsShardStore::new(&fixture.output));

    let summary = Pipeline::with_store(fixture.config(), store).run().await.unwrap();
    assert!(summary.is_success());
}
