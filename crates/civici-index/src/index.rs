//! In-memory indices built during the streaming phase
//!
//! Three differently shaped structures, each with its own dedup rule:
//!
//! | Index           | Key                     | Value                              | Dedup        |
//! |-----------------|-------------------------|------------------------------------|--------------|
//! | [`RegionIndex`] | region name             | set of province names              | by value     |
//! | [`ProvinceIndex`] | province shard key    | set of comune names                | by value     |
//! | [`StreetIndex`] | province+comune key     | street name -> civic entries        | none         |
//!
//! The [`IndexBuilder`] owns them exclusively while rows arrive.
//! [`IndexBuilder::finish`] sorts what still needs sorting and hands back
//! read-only [`Indices`] for the writer.

use crate::classify::RawRecord;
use crate::key::{self, ShardKey};
use crate::natural;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use tracing::warn;

/// One street address: civic number plus optional status code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CivicEntry {
    pub civico: String,
    pub barrato: Option<String>,
}

/// Region name -> province names
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegionIndex(BTreeMap<String, BTreeSet<String>>);

impl RegionIndex {
    pub fn insert(&mut self, regione: &str, provincia: &str) {
        insert_name(&mut self.0, regione, provincia);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn provinces(&self, regione: &str) -> Option<&BTreeSet<String>> {
        self.0.get(regione)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// Province shard key -> comune names
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvinceIndex(BTreeMap<ShardKey, BTreeSet<String>>);

impl ProvinceIndex {
    pub fn insert(&mut self, key: ShardKey, comune: &str) {
        insert_name(&mut self.0, key, comune);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn comuni(&self, key: &ShardKey) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShardKey, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// Streets of one comune, each with its civic entries
pub type StreetShard = BTreeMap<String, Vec<CivicEntry>>;

/// Province+comune shard key -> street shard
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreetIndex(BTreeMap<ShardKey, StreetShard>);

impl StreetIndex {
    pub fn push(&mut self, key: ShardKey, strada: &str, entry: CivicEntry) {
        let streets = self.0.entry(key).or_default();
        match streets.get_mut(strada) {
            Some(entries) => entries.push(entry),
            None => {
                streets.insert(strada.to_string(), vec![entry]);
            },
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shard(&self, key: &ShardKey) -> Option<&StreetShard> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShardKey, &StreetShard)> {
        self.0.iter()
    }

    /// Total civic entries across all shards
    pub fn entry_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|streets| streets.values())
            .map(Vec::len)
            .sum()
    }

    fn sort_entries(&mut self) {
        for entries in self.0.values_mut().flat_map(|streets| streets.values_mut()) {
            natural::sort_by_key(entries, |entry| entry.civico.as_str());
        }
    }
}

/// Add `name` to the set under `key` without allocating when both exist.
fn insert_name<K, Q>(map: &mut BTreeMap<K, BTreeSet<String>>, key: Q, name: &str)
where
    K: Ord + std::borrow::Borrow<str>,
    Q: AsRef<str> + Into<K>,
{
    match map.get_mut(key.as_ref()) {
        Some(names) => {
            if !names.contains(name) {
                names.insert(name.to_string());
            }
        },
        None => {
            map.insert(key.into(), BTreeSet::from([name.to_string()]));
        },
    }
}

/// Which shard family a collision happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Province,
    Comune,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Province => write!(f, "province"),
            KeyKind::Comune => write!(f, "comune"),
        }
    }
}

/// Two different source names normalized to the same shard key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct KeyCollision {
    pub kind: KeyKind,
    pub key: String,
    /// Name that created the shard
    pub first: String,
    /// Later name merged into it
    pub other: String,
}

/// First source name seen per shard key; records later mismatches once.
#[derive(Debug, Default)]
struct KeyRegistry {
    provinces: HashMap<ShardKey, String>,
    comuni: HashMap<ShardKey, String>,
    collisions: BTreeSet<KeyCollision>,
}

impl KeyRegistry {
    /// `parts` are the source names the key was derived from.
    fn observe(&mut self, kind: KeyKind, key: &ShardKey, parts: &[&str]) {
        let origins = match kind {
            KeyKind::Province => &mut self.provinces,
            KeyKind::Comune => &mut self.comuni,
        };

        match origins.get(key) {
            Some(first) if joined_eq(first, parts) => {},
            Some(first) => {
                let collision = KeyCollision {
                    kind,
                    key: key.to_string(),
                    first: first.clone(),
                    other: parts.join(SOURCE_SEPARATOR),
                };
                if !self.collisions.contains(&collision) {
                    warn!(
                        kind = %kind,
                        key = %key,
                        first = %collision.first,
                        other = %collision.other,
                        "Distinct names share a shard key; merging into one shard"
                    );
                    self.collisions.insert(collision);
                }
            },
            None => {
                origins.insert(key.clone(), parts.join(SOURCE_SEPARATOR));
            },
        }
    }
}

const SOURCE_SEPARATOR: &str = "/";

/// `joined == parts.join(SOURCE_SEPARATOR)` without allocating
fn joined_eq(joined: &str, parts: &[&str]) -> bool {
    let mut rest = joined;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            match rest.strip_prefix(SOURCE_SEPARATOR) {
                Some(tail) => rest = tail,
                None => return false,
            }
        }
        match rest.strip_prefix(part) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }
    rest.is_empty()
}

/// Per-row contribution counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Data rows offered to the builder
    pub data_rows: u64,
    /// Rows that had both regione and provincia
    pub region_rows: u64,
    /// Rows that had both provincia and comune
    pub province_rows: u64,
    /// Rows that had provincia, comune, strada and civico
    pub street_rows: u64,
    /// Rows that contributed to no index at all
    pub ignored_rows: u64,
}

/// Accumulates the three indices from a stream of records
#[derive(Debug, Default)]
pub struct IndexBuilder {
    regions: RegionIndex,
    provinces: ProvinceIndex,
    streets: StreetIndex,
    keys: KeyRegistry,
    stats: BuildStats,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one record according to the presence rules of each index
    pub fn apply(&mut self, record: &RawRecord<'_>) {
        self.stats.data_rows += 1;
        let mut contributed = false;

        if let (Some(regione), Some(provincia)) = (record.regione, record.provincia) {
            self.regions.insert(regione, provincia);
            self.stats.region_rows += 1;
            contributed = true;
        }

        if let (Some(provincia), Some(comune)) = (record.provincia, record.comune) {
            let key = key::province_key(provincia);
            self.keys.observe(KeyKind::Province, &key, &[provincia]);
            self.provinces.insert(key, comune);
            self.stats.province_rows += 1;
            contributed = true;

            if let (Some(strada), Some(civico)) = (record.strada, record.civico) {
                let key = key::comune_key(provincia, comune);
                self.keys.observe(KeyKind::Comune, &key, &[provincia, comune]);
                self.streets.push(
                    key,
                    strada,
                    CivicEntry {
                        civico: civico.to_string(),
                        barrato: record.barrato.map(str::to_string),
                    },
                );
                self.stats.street_rows += 1;
            }
        }

        if !contributed {
            self.stats.ignored_rows += 1;
        }
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// End accumulation: sort civic lists and freeze the indices
    pub fn finish(mut self) -> Indices {
        self.streets.sort_entries();
        Indices {
            regions: self.regions,
            provinces: self.provinces,
            streets: self.streets,
            collisions: self.keys.collisions.into_iter().collect(),
            stats: self.stats,
        }
    }
}

/// Finished, read-only indices
#[derive(Debug, Default)]
pub struct Indices {
    pub regions: RegionIndex,
    pub provinces: ProvinceIndex,
    pub streets: StreetIndex,
    pub collisions: Vec<KeyCollision>,
    pub stats: BuildStats,
}
