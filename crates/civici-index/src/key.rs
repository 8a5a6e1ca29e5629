//! Shard key normalization
//!
//! A shard key is the file stem of a `comuni/` or `strade/` artifact. The web
//! UI derives the same key from the names the user picks, with
//! `name.toUpperCase().replace(/[^A-Z0-9_\-]/g, '_')`, so [`normalize`] has to
//! produce exactly what that expression produces:
//!
//! - full Unicode uppercasing (`ß` becomes `SS`);
//! - every character outside `[A-Z0-9_-]` becomes `_`;
//! - a character outside the Basic Multilingual Plane becomes one `_` per
//!   UTF-16 code unit, i.e. two, because the UI's regex runs on code units.
//!
//! Changing this function breaks every already-deployed UI.

use serde::Serialize;
use std::fmt;

/// Separator placed between province and comune before normalizing.
pub const COMUNE_KEY_SEPARATOR: char = '_';

/// Normalized, filesystem-safe shard identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ShardKey(String);

impl ShardKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the shard artifact
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for ShardKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ShardKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize free text into a shard key string. Total and idempotent.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars().flat_map(char::to_uppercase) {
        if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            out.push(c);
        } else {
            for _ in 0..c.len_utf16() {
                out.push('_');
            }
        }
    }
    out
}

/// Key of the `comuni/` shard listing the comuni of a province
pub fn province_key(provincia: &str) -> ShardKey {
    ShardKey(normalize(provincia))
}

/// Key of the `strade/` shard holding the streets of a comune
pub fn comune_key(provincia: &str, comune: &str) -> ShardKey {
    let mut joined = String::with_capacity(provincia.len() + comune.len() + 1);
    joined.push_str(provincia);
    joined.push(COMUNE_KEY_SEPARATOR);
    joined.push_str(comune);
    ShardKey(normalize(&joined))
}
