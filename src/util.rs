use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// RFC3339 second-precision timestamp for manifest fields.
pub fn timestamp_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Filename-safe timestamp used in run ids and manifest names.
pub fn timestamp_compact(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to hash file: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let mut data = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;
    data.push('\n');
    fs::write(path, data).with_context(|| format!("failed to write json file: {}", path.display()))
}

/// Length of a string with every whitespace character removed. Scanned pages
/// are padded with OCR whitespace, so raw length overstates how much readable
/// text a page actually carries.
pub fn compact_len(input: &str) -> usize {
    input.chars().filter(|ch| !ch.is_whitespace()).count()
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &input[..byte_index],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::{compact_len, truncate_chars};

    #[test]
    fn compact_len_ignores_all_whitespace_kinds() {
        assert_eq!(compact_len(" a\tb\nc  d "), 4);
        assert_eq!(compact_len("   \n\t"), 0);
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("피고인은", 2), "피고");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
