use encoding_rs::SHIFT_JIS;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::key::build_key;
use super::MergeError;

/// Most recently modified regular file in `dir`
pub fn latest_file(dir: &Path) -> Result<PathBuf, MergeError> {
    let mut latest: Option<(SystemTime, PathBuf)> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if latest.as_ref().map_or(true, |(time, _)| modified > *time) {
            latest = Some((modified, entry.path()));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| MergeError::NoExport(dir.to_path_buf()))
}

/// Read a Shift_JIS portal export into normalized key → value. Later rows
/// win on duplicate keys.
pub fn read_export(
    path: &Path,
    key_columns: &[String],
    value_column: &str,
) -> Result<HashMap<String, String>, MergeError> {
    let bytes = std::fs::read(path)?;
    let (text, _, had_errors) = SHIFT_JIS.decode(&bytes);
    if had_errors {
        warn!(file = %path.display(), "export contained bytes outside Shift_JIS");
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let index_of = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| MergeError::MissingColumn(name.to_string()))
    };

    let key_indices = key_columns
        .iter()
        .map(|name| index_of(name))
        .collect::<Result<Vec<usize>, MergeError>>()?;
    let value_index = index_of(value_column)?;

    let mut lookup = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let key = build_key(key_indices.iter().map(|&idx| record.get(idx).unwrap_or("")));
        let value = record.get(value_index).unwrap_or("").to_string();
        lookup.insert(key, value);
    }

    debug!(file = %path.display(), keys = lookup.len(), "read portal export");
    Ok(lookup)
}
