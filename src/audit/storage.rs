use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::types::{ProcessRecord, AUDIT_HEADER};
use super::AuditError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Append-only CSV log of processing attempts
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. A new file gets a UTF-8 BOM and the header first.
    pub fn append(&self, record: &ProcessRecord, timestamp: DateTime<Local>) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let is_new = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if is_new {
            file.write_all(UTF8_BOM)?;
        }

        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(AUDIT_HEADER)?;
        }
        writer.write_record(record.to_row(timestamp).iter().map(|field| field.replace(',', " ")))?;
        writer.flush()?;

        debug!(log = %self.path.display(), file = %record.file_path.display(), "audit row written");
        Ok(())
    }
}
