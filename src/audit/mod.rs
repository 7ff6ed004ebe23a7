//! CSV audit trail, one row per processed workbook.

pub mod storage;
pub mod types;

use thiserror::Error;

pub use storage::AuditLog;
pub use types::{flatten_errors, ProcessRecord, AUDIT_HEADER};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to write audit log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode audit row: {0}")]
    Csv(#[from] csv::Error),
}
