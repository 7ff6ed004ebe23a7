//! Excel module for the purchase-order workbooks.
//!
//! This module provides:
//! - Loading a workbook into memory and saving edits back with formatting kept
//! - The order-sheet validation checklist
//! - Building the portal upload sheet
//! - Watching the drop folder for new workbooks

pub mod types;
pub mod reader;
pub mod dates;
pub mod writer;
pub mod workbook;
pub mod validator;
pub mod upload;
pub mod watcher;

// Re-export commonly used types and functions
pub use types::*;
pub use workbook::{ColumnMap, OrderWorkbook};
pub use validator::{load_reference_dates, validate_order_workbook, ReferenceDates};
pub use upload::{build_upload_workbook, UPLOAD_HEADERS};
pub use watcher::{move_into_folder, DetectedFile, FolderWatcher};
