use chrono::{DateTime, Local};
use std::path::PathBuf;

use crate::excel::{ErrorDetail, ValidationErrors};
use crate::portal::UploadOutcome;

/// Column order of the audit CSV
pub const AUDIT_HEADER: [&str; 10] = [
    "Timestamp",
    "FilePath",
    "FolderPath",
    "SavePath",
    "Name",
    "ValidationSuccess",
    "ValidationErrors",
    "UploadSuccess",
    "UploadError",
    "NewCsvPath",
];

/// Everything known about one processing attempt when it ends
#[derive(Debug, Clone, Default)]
pub struct ProcessRecord {
    pub file_path: PathBuf,
    pub folder_path: PathBuf,
    /// Upload sheet handed to the portal
    pub save_path: Option<PathBuf>,
    pub name: String,
    /// `None` when the attempt aborted before validation finished
    pub validation: Option<ValidationErrors>,
    pub upload: Option<UploadOutcome>,
    /// Portal export after it was moved into the batch folder
    pub new_csv_path: Option<PathBuf>,
    /// Error that aborted the attempt
    pub failure: Option<String>,
}

impl ProcessRecord {
    pub fn new(file_path: PathBuf, folder_path: PathBuf) -> Self {
        Self {
            file_path,
            folder_path,
            ..Self::default()
        }
    }

    pub fn validation_passed(&self) -> bool {
        self.validation.as_ref().is_some_and(ValidationErrors::is_empty)
    }

    /// One CSV row in [`AUDIT_HEADER`] order. Upload columns stay blank
    /// unless validation passed.
    pub fn to_row(&self, timestamp: DateTime<Local>) -> [String; 10] {
        let validation_errors = match &self.validation {
            Some(errors) => flatten_errors(errors),
            None => self.failure.clone().unwrap_or_default(),
        };

        let (upload_success, upload_error, new_csv_path) = if self.validation_passed() {
            let success = match &self.upload {
                Some(outcome) => yes_no(outcome.is_success()).to_string(),
                None if self.failure.is_some() => yes_no(false).to_string(),
                None => String::new(),
            };
            let error = self
                .upload
                .as_ref()
                .and_then(|outcome| outcome.error_text().map(str::to_string))
                .or_else(|| self.failure.clone())
                .unwrap_or_default();
            (success, error, display(&self.new_csv_path))
        } else {
            (String::new(), String::new(), String::new())
        };

        [
            timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.file_path.display().to_string(),
            self.folder_path.display().to_string(),
            display(&self.save_path),
            self.name.clone(),
            yes_no(self.validation_passed()).to_string(),
            validation_errors,
            upload_success,
            upload_error,
            new_csv_path,
        ]
    }
}

/// `key=value` per category, `key:sub=value` per keyed entry, joined by `; `
pub fn flatten_errors(errors: &ValidationErrors) -> String {
    let mut parts = Vec::new();
    for (category, detail) in errors.iter() {
        let key = category.as_str();
        match detail {
            ErrorDetail::Message(message) => parts.push(format!("{}={}", key, message)),
            ErrorDetail::Items(items) => parts.push(format!("{}={}", key, items.join(" "))),
            ErrorDetail::Fields(fields) => {
                for (sub, value) in fields {
                    parts.push(format!("{}:{}={}", key, sub, value));
                }
            }
        }
    }
    parts.join("; ")
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn display(path: &Option<PathBuf>) -> String {
    path.as_ref().map(|p| p.display().to_string()).unwrap_or_default()
}
