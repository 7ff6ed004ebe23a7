use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents a cell value with type information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    DateTime(String), // ISO 8601 format
    Error(String),
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl CellValue {
    /// True when the cell holds no value at all
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True when the cell is empty or only holds whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Plain text rendering. Integral numbers print without a decimal point
    /// so that codes and quantities survive a round trip through text.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::DateTime(dt) => dt.clone(),
            CellValue::Error(e) => format!("#{}", e),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// In-memory grid of the first sheet. Rows and columns are 1-based.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    rows: Vec<Vec<CellValue>>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl SheetGrid {
    pub fn get(&self, row: u32, col: u32) -> &CellValue {
        if row == 0 || col == 0 {
            return &EMPTY_CELL;
        }
        self.rows
            .get(row as usize - 1)
            .and_then(|r| r.get(col as usize - 1))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn set(&mut self, row: u32, col: u32, value: CellValue) {
        if row == 0 || col == 0 {
            return;
        }
        let (r, c) = (row as usize - 1, col as usize - 1);
        if self.rows.len() <= r {
            self.rows.resize_with(r + 1, Vec::new);
        }
        let cells = &mut self.rows[r];
        if cells.len() <= c {
            cells.resize_with(c + 1, CellValue::default);
        }
        cells[c] = value;
    }

    /// Remove a row, shifting everything below it up by one
    pub fn remove_row(&mut self, row: u32) {
        if row >= 1 && (row as usize) <= self.rows.len() {
            self.rows.remove(row as usize - 1);
        }
    }

    /// Highest row holding at least one non-empty cell
    pub fn max_row(&self) -> u32 {
        self.rows
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_empty()))
            .map(|idx| idx as u32 + 1)
            .unwrap_or(0)
    }

    /// Highest column holding at least one non-empty cell
    pub fn max_col(&self) -> u32 {
        self.rows
            .iter()
            .filter_map(|r| r.iter().rposition(|c| !c.is_empty()))
            .max()
            .map(|idx| idx as u32 + 1)
            .unwrap_or(0)
    }
}

/// Where the data region of an order sheet starts and which column bounds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub column: String,
    pub keyword: String,
}

impl Default for RegionSpec {
    fn default() -> Self {
        Self {
            column: "G".to_string(),
            keyword: "発注数量".to_string(),
        }
    }
}

/// Contiguous row span holding the order records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRegion {
    pub min_row: u32,
    pub max_row: u32,
}

impl DataRegion {
    pub fn rows(&self) -> std::ops::RangeInclusive<u32> {
        self.min_row..=self.max_row
    }
}

/// (id, yyyymmdd) pairs read from the data region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatePairs {
    pub pairs: Vec<(String, String)>,
    /// Coordinates of non-empty date cells no accepted format could parse
    pub unparseable: Vec<String>,
}

/// A single cell modification waiting to be saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
}

// ==================== Validation Types ====================

/// Validation categories, declared in the order the rules run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidationCategory {
    Sheets,
    Title,
    CellCheck,
    EmptyCells,
    UnparseableDates,
    DateMismatch,
    PastDate,
}

impl ValidationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCategory::Sheets => "sheets",
            ValidationCategory::Title => "title",
            ValidationCategory::CellCheck => "cell_check",
            ValidationCategory::EmptyCells => "empty_cells",
            ValidationCategory::UnparseableDates => "unparseable-dates",
            ValidationCategory::DateMismatch => "date-mismatch",
            ValidationCategory::PastDate => "past-date",
        }
    }
}

/// Offending detail recorded for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorDetail {
    Message(String),
    Items(Vec<String>),
    Fields(BTreeMap<String, String>),
}

/// Accumulated validation failures. Empty means the document is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    entries: BTreeMap<ValidationCategory, ErrorDetail>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: ValidationCategory, detail: ErrorDetail) {
        self.entries.insert(category, detail);
    }

    pub fn get(&self, category: ValidationCategory) -> Option<&ErrorDetail> {
        self.entries.get(&category)
    }

    pub fn contains(&self, category: ValidationCategory) -> bool {
        self.entries.contains_key(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ValidationCategory, &ErrorDetail)> {
        self.entries.iter()
    }
}

// ==================== Errors ====================

/// Excel-specific errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcelError {
    pub message: String,
    pub error_type: ExcelErrorType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExcelErrorType {
    FileNotFound,
    InvalidFormat,
    InvalidReference,
    RegionNotFound,
    WorkbookClosed,
    ReadError,
    WriteError,
    WatchError,
}

impl std::fmt::Display for ExcelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExcelError {}

impl ExcelError {
    pub fn new(message: impl Into<String>, error_type: ExcelErrorType) -> Self {
        ExcelError {
            message: message.into(),
            error_type,
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        ExcelError::new(format!("File not found: {}", path), ExcelErrorType::FileNotFound)
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::InvalidFormat)
    }

    pub fn invalid_reference(reference: &str) -> Self {
        ExcelError::new(
            format!("Invalid cell reference: {}", reference),
            ExcelErrorType::InvalidReference,
        )
    }

    pub fn region_not_found(column: &str, keyword: &str) -> Self {
        ExcelError::new(
            format!("Keyword '{}' not found in column {}", keyword, column),
            ExcelErrorType::RegionNotFound,
        )
    }

    pub fn closed(path: &str) -> Self {
        ExcelError::new(
            format!("Workbook already closed: {}", path),
            ExcelErrorType::WorkbookClosed,
        )
    }

    pub fn read_error(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::ReadError)
    }

    pub fn write_error(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::WriteError)
    }

    pub fn watch_error(message: impl Into<String>) -> Self {
        ExcelError::new(message, ExcelErrorType::WatchError)
    }
}
