use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use super::types::*;

/// Sheet names plus the grid of the first sheet
#[derive(Debug, Clone)]
pub struct LoadedWorkbook {
    pub sheet_names: Vec<String>,
    pub grid: SheetGrid,
}

/// Open a workbook and load its first sheet into memory
pub fn load_workbook(path: &Path) -> Result<LoadedWorkbook, ExcelError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(ExcelError::file_not_found(&display));
    }

    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| ExcelError::read_error(format!("Failed to open workbook {}: {}", display, e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| ExcelError::invalid_format(format!("Workbook {} has no sheets", display)))?;

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| ExcelError::read_error(format!("Failed to read sheet '{}': {}", first, e)))?;

    Ok(LoadedWorkbook {
        sheet_names,
        grid: range_to_grid(&range),
    })
}

/// Copy a calamine range into a grid addressed by absolute sheet coordinates
fn range_to_grid(range: &Range<Data>) -> SheetGrid {
    let mut grid = SheetGrid::default();
    let (start_row, start_col) = match range.start() {
        Some(start) => start,
        None => return grid,
    };

    for (row, col, cell) in range.used_cells() {
        let value = convert_cell_value(Some(cell));
        if value.is_empty() {
            continue;
        }
        grid.set(start_row + row as u32 + 1, start_col + col as u32 + 1, value);
    }

    grid
}

/// Convert calamine Data to our CellValue
fn convert_cell_value(cell: Option<&Data>) -> CellValue {
    match cell {
        None => CellValue::Empty,
        Some(data) => match data {
            Data::Empty => CellValue::Empty,
            Data::String(s) => CellValue::String(s.clone()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Boolean(*b),
            Data::DateTime(dt) => {
                let f = dt.as_f64();
                match format_excel_datetime(f) {
                    Some(iso) => CellValue::DateTime(iso),
                    None => CellValue::Number(f),
                }
            }
            Data::DateTimeIso(s) => CellValue::DateTime(s.clone()),
            Data::DurationIso(s) => CellValue::String(s.clone()),
            Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        },
    }
}

/// Format Excel datetime (days since 1899-12-30) to ISO 8601
fn format_excel_datetime(value: f64) -> Option<String> {
    // Round on the whole value so a fraction close to 1 rolls into the next day
    let total_seconds = (value * 86400.0).round() as i64;

    let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let datetime = epoch.checked_add_signed(chrono::Duration::seconds(total_seconds))?;

    Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Convert column index (0-based) to Excel column letter (A, B, ..., Z, AA, AB, ...)
pub fn column_index_to_letter(index: u32) -> String {
    let mut result = String::new();
    let mut n = index + 1;

    while n > 0 {
        n -= 1;
        let c = (b'A' + (n % 26) as u8) as char;
        result.insert(0, c);
        n /= 26;
    }

    result
}

/// Convert a column letter to its 1-based number ("A" -> 1, "AA" -> 27)
pub fn column_number(letters: &str) -> Result<u32, ExcelError> {
    let letters = letters.trim();
    if letters.is_empty() || letters.len() > 3 || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ExcelError::invalid_reference(letters));
    }

    Ok(letters
        .chars()
        .fold(0u32, |acc, c| acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)))
}

/// A1-style coordinate from 1-based row and column
pub fn coordinate(row: u32, col: u32) -> String {
    format!("{}{}", column_index_to_letter(col.saturating_sub(1)), row)
}

fn cell_ref_regex() -> Option<&'static Regex> {
    static CELL_REF: OnceLock<Option<Regex>> = OnceLock::new();
    CELL_REF
        .get_or_init(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").ok())
        .as_ref()
}

/// Parse "L6" into (row, col), both 1-based
pub fn parse_cell_ref(reference: &str) -> Result<(u32, u32), ExcelError> {
    let caps = cell_ref_regex()
        .and_then(|re| re.captures(reference.trim()))
        .ok_or_else(|| ExcelError::invalid_reference(reference))?;

    let col = column_number(&caps[1])?;
    let row: u32 = caps[2]
        .parse()
        .map_err(|_| ExcelError::invalid_reference(reference))?;
    if row == 0 {
        return Err(ExcelError::invalid_reference(reference));
    }

    Ok((row, col))
}

/// Expand "L6" or "A1:B3" into every (row, col) it covers, row by row
pub fn expand_reference(reference: &str) -> Result<Vec<(u32, u32)>, ExcelError> {
    match reference.split_once(':') {
        None => Ok(vec![parse_cell_ref(reference)?]),
        Some((from, to)) => {
            let (r1, c1) = parse_cell_ref(from)?;
            let (r2, c2) = parse_cell_ref(to)?;
            let mut cells = Vec::new();
            for row in r1.min(r2)..=r1.max(r2) {
                for col in c1.min(c2)..=c1.max(c2) {
                    cells.push((row, col));
                }
            }
            Ok(cells)
        }
    }
}
