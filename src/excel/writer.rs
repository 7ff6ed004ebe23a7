use std::path::{Path, PathBuf};
use umya_spreadsheet::{new_file, reader, writer, Cell};

use super::types::{CellEdit, CellValue, ExcelError};

/// Re-open `source`, replay row removals and cell edits on its first sheet and
/// write the result to `target`. Cells that were never edited keep their
/// original value and formatting.
pub fn apply_edits(
    source: &Path,
    target: &Path,
    removed_rows: &[u32],
    edits: &[CellEdit],
) -> Result<PathBuf, ExcelError> {
    if !source.exists() {
        return Err(ExcelError::file_not_found(&source.display().to_string()));
    }

    let mut book = reader::xlsx::read(source)
        .map_err(|e| ExcelError::read_error(format!("Failed to open workbook: {}", e)))?;

    let worksheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| ExcelError::invalid_format("Workbook has no sheets"))?;

    // Removals are recorded in the order they were applied to the grid
    for row in removed_rows {
        worksheet.remove_row(row, &1);
    }

    for edit in edits {
        let coordinate = (edit.col, edit.row);
        if edit.value.is_empty() && worksheet.get_cell(coordinate).is_none() {
            continue;
        }
        write_cell_value(worksheet.get_cell_mut(coordinate), &edit.value);
    }

    writer::xlsx::write(&book, target)
        .map_err(|e| ExcelError::write_error(format!("Failed to save workbook: {}", e)))?;

    Ok(target.to_path_buf())
}

/// Export rows to a new Excel file. The first row is written as-is, so pass
/// the header as `rows[0]` when one is wanted.
pub fn export_to_new_file(
    rows: &[Vec<CellValue>],
    output_path: &Path,
    sheet_name: Option<&str>,
) -> Result<PathBuf, ExcelError> {
    let mut book = new_file();

    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| ExcelError::write_error("New workbook has no sheet"))?;

    if let Some(name) = sheet_name {
        sheet.set_name(name);
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let row_num = row_idx as u32 + 1;

        for (col_idx, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col_num = col_idx as u32 + 1;
            write_cell_value(sheet.get_cell_mut((col_num, row_num)), value);
        }
    }

    writer::xlsx::write(&book, output_path)
        .map_err(|e| ExcelError::write_error(format!("Failed to write file: {}", e)))?;

    Ok(output_path.to_path_buf())
}

fn write_cell_value(cell: &mut Cell, value: &CellValue) {
    match value {
        CellValue::Empty => {
            cell.set_value_string("");
        }
        CellValue::String(s) => {
            cell.set_value_string(s.as_str());
        }
        CellValue::Number(n) => {
            cell.set_value_number(*n);
        }
        CellValue::Boolean(b) => {
            cell.set_value_bool(*b);
        }
        CellValue::DateTime(dt) => {
            cell.set_value_string(dt.as_str());
        }
        CellValue::Error(e) => {
            // Can't really set an error value, so set as string
            cell.set_value_string(format!("#{}", e));
        }
    }
}
