use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::dates::{parse_cell_date, to_slashed};
use super::reader::column_number;
use super::types::*;
use super::workbook::OrderWorkbook;
use super::writer::export_to_new_file;
use crate::config::UploadConfig;

/// Header row of the portal's bulk-entry sheet
pub const UPLOAD_HEADERS: [&str; 15] = [
    "T",
    "仕入先コード",
    "センターコード",
    "指定納期",
    "担当者コード",
    "決裁区分",
    "決裁番号",
    "発注残管理",
    "商品コード",
    "発注数量",
    "明細備考1",
    "明細備考2",
    "決裁営業",
    "お客様",
    "伝票備考",
];

/// Project the workbook's data region onto the upload columns. Returned rows
/// exclude the header and already have zero-quantity lines removed.
pub fn build_upload_rows(
    workbook: &mut OrderWorkbook,
    config: &UploadConfig,
) -> Result<Vec<Vec<CellValue>>, ExcelError> {
    let region = workbook.refresh_region()?;
    let width = UPLOAD_HEADERS.len();

    let sources = config
        .column_map
        .iter()
        .map(|entry| column_number(&entry.source).map(|src| (entry.column, src)))
        .collect::<Result<Vec<(u32, u32)>, ExcelError>>()?;
    let text_columns: HashSet<u32> = config.text_columns.iter().copied().collect();

    let mut rows = Vec::new();
    for row in region.rows() {
        let mut out = vec![CellValue::Empty; width];

        for &(dest, src) in &sources {
            if let Some(slot) = slot_mut(&mut out, dest) {
                *slot = workbook.cell(row, src)?.clone();
            }
        }

        if let Some(slot) = slot_mut(&mut out, config.date_column) {
            if !slot.is_empty() {
                match parse_cell_date(slot) {
                    Some(date) => *slot = CellValue::String(to_slashed(date)),
                    None => warn!(row, value = %slot.display_text(), "delivery date left as-is"),
                }
            }
        }

        for &col in &text_columns {
            if let Some(slot) = slot_mut(&mut out, col) {
                if !slot.is_empty() {
                    *slot = CellValue::String(slot.display_text());
                }
            }
        }

        for fill in &config.fill_values {
            if let Some(slot) = slot_mut(&mut out, fill.column) {
                *slot = CellValue::String(fill.value.clone());
            }
        }

        let quantity = config
            .quantity_column
            .checked_sub(1)
            .and_then(|idx| out.get(idx as usize));
        if quantity.map(is_zero_or_blank).unwrap_or(true) {
            continue;
        }

        rows.push(out);
    }

    Ok(rows)
}

/// Write the upload sheet into `save_dir` (created if missing)
pub fn build_upload_workbook(
    workbook: &mut OrderWorkbook,
    save_dir: &Path,
    config: &UploadConfig,
) -> Result<PathBuf, ExcelError> {
    let data = build_upload_rows(workbook, config)?;

    std::fs::create_dir_all(save_dir).map_err(|e| {
        ExcelError::write_error(format!("Failed to create {}: {}", save_dir.display(), e))
    })?;

    let mut rows = Vec::with_capacity(data.len() + 1);
    rows.push(
        UPLOAD_HEADERS
            .iter()
            .map(|h| CellValue::String(h.to_string()))
            .collect(),
    );
    let line_count = data.len();
    rows.extend(data);

    let save_path = save_dir.join(&config.file_name);
    export_to_new_file(&rows, &save_path, Some(workbook.sheet_name()))?;

    info!(lines = line_count, "upload sheet written to {}", save_path.display());
    Ok(save_path)
}

fn slot_mut(row: &mut [CellValue], column: u32) -> Option<&mut CellValue> {
    column.checked_sub(1).and_then(move |idx| row.get_mut(idx as usize))
}

fn is_zero_or_blank(value: &CellValue) -> bool {
    match value {
        CellValue::Number(n) => *n == 0.0,
        other => {
            let text = other.display_text();
            let text = text.trim();
            text.is_empty() || text.parse::<f64>().map(|n| n == 0.0).unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::workbook::tests::{s, workbook_from_rows};

    fn order_line(code: &str, qty: CellValue, date: CellValue) -> Vec<CellValue> {
        vec![
            CellValue::Empty,
            CellValue::Empty,
            CellValue::Number(1001.0),
            s("W01"),
            s(code),
            s("item"),
            qty,
            date,
            CellValue::Number(100.0),
            CellValue::Number(500.0),
            s("memo"),
        ]
    }

    fn fixture(dir: &Path) -> OrderWorkbook {
        let mut header = vec![CellValue::Empty; 11];
        header[6] = s("発注数量");
        let rows = vec![
            vec![s("order sheet")],
            header,
            order_line("P1", CellValue::Number(5.0), s("2024-02-01")),
            order_line("P2", CellValue::Number(0.0), s("2024-02-01")),
            order_line("P3", s("2"), CellValue::DateTime("2024-02-03T00:00:00".into())),
            order_line("P4", CellValue::Number(1.0), s("someday")),
        ];
        workbook_from_rows(dir, "source.xlsx", rows)
    }

    #[test]
    fn test_rows_are_projected_and_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = fixture(dir.path());
        let rows = build_upload_rows(&mut wb, &UploadConfig::default()).unwrap();

        assert_eq!(rows.len(), 3, "zero quantity line is dropped");
        let first = &rows[0];
        assert_eq!(first.len(), 15);
        assert_eq!(first[0], s("D"));
        assert_eq!(first[1], s("1001"));
        assert_eq!(first[2], s("W01"));
        assert_eq!(first[3], s("2024/02/01"));
        assert_eq!(first[4], s(""));
        assert_eq!(first[5], s("2"));
        assert_eq!(first[6], s("9"));
        assert_eq!(first[7], s("99"));
        assert_eq!(first[8], s("P1"));
        assert_eq!(first[9], s("5"));
        assert_eq!(first[10], CellValue::Empty);
        assert_eq!(first[14], s("memo"));

        assert_eq!(rows[1][3], s("2024/02/03"));
        assert_eq!(rows[2][3], s("someday"));
    }

    #[test]
    fn test_upload_workbook_has_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = fixture(dir.path());
        let out_dir = dir.path().join("batch");

        let path = build_upload_workbook(&mut wb, &out_dir, &UploadConfig::default()).unwrap();
        assert_eq!(path, out_dir.join("nagashikomi.xlsx"));

        let written = OrderWorkbook::open(&path).unwrap();
        assert_eq!(written.sheet_name(), "Orders");
        for (idx, header) in UPLOAD_HEADERS.iter().enumerate() {
            assert_eq!(written.cell(1, idx as u32 + 1).unwrap(), &s(header));
        }
        assert_eq!(written.max_row().unwrap(), 4);
    }

    #[test]
    fn test_zero_or_blank() {
        assert!(is_zero_or_blank(&CellValue::Empty));
        assert!(is_zero_or_blank(&s(" 0 ")));
        assert!(is_zero_or_blank(&CellValue::Number(0.0)));
        assert!(!is_zero_or_blank(&s("3")));
    }
}
