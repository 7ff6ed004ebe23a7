//! Merge order numbers from the portal's CSV export back into the order
//! workbook.

pub mod export;
pub mod key;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{MergeConfig, PolicyConfig};
use crate::excel::reader::column_number;
use crate::excel::{CellValue, ExcelError, OrderWorkbook};
pub use export::{latest_file, read_export};
pub use key::{build_key, normalize_key_part};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no export found in {}", .0.display())]
    NoExport(PathBuf),

    #[error("export has no column {0}")]
    MissingColumn(String),

    #[error("failed to parse export: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Excel(#[from] ExcelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub csv_path: PathBuf,
    pub matched: usize,
    /// Region rows whose key had no entry in the export
    pub unmatched_rows: Vec<u32>,
}

/// Write looked-up values into the target column for every region row whose
/// composite key is known. Returns `(matched, unmatched rows)`.
pub fn fill_from_lookup(
    workbook: &mut OrderWorkbook,
    lookup: &HashMap<String, String>,
    config: &MergeConfig,
    policies: &PolicyConfig,
) -> Result<(usize, Vec<u32>), MergeError> {
    let region = workbook.refresh_region()?;
    workbook.convert_column_to_yyyymmdd(&config.date_column, 2)?;

    let key_columns = config
        .sheet_key_columns
        .iter()
        .map(|letters| column_number(letters))
        .collect::<Result<Vec<u32>, ExcelError>>()?;
    let target = column_number(&config.target_column)?;

    let mut matched = 0;
    let mut unmatched = Vec::new();
    for row in region.rows() {
        let parts = key_columns
            .iter()
            .map(|&col| workbook.cell(row, col).map(CellValue::display_text))
            .collect::<Result<Vec<String>, ExcelError>>()?;
        let key = build_key(parts.iter().map(String::as_str));

        match lookup.get(&key) {
            Some(value) => {
                workbook.set_cell(row, target, CellValue::String(value.clone()))?;
                matched += 1;
            }
            None => {
                if policies.warn_unmatched_keys {
                    warn!(row, key = %key, "no order number in export");
                }
                unmatched.push(row);
            }
        }
    }

    Ok((matched, unmatched))
}

/// Merge the newest file in `downloads_dir` into the workbook
pub fn merge_latest_export(
    workbook: &mut OrderWorkbook,
    downloads_dir: &Path,
    config: &MergeConfig,
    policies: &PolicyConfig,
) -> Result<MergeReport, MergeError> {
    let csv_path = latest_file(downloads_dir)?;
    let lookup = read_export(&csv_path, &config.csv_key_columns, &config.value_column)?;
    let (matched, unmatched_rows) = fill_from_lookup(workbook, &lookup, config, policies)?;

    info!(
        matched,
        unmatched = unmatched_rows.len(),
        "merged {} into {}",
        csv_path.display(),
        workbook.path().display()
    );

    Ok(MergeReport {
        csv_path,
        matched,
        unmatched_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::workbook::tests::{s, workbook_from_rows};
    use encoding_rs::SHIFT_JIS;

    /// Header keyword in G2, two order lines below
    fn order_sheet(dir: &Path) -> OrderWorkbook {
        let mut header = vec![CellValue::Empty; 11];
        header[6] = s("発注数量");
        let line = |code: &str, qty: f64, date: &str| {
            vec![
                CellValue::Empty,
                CellValue::Empty,
                CellValue::Number(1001.0),
                s("W01"),
                s(code),
                s("item"),
                CellValue::Number(qty),
                s(date),
                CellValue::Empty,
                CellValue::Empty,
                s("memo 1"),
            ]
        };
        let rows = vec![
            vec![s("order sheet")],
            header,
            line("P1", 5.0, "2024/02/01"),
            line("P2", 3.0, "2024/02/02"),
        ];
        workbook_from_rows(dir, "order.xlsx", rows)
    }

    #[test]
    fn test_fill_from_lookup_writes_target_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = order_sheet(dir.path());

        let mut lookup = HashMap::new();
        lookup.insert("1001W01P1520240201memo1".to_string(), "A-001".to_string());

        let (matched, unmatched) =
            fill_from_lookup(&mut wb, &lookup, &MergeConfig::default(), &PolicyConfig::default()).unwrap();
        assert_eq!(matched, 1);
        assert_eq!(unmatched, vec![4]);
        assert_eq!(wb.cell(3, 13).unwrap(), &s("A-001"));
        assert_eq!(wb.cell(4, 13).unwrap(), &CellValue::Empty);
        assert_eq!(wb.cell(3, 8).unwrap(), &s("20240201"));
    }

    #[test]
    fn test_merge_latest_export_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();
        let csv = "発注番号,仕入先コード,センターコード,商品コード,発注数量,指定納期,伝票備考\n\
                   A-001,1001,W01,P1,5,20240201,memo 1\n\
                   A-002,1001,W01,P2,3,20240202,memo\u{3000}1\n";
        let (bytes, _, _) = SHIFT_JIS.encode(csv);
        std::fs::write(downloads.join("result.csv"), &bytes).unwrap();

        let mut wb = order_sheet(dir.path());
        let report =
            merge_latest_export(&mut wb, &downloads, &MergeConfig::default(), &PolicyConfig::default()).unwrap();

        assert_eq!(report.csv_path, downloads.join("result.csv"));
        assert_eq!(report.matched, 2);
        assert!(report.unmatched_rows.is_empty());
        assert_eq!(wb.cell(4, 13).unwrap(), &s("A-002"));
    }
}
