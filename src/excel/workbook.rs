//! Spreadsheet accessor for one purchase-order workbook.
//!
//! The first sheet is loaded into memory on open. Checks and transforms work
//! on that grid; [`OrderWorkbook::save`] writes the changes back through
//! umya-spreadsheet so untouched cells keep their formatting.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::dates::{parse_cell_date, to_yyyymmdd};
use super::reader::{column_number, coordinate, expand_reference, load_workbook};
use super::types::*;
use super::writer;

/// Header text (row 1) mapped to the values below it
pub type ColumnMap = HashMap<String, Vec<CellValue>>;

pub struct OrderWorkbook {
    path: PathBuf,
    workbook_name: String,
    sheet_names: Vec<String>,
    grid: Option<SheetGrid>,
    region_spec: RegionSpec,
    region: Option<DataRegion>,
    removed_rows: Vec<u32>,
    edited: BTreeSet<(u32, u32)>,
}

impl OrderWorkbook {
    pub fn open(path: &Path) -> Result<Self, ExcelError> {
        let loaded = load_workbook(path)?;
        let workbook_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(path = %path.display(), sheets = loaded.sheet_names.len(), "opened workbook");

        Ok(OrderWorkbook {
            path: path.to_path_buf(),
            workbook_name,
            sheet_names: loaded.sheet_names,
            grid: Some(loaded.grid),
            region_spec: RegionSpec::default(),
            region: None,
            removed_rows: Vec::new(),
            edited: BTreeSet::new(),
        })
    }

    /// Column and keyword used whenever the data region needs refreshing
    pub fn with_region_spec(mut self, spec: RegionSpec) -> Self {
        self.region_spec = spec;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_name(&self) -> &str {
        self.sheet_names.first().map(String::as_str).unwrap_or("Sheet1")
    }

    fn grid(&self) -> Result<&SheetGrid, ExcelError> {
        self.grid
            .as_ref()
            .ok_or_else(|| ExcelError::closed(&self.path.display().to_string()))
    }

    fn grid_mut(&mut self) -> Result<&mut SheetGrid, ExcelError> {
        match self.grid.as_mut() {
            Some(grid) => Ok(grid),
            None => Err(ExcelError::closed(&self.path.display().to_string())),
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> Result<&CellValue, ExcelError> {
        Ok(self.grid()?.get(row, col))
    }

    pub fn set_cell(&mut self, row: u32, col: u32, value: CellValue) -> Result<(), ExcelError> {
        self.grid_mut()?.set(row, col, value);
        self.edited.insert((row, col));
        Ok(())
    }

    pub fn max_row(&self) -> Result<u32, ExcelError> {
        Ok(self.grid()?.max_row())
    }

    /// Error message when the workbook carries more than one sheet
    pub fn has_multiple_sheets(&self) -> Option<String> {
        if self.sheet_names.len() > 1 {
            Some(format!("err: {} has multiple sheets", self.workbook_name))
        } else {
            None
        }
    }

    /// Report every blank cell among `refs`. A range reference reports each
    /// of its blank cells separately.
    pub fn find_empty_cells_in(&self, refs: &[String]) -> Result<Option<Vec<String>>, ExcelError> {
        let grid = self.grid()?;
        let mut errors = Vec::new();

        for reference in refs {
            let cells = expand_reference(reference)?;
            let is_range = reference.contains(':');
            for (row, col) in cells {
                if grid.get(row, col).is_blank() {
                    let name = if is_range { coordinate(row, col) } else { reference.clone() };
                    errors.push(format!("{} is empty", name));
                }
            }
        }

        Ok(if errors.is_empty() { None } else { Some(errors) })
    }

    /// Each column must carry its expected header text somewhere in the
    /// sheet. Pairs are zipped, so extra entries on either side are ignored.
    pub fn is_title_valid(&self, columns: &[String], expected: &[String]) -> Result<Option<String>, ExcelError> {
        let grid = self.grid()?;
        let max_row = grid.max_row();

        for (column, expected_value) in columns.iter().zip(expected) {
            let col = column_number(column)?;
            let found = (1..=max_row).any(|row| {
                matches!(grid.get(row, col), CellValue::String(s) if s == expected_value)
            });
            if !found {
                return Ok(Some(format!(
                    "column {} does not carry the expected title {}",
                    column, expected_value
                )));
            }
        }

        Ok(None)
    }

    /// Start is the row after `keyword` (searched from row 2), end is the
    /// last non-empty cell of `column`.
    pub fn locate_region(&mut self, column: &str, keyword: &str) -> Result<DataRegion, ExcelError> {
        let col = column_number(column)?;
        let grid = self.grid()?;
        let max_row = grid.max_row();

        let keyword_row = (2..=max_row)
            .find(|&row| matches!(grid.get(row, col), CellValue::String(s) if s == keyword))
            .ok_or_else(|| ExcelError::region_not_found(column, keyword))?;

        let last_row = (1..=max_row)
            .rev()
            .find(|&row| !grid.get(row, col).is_empty())
            .unwrap_or(0);

        let region = DataRegion {
            min_row: keyword_row + 1,
            max_row: last_row,
        };
        self.region = Some(region);
        Ok(region)
    }

    /// Recompute the region from the configured spec
    pub fn refresh_region(&mut self) -> Result<DataRegion, ExcelError> {
        let spec = self.region_spec.clone();
        self.locate_region(&spec.column, &spec.keyword)
    }

    fn current_region(&mut self) -> Result<DataRegion, ExcelError> {
        match self.region {
            Some(region) => Ok(region),
            None => self.refresh_region(),
        }
    }

    /// Delete region rows whose `column` cell holds no value. Returns the
    /// region's new last row and the deleted rows in ascending order.
    pub fn delete_empty_rows(&mut self, column: &str) -> Result<(u32, Vec<u32>), ExcelError> {
        let region = self.current_region()?;
        let col = column_number(column)?;

        let grid = self.grid()?;
        let deleted: Vec<u32> = region
            .rows()
            .filter(|&row| grid.get(row, col).is_empty())
            .collect();

        for &row in deleted.iter().rev() {
            self.grid_mut()?.remove_row(row);
            self.removed_rows.push(row);
            self.shift_edits_after_removal(row);
        }

        let max_row = region.max_row.saturating_sub(deleted.len() as u32);
        self.region = Some(DataRegion {
            min_row: region.min_row,
            max_row,
        });

        if !deleted.is_empty() {
            debug!(rows = ?deleted, "deleted rows with blank {}", column);
        }

        Ok((max_row, deleted))
    }

    fn shift_edits_after_removal(&mut self, removed: u32) {
        self.edited = std::mem::take(&mut self.edited)
            .into_iter()
            .filter(|(row, _)| *row != removed)
            .map(|(row, col)| if row > removed { (row - 1, col) } else { (row, col) })
            .collect();
    }

    /// Coordinates of every blank cell inside the refreshed region between
    /// `min_col` and `max_col` (1-based, inclusive)
    pub fn find_empty_cells(&mut self, min_col: u32, max_col: u32) -> Result<Vec<String>, ExcelError> {
        let region = self.refresh_region()?;
        let grid = self.grid()?;

        let mut empty_cells = Vec::new();
        for row in region.rows() {
            for col in min_col..=max_col {
                if grid.get(row, col).is_blank() {
                    empty_cells.push(coordinate(row, col));
                }
            }
        }

        Ok(empty_cells)
    }

    /// Pair each region row's id with its normalized delivery date
    pub fn pair_id_dates(&mut self, date_column: &str, id_column: &str) -> Result<DatePairs, ExcelError> {
        let region = self.current_region()?;
        let date_col = column_number(date_column)?;
        let id_col = column_number(id_column)?;
        let grid = self.grid()?;

        let mut result = DatePairs::default();
        for row in region.rows() {
            let date_value = grid.get(row, date_col);
            match parse_cell_date(date_value) {
                Some(date) => {
                    let id = grid.get(row, id_col).display_text();
                    result.pairs.push((id, to_yyyymmdd(date)));
                }
                None if date_value.is_empty() => {}
                None => result.unparseable.push(coordinate(row, date_col)),
            }
        }

        Ok(result)
    }

    /// Rewrite a column in place as `yyyymmdd` text from `start_row` down.
    /// Cells that do not parse are logged and left alone.
    pub fn convert_column_to_yyyymmdd(&mut self, column: &str, start_row: u32) -> Result<Vec<u32>, ExcelError> {
        let col = column_number(column)?;
        let max_row = self.grid()?.max_row();

        let mut converted = Vec::new();
        for row in start_row..=max_row {
            let value = self.grid()?.get(row, col).clone();
            if value.is_empty() {
                continue;
            }
            match parse_cell_date(&value) {
                Some(date) => {
                    self.set_cell(row, col, CellValue::String(to_yyyymmdd(date)))?;
                    converted.push(row);
                }
                None => {
                    warn!(
                        row,
                        value = %value.display_text(),
                        "could not convert {} to yyyymmdd",
                        coordinate(row, col)
                    );
                }
            }
        }

        Ok(converted)
    }

    /// Row 1 is the header; every later row contributes one value per column
    pub fn column_map(&self) -> Result<ColumnMap, ExcelError> {
        let grid = self.grid()?;
        let max_row = grid.max_row();
        if max_row < 2 {
            return Ok(ColumnMap::new());
        }

        let width = grid.max_col();
        let headers: Vec<String> = (1..=width)
            .map(|col| grid.get(1, col).display_text().trim().to_string())
            .collect();

        let mut map: ColumnMap = headers.iter().map(|h| (h.clone(), Vec::new())).collect();
        for row in 2..=max_row {
            for (idx, header) in headers.iter().enumerate() {
                if let Some(values) = map.get_mut(header) {
                    values.push(grid.get(row, idx as u32 + 1).clone());
                }
            }
        }

        Ok(map)
    }

    /// Trimmed text of each referenced cell
    pub fn cell_texts(&self, refs: &[String]) -> Result<Vec<String>, ExcelError> {
        let grid = self.grid()?;
        refs.iter()
            .map(|reference| {
                let (row, col) = super::reader::parse_cell_ref(reference)?;
                Ok(grid.get(row, col).display_text().trim().to_string())
            })
            .collect()
    }

    /// `NEW_<file name>` next to the source
    pub fn derived_save_path(&self) -> PathBuf {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        dir.join(format!("NEW_{}", self.workbook_name))
    }

    /// Save to `path`, or to [`Self::derived_save_path`] when `None`
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ExcelError> {
        let grid = self.grid()?;
        let target = path.map(Path::to_path_buf).unwrap_or_else(|| self.derived_save_path());

        let edits: Vec<CellEdit> = self
            .edited
            .iter()
            .map(|&(row, col)| CellEdit {
                row,
                col,
                value: grid.get(row, col).clone(),
            })
            .collect();

        writer::apply_edits(&self.path, &target, &self.removed_rows, &edits)
    }

    /// Release the in-memory sheet. Later calls fail with `WorkbookClosed`.
    pub fn close(&mut self) {
        self.grid = None;
        self.region = None;
    }

    pub fn is_closed(&self) -> bool {
        self.grid.is_none()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::excel::writer::export_to_new_file;

    pub(crate) fn s(text: &str) -> CellValue {
        CellValue::String(text.to_string())
    }

    /// Write `rows` to `name` inside `dir` and open it
    pub(crate) fn workbook_from_rows(dir: &Path, name: &str, rows: Vec<Vec<CellValue>>) -> OrderWorkbook {
        let path = dir.join(name);
        export_to_new_file(&rows, &path, Some("Orders")).unwrap();
        OrderWorkbook::open(&path).unwrap()
    }

    /// Title on row 1, keyword in G2, quantities in G3..=G11
    fn region_fixture(dir: &Path) -> OrderWorkbook {
        let mut rows = vec![vec![s("title")]];
        let mut header = vec![CellValue::Empty; 7];
        header[0] = s("code");
        header[6] = s("発注数量");
        rows.push(header);
        for row in 3..=11u32 {
            let mut cells = vec![CellValue::Empty; 7];
            cells[0] = s(&format!("row{}", row));
            cells[6] = CellValue::Number(row as f64);
            rows.push(cells);
        }
        workbook_from_rows(dir, "region.xlsx", rows)
    }

    #[test]
    fn test_locate_region() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = region_fixture(dir.path());
        let region = wb.locate_region("G", "発注数量").unwrap();
        assert_eq!(region, DataRegion { min_row: 3, max_row: 11 });

        let err = wb.locate_region("G", "missing").unwrap_err();
        assert_eq!(err.error_type, ExcelErrorType::RegionNotFound);
    }

    #[test]
    fn test_delete_empty_rows_reports_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            vec![s("title")],
            vec![CellValue::Empty, CellValue::Empty, s("発注数量")],
            vec![s("a"), CellValue::Empty, CellValue::Number(1.0)],
            vec![s("b")],
            vec![s("c"), CellValue::Empty, CellValue::Number(3.0)],
            vec![s("d")],
            vec![s("e"), CellValue::Empty, CellValue::Number(5.0)],
        ];
        let mut wb = workbook_from_rows(dir.path(), "del.xlsx", rows);
        wb.locate_region("C", "発注数量").unwrap();

        let (max_row, deleted) = wb.delete_empty_rows("C").unwrap();
        assert_eq!(deleted, vec![4, 6]);
        assert_eq!(max_row, 5);
        assert_eq!(wb.cell(4, 1).unwrap(), &s("c"));
        assert_eq!(wb.cell(5, 1).unwrap(), &s("e"));
    }

    #[test]
    fn test_delete_rows_in_region_two_to_ten() {
        let mut wb = OrderWorkbook {
            path: PathBuf::from("memory.xlsx"),
            workbook_name: "memory.xlsx".into(),
            sheet_names: vec!["Orders".into()],
            grid: Some(SheetGrid::default()),
            region_spec: RegionSpec::default(),
            region: None,
            removed_rows: Vec::new(),
            edited: BTreeSet::new(),
        };
        for row in 2..=10 {
            if row != 4 && row != 7 {
                wb.set_cell(row, 7, CellValue::Number(1.0)).unwrap();
            }
        }
        wb.region = Some(DataRegion { min_row: 2, max_row: 10 });

        let (max_row, deleted) = wb.delete_empty_rows("G").unwrap();
        assert_eq!(max_row, 8);
        assert_eq!(deleted, vec![4, 7]);
        assert_eq!(wb.removed_rows, vec![7, 4]);
    }

    #[test]
    fn test_find_empty_cells_in_reports_range_members() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![vec![s("x"), CellValue::Empty, s("  ")]];
        let wb = workbook_from_rows(dir.path(), "cells.xlsx", rows);

        let single = wb.find_empty_cells_in(&["A1".to_string()]).unwrap();
        assert!(single.is_none());

        let range = wb.find_empty_cells_in(&["A1:C1".to_string()]).unwrap().unwrap();
        assert_eq!(range, vec!["B1 is empty".to_string(), "C1 is empty".to_string()]);
    }

    #[test]
    fn test_title_check_names_first_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![vec![], vec![s("code"), s("name"), s("qty")]];
        let wb = workbook_from_rows(dir.path(), "title.xlsx", rows);
        let columns: Vec<String> = ["A", "B", "C"].iter().map(|c| c.to_string()).collect();

        let ok: Vec<String> = ["code", "name", "qty"].iter().map(|c| c.to_string()).collect();
        assert_eq!(wb.is_title_valid(&columns, &ok).unwrap(), None);

        let bad: Vec<String> = ["code", "label", "qty"].iter().map(|c| c.to_string()).collect();
        let message = wb.is_title_valid(&columns, &bad).unwrap().unwrap();
        assert!(message.contains("label"));
        assert!(message.contains("column B"));

        // zip truncation: the unmatched extra expectation is never checked
        let longer: Vec<String> = ["code", "name", "qty", "extra"].iter().map(|c| c.to_string()).collect();
        assert_eq!(wb.is_title_valid(&columns, &longer).unwrap(), None);
    }

    #[test]
    fn test_pair_id_dates_skips_unparseable() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            vec![s("title")],
            vec![s("id"), s("発注数量"), s("date")],
            vec![s("ID1"), CellValue::Number(1.0), s("2024-01-05")],
            vec![s("ID2"), CellValue::Number(1.0), s("2024/01/06")],
            vec![s("ID3"), CellValue::Number(1.0), s("soon")],
            vec![CellValue::Number(4.0), CellValue::Number(1.0), s("20240108")],
        ];
        let mut wb = workbook_from_rows(dir.path(), "dates.xlsx", rows).with_region_spec(RegionSpec {
            column: "B".into(),
            keyword: "発注数量".into(),
        });

        let pairs = wb.pair_id_dates("C", "A").unwrap();
        assert_eq!(
            pairs.pairs,
            vec![
                ("ID1".to_string(), "20240105".to_string()),
                ("ID2".to_string(), "20240106".to_string()),
                ("4".to_string(), "20240108".to_string()),
            ]
        );
        assert_eq!(pairs.unparseable, vec!["C5".to_string()]);
    }

    #[test]
    fn test_convert_column_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            vec![s("date")],
            vec![s("2024/01/05")],
            vec![s("not a date")],
        ];
        let mut wb = workbook_from_rows(dir.path(), "convert.xlsx", rows);
        let converted = wb.convert_column_to_yyyymmdd("A", 2).unwrap();
        assert_eq!(converted, vec![2]);

        let saved = wb.save(None).unwrap();
        assert!(saved.ends_with("NEW_convert.xlsx"));
        let reopened = OrderWorkbook::open(&saved).unwrap();
        assert_eq!(reopened.cell(2, 1).unwrap(), &s("20240105"));
        assert_eq!(reopened.cell(3, 1).unwrap(), &s("not a date"));
    }

    #[test]
    fn test_column_map_and_close() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            vec![s(" ID1 "), s("ID2")],
            vec![s("20240101"), s("20240201")],
            vec![s("20240102"), CellValue::Empty],
        ];
        let mut wb = workbook_from_rows(dir.path(), "reference.xlsx", rows);
        let map = wb.column_map().unwrap();
        assert_eq!(map["ID1"], vec![s("20240101"), s("20240102")]);
        assert_eq!(map["ID2"], vec![s("20240201"), CellValue::Empty]);

        assert!(wb.has_multiple_sheets().is_none());
        wb.close();
        assert!(wb.is_closed());
        assert!(wb.column_map().is_err());
    }
}
