use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use super::dates::to_yyyymmdd;
use super::types::*;
use super::workbook::{ColumnMap, OrderWorkbook};
use crate::config::{LayoutConfig, PolicyConfig};

/// Valid delivery dates per product id, projected from the reference workbook
pub type ReferenceDates = ColumnMap;

/// Load the delivery-date reference workbook as header -> column values
pub fn load_reference_dates(path: &Path) -> Result<ReferenceDates, ExcelError> {
    let mut reference = OrderWorkbook::open(path)?;
    let map = reference.column_map();
    reference.close();
    map
}

/// Run the full checklist against one order workbook.
///
/// Blank-quantity rows are deleted from the data region as a side effect
/// before the cell and date checks run.
pub fn validate_order_workbook(
    workbook: &mut OrderWorkbook,
    reference: &ReferenceDates,
    layout: &LayoutConfig,
    policies: &PolicyConfig,
    today: NaiveDate,
) -> Result<ValidationErrors, ExcelError> {
    let mut errors = ValidationErrors::new();

    if let Some(message) = workbook.has_multiple_sheets() {
        errors.insert(ValidationCategory::Sheets, ErrorDetail::Message(message));
    }

    if let Some(message) = check_titles(workbook, layout, policies)? {
        errors.insert(ValidationCategory::Title, ErrorDetail::Message(message));
    }

    if let Err(e) = workbook.refresh_region() {
        if e.error_type != ExcelErrorType::RegionNotFound {
            return Err(e);
        }
        // No region: report it alongside the title problems and stop at the
        // checks that do not need one
        let message = match errors.get(ValidationCategory::Title) {
            Some(ErrorDetail::Message(title)) => format!("{}; {}", title, e.message),
            _ => e.message.clone(),
        };
        errors.insert(ValidationCategory::Title, ErrorDetail::Message(message));
        check_mandatory_cells(workbook, layout, &mut errors)?;

        info!(failures = errors.len(), "validated {} without a data region", workbook.path().display());
        return Ok(errors);
    }
    workbook.delete_empty_rows(&layout.mandatory_column)?;

    check_mandatory_cells(workbook, layout, &mut errors)?;

    let empty_cells = workbook.find_empty_cells(layout.empty_scan_min_col, layout.empty_scan_max_col)?;
    if !empty_cells.is_empty() {
        errors.insert(ValidationCategory::EmptyCells, ErrorDetail::Items(empty_cells));
    }

    let dates = workbook.pair_id_dates(&layout.date_column, &layout.id_column)?;
    if !dates.unparseable.is_empty() {
        if policies.skip_unparseable_dates {
            debug!(cells = ?dates.unparseable, "skipping unparseable delivery dates");
        } else {
            errors.insert(
                ValidationCategory::UnparseableDates,
                ErrorDetail::Items(dates.unparseable.clone()),
            );
        }
    }

    let unmatched = check_dates_in_reference(&dates.pairs, reference);
    if !unmatched.is_empty() {
        errors.insert(ValidationCategory::DateMismatch, group_by_id(&unmatched));
    }

    let past = check_past_dates(&dates.pairs, today);
    if !past.is_empty() {
        errors.insert(ValidationCategory::PastDate, group_by_id(&past));
    }

    info!(
        rows = dates.pairs.len(),
        failures = errors.len(),
        "validated {}",
        workbook.path().display()
    );

    Ok(errors)
}

fn check_mandatory_cells(
    workbook: &OrderWorkbook,
    layout: &LayoutConfig,
    errors: &mut ValidationErrors,
) -> Result<(), ExcelError> {
    if let Some(empty) = workbook.find_empty_cells_in(&layout.mandatory_cells)? {
        errors.insert(ValidationCategory::CellCheck, ErrorDetail::Items(empty));
    }
    Ok(())
}

fn check_titles(
    workbook: &OrderWorkbook,
    layout: &LayoutConfig,
    policies: &PolicyConfig,
) -> Result<Option<String>, ExcelError> {
    if policies.strict_header_lengths && layout.title_columns.len() != layout.expected_titles.len() {
        return Ok(Some(format!(
            "{} title columns configured for {} expected titles",
            layout.title_columns.len(),
            layout.expected_titles.len()
        )));
    }
    workbook.is_title_valid(&layout.title_columns, &layout.expected_titles)
}

/// Pairs whose date is not listed under their id in the reference. Only
/// non-blank values other than `"0"` count as valid dates.
pub fn check_dates_in_reference(
    pairs: &[(String, String)],
    reference: &ReferenceDates,
) -> Vec<(String, String)> {
    let mut unmatched = Vec::new();

    for (id, date) in pairs {
        let date = date.trim();
        let valid = reference.get(id).map(|values| {
            values.iter().any(|value| {
                let text = value.display_text();
                let text = text.trim();
                !text.is_empty() && text != "0" && text == date
            })
        });

        if valid != Some(true) {
            unmatched.push((id.clone(), date.to_string()));
        }
    }

    unmatched
}

/// Pairs whose date lies strictly before `today`
pub fn check_past_dates(pairs: &[(String, String)], today: NaiveDate) -> Vec<(String, String)> {
    let today: u32 = match to_yyyymmdd(today).parse() {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };

    pairs
        .iter()
        .filter(|(_, date)| date.parse::<u32>().map(|d| d < today).unwrap_or(false))
        .cloned()
        .collect()
}

fn group_by_id(pairs: &[(String, String)]) -> ErrorDetail {
    let mut grouped: BTreeMap<String, String> = BTreeMap::new();
    for (id, date) in pairs {
        grouped
            .entry(id.clone())
            .and_modify(|dates| {
                dates.push(' ');
                dates.push_str(date);
            })
            .or_insert_with(|| date.clone());
    }
    ErrorDetail::Fields(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::workbook::tests::{s, workbook_from_rows};

    fn pair(id: &str, date: &str) -> (String, String) {
        (id.to_string(), date.to_string())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unmatched_reference_date() {
        let mut reference = ReferenceDates::new();
        reference.insert("ID1".into(), vec![s("20240101"), s("20240102")]);

        let unmatched = check_dates_in_reference(&[pair("ID1", "20240103")], &reference);
        assert_eq!(unmatched, vec![pair("ID1", "20240103")]);

        let matched = check_dates_in_reference(&[pair("ID1", "20240102")], &reference);
        assert!(matched.is_empty());
    }

    #[test]
    fn test_unknown_id_and_zero_dates_never_match() {
        let mut reference = ReferenceDates::new();
        reference.insert("ID1".into(), vec![s("0"), CellValue::Empty]);

        let unmatched = check_dates_in_reference(&[pair("ID1", "0"), pair("ID9", "20240101")], &reference);
        assert_eq!(unmatched.len(), 2);
    }

    #[test]
    fn test_past_dates_are_strictly_before_today() {
        let pairs = vec![pair("A", "20240104"), pair("B", "20240105"), pair("C", "junk")];
        let past = check_past_dates(&pairs, day(2024, 1, 5));
        assert_eq!(past, vec![pair("A", "20240104")]);
    }

    /// Order sheet: name in L6, headers on row 8, data from row 9
    fn order_rows(header_g: &str, name: Option<&str>) -> Vec<Vec<CellValue>> {
        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); 5];
        let mut name_row = vec![CellValue::Empty; 12];
        if let Some(name) = name {
            name_row[11] = s(name);
        }
        rows.push(name_row);
        rows.push(Vec::new());

        let mut header = vec![CellValue::Empty; 11];
        let titles = ["仕入先コード", "入荷倉庫コード", "商品コード", "商品名（伝票用）", header_g, "納期", "発注単価", "発注金額", "伝票摘要"];
        for (idx, title) in titles.iter().enumerate() {
            header[idx + 2] = s(title);
        }
        rows.push(header);

        for (code, qty, date) in [("P1", 5.0, "2024/02/01"), ("P2", 3.0, "2024/02/02")] {
            rows.push(vec![
                CellValue::Empty,
                CellValue::Empty,
                s("S01"),
                s("W01"),
                s(code),
                s("item"),
                CellValue::Number(qty),
                s(date),
                CellValue::Number(100.0),
                CellValue::Number(qty * 100.0),
                s("memo"),
            ]);
        }
        rows
    }

    fn reference() -> ReferenceDates {
        let mut reference = ReferenceDates::new();
        reference.insert("W01".into(), vec![s("20240201"), s("20240202")]);
        reference
    }

    #[test]
    fn test_valid_order_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = workbook_from_rows(dir.path(), "ok.xlsx", order_rows("発注数量", Some("Store A")));
        let layout = LayoutConfig::default();

        let errors = validate_order_workbook(&mut wb, &reference(), &layout, &PolicyConfig::default(), day(2024, 1, 10)).unwrap();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_missing_title_and_name_are_both_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = order_rows("発注数量", None);
        // keep the region keyword but break the price header
        rows[7][8] = s("単価");
        let mut wb = workbook_from_rows(dir.path(), "bad.xlsx", rows);
        let layout = LayoutConfig::default();

        let errors = validate_order_workbook(&mut wb, &reference(), &layout, &PolicyConfig::default(), day(2024, 1, 10)).unwrap();
        assert!(errors.contains(ValidationCategory::Title));
        assert!(errors.contains(ValidationCategory::CellCheck));
        assert!(!errors.contains(ValidationCategory::DateMismatch));
    }

    #[test]
    fn test_missing_keyword_header_keeps_collected_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = workbook_from_rows(dir.path(), "nokey.xlsx", order_rows("", None));
        let layout = LayoutConfig::default();

        let errors = validate_order_workbook(&mut wb, &reference(), &layout, &PolicyConfig::default(), day(2024, 1, 10)).unwrap();

        match errors.get(ValidationCategory::Title) {
            Some(ErrorDetail::Message(message)) => {
                assert!(message.contains("column G"), "{}", message);
                assert!(message.contains("not found"), "{}", message);
            }
            other => panic!("unexpected detail {:?}", other),
        }
        assert_eq!(
            errors.get(ValidationCategory::CellCheck),
            Some(&ErrorDetail::Items(vec!["L6 is empty".to_string()]))
        );
        assert!(!errors.contains(ValidationCategory::EmptyCells));
    }

    #[test]
    fn test_past_and_unlisted_dates() {
        let dir = tempfile::tempdir().unwrap();
        let mut wb = workbook_from_rows(dir.path(), "dates.xlsx", order_rows("発注数量", Some("Store A")));
        let mut reference = ReferenceDates::new();
        reference.insert("W01".into(), vec![s("20240201")]);

        let errors = validate_order_workbook(&mut wb, &reference, &LayoutConfig::default(), &PolicyConfig::default(), day(2024, 2, 2)).unwrap();

        match errors.get(ValidationCategory::DateMismatch) {
            Some(ErrorDetail::Fields(fields)) => assert_eq!(fields["W01"], "20240202"),
            other => panic!("unexpected detail {:?}", other),
        }
        match errors.get(ValidationCategory::PastDate) {
            Some(ErrorDetail::Fields(fields)) => assert_eq!(fields["W01"], "20240201"),
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_strict_policies() {
        let dir = tempfile::tempdir().unwrap();
        let mut rows = order_rows("発注数量", Some("Store A"));
        rows[8][7] = s("next week");
        let mut wb = workbook_from_rows(dir.path(), "strict.xlsx", rows);

        let mut layout = LayoutConfig::default();
        layout.expected_titles.pop();
        layout.expected_titles.pop();
        let policies = PolicyConfig {
            skip_unparseable_dates: false,
            strict_header_lengths: true,
            ..PolicyConfig::default()
        };

        let errors = validate_order_workbook(&mut wb, &reference(), &layout, &policies, day(2024, 1, 10)).unwrap();
        assert!(errors.contains(ValidationCategory::Title));
        assert_eq!(
            errors.get(ValidationCategory::UnparseableDates),
            Some(&ErrorDetail::Items(vec!["H9".to_string()]))
        );
    }
}
