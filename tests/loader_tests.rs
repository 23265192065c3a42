mod common;

use common::{Fx, sales_workbook, workbook};
use excel_analytics::cell::CellValue;
use excel_analytics::error::AppError;
use excel_analytics::loader::{
    UploadPolicy, parse_workbook, persist_upload, stage_upload, stored_filename,
};
use chrono::{TimeZone, Utc};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[test]
fn parses_header_and_rows_in_sheet_order() {
    let table = parse_workbook(&sales_workbook()).unwrap();

    assert_eq!(table.columns, vec!["Region", "Sales", "Units"]);
    assert_eq!(table.row_count(), 4);

    let first = &table.rows[0];
    assert_eq!(first.columns().collect::<Vec<_>>(), vec!["Region", "Sales", "Units"]);
    assert_eq!(first.get("Region"), Some(&CellValue::Text("North".into())));
    assert_eq!(first.get("Sales"), Some(&CellValue::Number(100.0)));
    assert_eq!(table.rows[2].get("Units"), Some(&CellValue::Empty));
}

#[test]
fn empty_sheet_is_an_empty_table() {
    let table = parse_workbook(&workbook(&[], &[])).unwrap();
    assert!(table.columns.is_empty());
    assert!(table.rows.is_empty());
}

#[test]
fn header_only_sheet_has_columns_and_no_rows() {
    let table = parse_workbook(&workbook(&["A", "B"], &[])).unwrap();
    assert_eq!(table.columns, vec!["A", "B"]);
    assert_eq!(table.row_count(), 0);
}

#[test]
fn all_empty_rows_are_skipped() {
    let table = parse_workbook(&workbook(
        &["Name", "Score"],
        &[
            vec![Fx::Text("a"), Fx::Num(1.0)],
            vec![Fx::Blank, Fx::Blank],
            vec![Fx::Text("b"), Fx::Num(2.0)],
        ],
    ))
    .unwrap();

    assert_eq!(table.row_count(), 2);
    assert_eq!(table.rows[1].get("Name"), Some(&CellValue::Text("b".into())));
}

#[test]
fn duplicate_headers_keep_first_column() {
    let table = parse_workbook(&workbook(
        &["Sales", "Sales", "Region"],
        &[vec![Fx::Num(1.0), Fx::Num(2.0), Fx::Text("North")]],
    ))
    .unwrap();

    assert_eq!(table.columns, vec!["Sales", "Region"]);
    assert_eq!(table.rows[0].get("Sales"), Some(&CellValue::Number(1.0)));
}

#[test]
fn blank_headers_get_positional_names() {
    let table = parse_workbook(&workbook(
        &["Name", "", "Score"],
        &[vec![Fx::Text("a"), Fx::Text("x"), Fx::Num(3.0)]],
    ))
    .unwrap();

    assert_eq!(table.columns, vec!["Name", "column_2", "Score"]);
    assert_eq!(table.rows[0].get("column_2"), Some(&CellValue::Text("x".into())));
}

#[test]
fn unreadable_bytes_are_a_spreadsheet_error() {
    let err = parse_workbook(b"definitely not a workbook").unwrap_err();
    assert!(matches!(err, AppError::Spreadsheet { .. }));
    assert_eq!(err.message(), "Failed to read Excel file");
    assert!(err.cause().is_some());
}

#[test]
fn upload_policy_checks_size_then_type() {
    let policy = UploadPolicy::default();

    assert!(policy.validate(1024, XLSX_MIME).is_ok());
    assert!(policy.validate(1024, "application/vnd.ms-excel").is_ok());
    assert!(policy.validate(1024, "application/octet-stream").is_ok());

    let too_big = policy.validate(5 * 1024 * 1024 + 1, XLSX_MIME).unwrap_err();
    assert_eq!(too_big.to_string(), "File size should be less than 5MB");

    let wrong_type = policy.validate(1024, "text/plain").unwrap_err();
    assert!(matches!(wrong_type, AppError::UnsupportedFormat(_)));
    assert_eq!(wrong_type.to_string(), "Only Excel files are allowed");
}

#[test]
fn rejected_upload_leaves_no_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let policy = UploadPolicy::default();

    let err = stage_upload(&policy, dir.path(), b"hello", "text/plain").unwrap_err();
    assert!(matches!(err, AppError::UnsupportedFormat(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let small = UploadPolicy {
        max_bytes: 4,
        ..UploadPolicy::default()
    };
    assert!(stage_upload(&small, dir.path(), b"hello", XLSX_MIME).is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let staged = stage_upload(&policy, dir.path(), &sales_workbook(), XLSX_MIME).unwrap();
    assert!(staged.path().exists());
}

#[test]
fn stored_filename_is_timestamped_and_stripped_of_paths() {
    let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

    assert_eq!(stored_filename("sales.xlsx", at), "1700000000123-sales.xlsx");
    assert_eq!(
        stored_filename("../../etc/passwd", at),
        "1700000000123-passwd"
    );
    assert_eq!(
        stored_filename("C:\\Users\\me\\q1.xlsx", at),
        "1700000000123-q1.xlsx"
    );
    assert_eq!(stored_filename("", at), "1700000000123-upload.xlsx");
}

#[test]
fn same_millisecond_uploads_keep_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let policy = UploadPolicy::default();
    let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

    let first = stage_upload(&policy, dir.path(), b"first", XLSX_MIME).unwrap();
    let second = stage_upload(&policy, dir.path(), b"second", XLSX_MIME).unwrap();

    let a = persist_upload(first, dir.path(), "q1.xlsx", at).unwrap();
    let b = persist_upload(second, dir.path(), "q1.xlsx", at).unwrap();

    assert_eq!(a, "1700000000123-q1.xlsx");
    assert_eq!(b, "1700000000123-1-q1.xlsx");
    assert_eq!(std::fs::read(dir.path().join(&a)).unwrap(), b"first");
    assert_eq!(std::fs::read(dir.path().join(&b)).unwrap(), b"second");
}
