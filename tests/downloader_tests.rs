mod common;

use calamine::{Data, Reader, Xlsx};
use common::Fx;
use excel_analytics::cell::CellValue;
use excel_analytics::downloader::{select_columns, to_csv, to_xlsx};
use excel_analytics::error::AppError;
use excel_analytics::loader::parse_workbook;
use std::io::Cursor;

fn selected(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn xlsx_export_reparses_to_selected_columns() {
    let table = parse_workbook(&common::sales_workbook()).unwrap();
    let columns = selected(&["Sales", "Region"]);

    let bytes = to_xlsx(&table, &columns, false).unwrap();
    let exported = parse_workbook(&bytes).unwrap();

    assert_eq!(exported.columns, columns);
    assert_eq!(exported.row_count(), table.row_count());
    for (original, copy) in table.rows.iter().zip(&exported.rows) {
        assert_eq!(copy, &original.project(&columns));
    }
}

#[test]
fn dates_and_sparse_rows_survive_export() {
    let table = parse_workbook(&common::workbook(
        &["Region", "Day", "Sales"],
        &[
            vec![Fx::Text("North"), Fx::Date(2024, 1, 15), Fx::Num(10.0)],
            vec![Fx::Text("South"), Fx::Blank, Fx::Blank],
            vec![Fx::Text("East"), Fx::Date(2024, 2, 29), Fx::Num(30.0)],
        ],
    ))
    .unwrap();
    assert!(matches!(
        table.rows[0].get("Day"),
        Some(CellValue::Date(_))
    ));

    let columns = selected(&["Day", "Sales"]);
    let exported = parse_workbook(&to_xlsx(&table, &columns, false).unwrap()).unwrap();

    assert_eq!(exported.columns, columns);
    assert_eq!(exported.row_count(), 2);
    assert_eq!(exported.rows[0], table.rows[0].project(&columns));
    assert_eq!(exported.rows[1], table.rows[2].project(&columns));

    let csv = to_csv(&table, &selected(&["Sales"]));
    assert_eq!(csv, "Sales\n10\n30\n");
}

#[test]
fn statistics_sheet_lists_numeric_columns_only() {
    let table = parse_workbook(&common::sales_workbook()).unwrap();
    let bytes = to_xlsx(&table, &table.columns, true).unwrap();

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Data", "Statistics"]);

    let stats = workbook.worksheet_range("Statistics").unwrap();
    let names: Vec<String> = stats
        .rows()
        .skip(1)
        .map(|row| match &row[0] {
            Data::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    assert_eq!(names, vec!["Sales", "Units"]);

    let count = stats.get_value((1, 4)).cloned();
    assert_eq!(count, Some(Data::Float(3.0)));
}

#[test]
fn csv_export_quotes_special_values() {
    let table = parse_workbook(&common::workbook(
        &["Name", "Note"],
        &[
            vec![Fx::Text("a"), Fx::Text("has, comma")],
            vec![Fx::Text("b"), Fx::Text("say \"hi\"")],
            vec![Fx::Text("c"), Fx::Blank],
        ],
    ))
    .unwrap();

    let csv = to_csv(&table, &table.columns);
    assert_eq!(
        csv,
        "Name,Note\na,\"has, comma\"\nb,\"say \"\"hi\"\"\"\nc,\n"
    );
}

#[test]
fn empty_selection_exports_every_column() {
    let table = parse_workbook(&common::sales_workbook()).unwrap();

    assert_eq!(select_columns(&table, &[]).unwrap(), table.columns);
    assert!(matches!(
        select_columns(&table, &selected(&["Profit"])),
        Err(AppError::InvalidInput(_))
    ));
}

#[test]
fn text_numbers_stay_text_after_export() {
    let table = parse_workbook(&common::sales_workbook()).unwrap();
    let columns = selected(&["Region", "Units"]);
    let exported = parse_workbook(&to_xlsx(&table, &columns, false).unwrap()).unwrap();

    assert_eq!(
        exported.rows[1].get("Units"),
        Some(&CellValue::Text("12".into()))
    );
    assert_eq!(exported.rows[2].get("Units"), Some(&CellValue::Empty));
}
