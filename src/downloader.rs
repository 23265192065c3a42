use crate::cell::{CellValue, Row};
use crate::error::{AppError, AppResult};
use crate::loader::Table;
use crate::statistics::summarize;
use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet, XlsxError};
use serde::Deserialize;

/// Output format of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Resolve the columns to export
///
/// An empty selection means every column of the table.
///
/// # Errors
/// * `AppError::InvalidInput` if a selected column does not exist
pub fn select_columns(table: &Table, columns: &[String]) -> AppResult<Vec<String>> {
    if columns.is_empty() {
        return Ok(table.columns.clone());
    }

    if let Some(missing) = columns.iter().find(|c| !table.has_column(c)) {
        return Err(AppError::InvalidInput(format!("Unknown column: {}", missing)));
    }

    Ok(columns.to_vec())
}

/// Convert the selected columns of a table to CSV
///
/// The first line holds the column names. Values containing commas, quotes or
/// newlines are quoted, with embedded quotes doubled.
///
/// # Examples
/// ```
/// use excel_analytics::cell::CellValue;
/// use excel_analytics::downloader::to_csv;
/// use excel_analytics::loader::Table;
///
/// let table = Table {
///     columns: vec!["City".into(), "Sales".into()],
///     rows: vec![[("City", CellValue::Text("Pune, MH".into())), ("Sales", CellValue::Number(12.5))]
///         .into_iter()
///         .collect()],
/// };
/// assert_eq!(to_csv(&table, &table.columns), "City,Sales\n\"Pune, MH\",12.5\n");
/// ```
pub fn to_csv(table: &Table, columns: &[String]) -> String {
    let mut csv_content = String::new();

    let header: Vec<String> = columns.iter().map(|c| escape_csv(c)).collect();
    csv_content.push_str(&header.join(","));
    csv_content.push('\n');

    for row in exported_rows(table, columns) {
        let line: Vec<String> = columns
            .iter()
            .map(|c| row.get(c).map(|v| escape_csv(&v.to_string())).unwrap_or_default())
            .collect();
        csv_content.push_str(&line.join(","));
        csv_content.push('\n');
    }

    csv_content
}

/// Rows with at least one value in `columns`; blank rows would be dropped on re-parse
fn exported_rows<'a>(table: &'a Table, columns: &'a [String]) -> impl Iterator<Item = &'a Row> {
    table
        .rows
        .iter()
        .filter(|row| columns.iter().any(|c| row.get(c).is_some_and(|v| !v.is_empty())))
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Convert the selected columns of a table to an XLSX workbook
///
/// Writes a `Data` sheet with a bold header row. With `include_stats` a second
/// `Statistics` sheet lists mean, min, max and count for every selected column that
/// holds numeric values; columns without any are left off that sheet.
///
/// # Errors
/// * `AppError::Spreadsheet` if the workbook cannot be written
pub fn to_xlsx(table: &Table, columns: &[String], include_stats: bool) -> AppResult<Vec<u8>> {
    build_workbook(table, columns, include_stats)
        .map_err(|e| AppError::spreadsheet("Failed to export Excel file", e))
}

fn build_workbook(
    table: &Table,
    columns: &[String],
    include_stats: bool,
) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    let mut data = Worksheet::new();
    data.set_name("Data")?;
    for (c, column) in columns.iter().enumerate() {
        data.write_string_with_format(0, c as u16, column, &bold)?;
    }

    for (r, row) in exported_rows(table, columns).enumerate() {
        let sheet_row = (r + 1) as u32;
        for (c, column) in columns.iter().enumerate() {
            match row.get(column) {
                Some(CellValue::Number(n)) => {
                    data.write_number(sheet_row, c as u16, *n)?;
                }
                Some(CellValue::Empty) | None => {}
                Some(value @ CellValue::Date(d)) => match excel_datetime(d) {
                    Some(datetime) => {
                        let format = if d.time() == NaiveTime::MIN {
                            &date_format
                        } else {
                            &datetime_format
                        };
                        data.write_datetime_with_format(sheet_row, c as u16, &datetime, format)?;
                    }
                    None => {
                        data.write_string(sheet_row, c as u16, &value.to_string())?;
                    }
                },
                Some(value) => {
                    data.write_string(sheet_row, c as u16, &value.to_string())?;
                }
            }
        }
    }
    workbook.push_worksheet(data);

    if include_stats {
        let mut stats_sheet = Worksheet::new();
        stats_sheet.set_name("Statistics")?;
        for (c, title) in ["Column", "Mean", "Min", "Max", "Count"].iter().enumerate() {
            stats_sheet.write_string_with_format(0, c as u16, *title, &bold)?;
        }

        for (r, stat) in summarize(&table.rows, columns).iter().enumerate() {
            let sheet_row = (r + 1) as u32;
            stats_sheet.write_string(sheet_row, 0, &stat.column)?;
            stats_sheet.write_number(sheet_row, 1, stat.mean)?;
            stats_sheet.write_number(sheet_row, 2, stat.min)?;
            stats_sheet.write_number(sheet_row, 3, stat.max)?;
            stats_sheet.write_number(sheet_row, 4, stat.count as f64)?;
        }
        workbook.push_worksheet(stats_sheet);
    }

    workbook.save_to_buffer()
}

/// Excel serial date for `d`, or `None` outside the 1900-9999 range Excel can store
fn excel_datetime(d: &NaiveDateTime) -> Option<ExcelDateTime> {
    let year = u16::try_from(d.year()).ok()?;
    let seconds = f64::from(d.second()) + f64::from(d.nanosecond() / 1_000_000) / 1000.0;

    ExcelDateTime::from_ymd(year, d.month() as u8, d.day() as u8)
        .and_then(|dt| dt.and_hms(d.hour() as u16, d.minute() as u8, seconds))
        .ok()
}
