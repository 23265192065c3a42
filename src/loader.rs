use crate::cell::{CellValue, Row};
use crate::error::{AppError, AppResult};
use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{Cursor, ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Largest accepted upload, in bytes (5 MiB)
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Stored names tried before an upload is rejected as a collision
const MAX_NAME_ATTEMPTS: u32 = 100;

/// MIME types accepted at upload time
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/octet-stream",
];

/// Upload acceptance rules applied before any parsing
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_mime: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed_mime: ALLOWED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl UploadPolicy {
    /// Check an upload's size and declared MIME type
    ///
    /// # Errors
    /// * `AppError::UnsupportedFormat` when the size exceeds the ceiling
    /// * `AppError::UnsupportedFormat` when the MIME type is not allow-listed
    pub fn validate(&self, size: u64, mime: &str) -> AppResult<()> {
        if size > self.max_bytes {
            return Err(AppError::UnsupportedFormat(
                "File size should be less than 5MB".to_string(),
            ));
        }

        let mime = mime.trim().to_ascii_lowercase();
        if !self.allowed_mime.iter().any(|allowed| *allowed == mime) {
            return Err(AppError::UnsupportedFormat(
                "Only Excel files are allowed".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parsed contents of the first worksheet
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Write an upload to a temporary file in `dir` and validate it
///
/// The temporary file is removed again if the upload is rejected, so nothing is
/// left behind for oversized or non-spreadsheet content. On success the caller
/// decides where to persist it.
///
/// # Arguments
/// * `policy` - Size and MIME rules
/// * `dir` - Directory for the temporary artifact (normally the uploads folder)
/// * `bytes` - Raw upload content
/// * `mime` - Declared content type of the upload
pub fn stage_upload(
    policy: &UploadPolicy,
    dir: &Path,
    bytes: &[u8],
    mime: &str,
) -> AppResult<NamedTempFile> {
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;

    if let Err(e) = policy.validate(bytes.len() as u64, mime) {
        // Explicit close so a failed delete is at least logged
        if let Err(close_err) = staged.close() {
            log::warn!("Failed to remove rejected upload: {}", close_err);
        }
        return Err(e);
    }

    Ok(staged)
}

/// Name under which an accepted upload is stored
///
/// Prefixes the upload time in milliseconds and strips any path components from the
/// client-supplied name.
pub fn stored_filename(original_name: &str, uploaded_at: DateTime<Utc>) -> String {
    format!("{}-{}", uploaded_at.timestamp_millis(), upload_base_name(original_name))
}

/// Move a staged upload into `dir` without replacing an existing file
///
/// The first choice is [`stored_filename`]; when that name is taken (two uploads of
/// the same file within one millisecond) a counter is inserted after the timestamp.
///
/// # Returns
/// * `AppResult<String>` - The stored filename
///
/// # Errors
/// * `AppError::Storage` if the file cannot be moved or no free name is found
pub fn persist_upload(
    staged: NamedTempFile,
    dir: &Path,
    original_name: &str,
    uploaded_at: DateTime<Utc>,
) -> AppResult<String> {
    let millis = uploaded_at.timestamp_millis();
    let base = upload_base_name(original_name);
    let mut staged = staged;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let filename = match attempt {
            0 => format!("{}-{}", millis, base),
            n => format!("{}-{}-{}", millis, n, base),
        };

        match staged.persist_noclobber(dir.join(&filename)) {
            Ok(_) => return Ok(filename),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => staged = e.file,
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to store upload: {}",
                    e.error
                )));
            }
        }
    }

    Err(AppError::Storage(format!(
        "Failed to store upload: no free name for {}",
        base
    )))
}

fn upload_base_name(original_name: &str) -> &str {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload.xlsx"
    } else {
        base
    }
}

/// Parse spreadsheet bytes into columns and row records
///
/// Only the first worksheet is read. The header row supplies the column names
/// verbatim; when a name repeats, the first column carrying it wins and the later
/// ones are ignored. Blank header cells become `column_<n>`. Rows whose cells are all
/// empty are skipped. An empty sheet produces an empty table.
///
/// # Errors
/// * `AppError::Spreadsheet` if the bytes are not a readable workbook
pub fn parse_workbook(bytes: &[u8]) -> AppResult<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::spreadsheet("Failed to read Excel file", e))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range.map_err(|e| AppError::spreadsheet("Failed to read Excel file", e))?,
        None => return Ok(Table::default()),
    };

    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return Ok(Table::default());
    };

    // (sheet position, column name) for every column that survives de-duplication
    let mut header: Vec<(usize, String)> = Vec::with_capacity(header_row.len());
    for (idx, cell) in header_row.iter().enumerate() {
        let name = match header_text(cell) {
            name if name.is_empty() => format!("column_{}", idx + 1),
            name => name,
        };
        if header.iter().any(|(_, existing)| *existing == name) {
            log::debug!("Ignoring duplicate column '{}' at position {}", name, idx + 1);
            continue;
        }
        header.push((idx, name));
    }

    let mut rows = Vec::new();
    for sheet_row in rows_iter {
        let row: Row = header
            .iter()
            .map(|(idx, name)| {
                let value = sheet_row.get(*idx).map_or(CellValue::Empty, cell_value);
                (name.clone(), value)
            })
            .collect();

        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(Table {
        columns: header.into_iter().map(|(_, name)| name).collect(),
        rows,
    })
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => CellValue::Date(dt),
            None => CellValue::Text(cell.to_string()),
        },
        other => CellValue::Text(other.to_string()),
    }
}
