//! Workbook reader (xlsx, xlsm, xlsb, xls, ods).
//!
//! Only the first sheet is read. Other sheets are reported in a warning.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate};

use super::imports_constants::{WORKBOOK_EXTENSIONS, WORKBOOK_MEDIA_TYPES};
use super::imports_errors::ImportError;
use super::spreadsheet_parser::TextTable;
use crate::Result;

// Serial day numbers Excel can represent: 1900-01-01 through 9999-12-31
const MIN_EXCEL_SERIAL: f64 = 1.0;
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Whether the upload should be read as a workbook rather than delimited text.
pub fn is_workbook(media_type: &str, file_name: &str) -> bool {
    let media_type = media_type.trim().to_ascii_lowercase();
    if WORKBOOK_MEDIA_TYPES.contains(&media_type.as_str()) {
        return true;
    }
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| WORKBOOK_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Converts the first sheet of a workbook into rows of text.
pub fn read_first_sheet(content: &[u8]) -> Result<TextTable> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| ImportError::Parse(format!("Could not open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names();
    let Some(first) = sheet_names.first().cloned() else {
        return Err(ImportError::Parse("The workbook has no sheets".to_string()).into());
    };

    let mut warnings = Vec::new();
    if sheet_names.len() > 1 {
        warnings.push(format!(
            "Only the first sheet '{}' was imported; ignored sheets: {}",
            first,
            sheet_names[1..].join(", ")
        ));
    }

    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| ImportError::Parse(format!("Could not read sheet '{}': {}", first, e)))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_text).collect::<Vec<String>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    if rows.is_empty() {
        return Err(ImportError::Parse(format!("The first sheet '{}' is empty", first)).into());
    }

    Ok(TextTable { rows, warnings })
}

/// Converts an Excel serial day number to a calendar day.
///
/// Excel's epoch is 1899-12-30, which absorbs its 1900 leap year bug.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(MIN_EXCEL_SERIAL..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Reads a cell text holding a serial day number, as left by workbooks whose
/// date column has no date format.
pub fn parse_excel_serial(text: &str) -> Option<NaiveDate> {
    text.trim()
        .parse::<f64>()
        .ok()
        .and_then(excel_serial_to_date)
}

fn cell_to_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}
