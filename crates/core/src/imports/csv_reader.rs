//! Delimited-text reader.
//!
//! Detects the delimiter among comma, semicolon and tab, strips a UTF-8 BOM
//! and drops rows whose cells are all blank.

use csv::{ReaderBuilder, Terminator};

use super::imports_errors::ImportError;
use super::spreadsheet_parser::TextTable;
use crate::Result;

const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Reads delimited text into rows of trimmed cells, header row included.
pub fn read_delimited(content: &[u8]) -> Result<TextTable> {
    let mut warnings = Vec::new();
    let text = decode_content(content, &mut warnings);
    let delimiter = detect_delimiter(&text);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let row: Vec<String> = record
                    .iter()
                    .map(|cell| cell.trim_end_matches('\r').trim().to_string())
                    .collect();
                if row.iter().any(|cell| !cell.is_empty()) {
                    rows.push(row);
                }
            }
            Err(e) => {
                warnings.push(format!("Line {} could not be read: {}", idx + 1, e));
            }
        }
    }

    if rows.is_empty() {
        return Err(ImportError::Parse("The file is empty".to_string()).into());
    }

    Ok(TextTable { rows, warnings })
}

fn decode_content(content: &[u8], warnings: &mut Vec<String>) -> String {
    let content = content.strip_prefix(&UTF8_BOM[..]).unwrap_or(content);

    match std::str::from_utf8(content) {
        Ok(s) => s.to_string(),
        Err(e) => {
            warnings.push(format!(
                "Invalid UTF-8 encoding at byte {}. Some characters may be replaced.",
                e.valid_up_to()
            ));
            String::from_utf8_lossy(content).into_owned()
        }
    }
}

/// Picks the candidate delimiter with the most consistent column count
/// over the first lines, defaulting to a comma.
fn detect_delimiter(content: &str) -> u8 {
    let mut best = b',';
    let mut best_score = 0usize;

    for delimiter in CANDIDATE_DELIMITERS {
        let score = score_delimiter(content, delimiter);
        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }
    best
}

fn score_delimiter(content: &str, delimiter: u8) -> usize {
    let counts: Vec<usize> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(10)
        .map(|line| line.bytes().filter(|b| *b == delimiter).count())
        .collect();

    let Some(&first) = counts.first() else {
        return 0;
    };
    let consistent = counts.iter().filter(|&&c| c == first).count();
    first * consistent
}
