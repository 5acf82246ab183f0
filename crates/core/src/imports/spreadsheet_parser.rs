//! Spreadsheet parser.
//!
//! Turns a CSV file or the first sheet of a workbook into normalized
//! transaction candidates. Bad rows are skipped with a warning; the parse
//! only fails when the file itself is unusable or no row survives.

use log::debug;

use super::csv_reader::read_delimited;
use super::field_parsing::{derive_pricing, validate_row, RawRow};
use super::imports_constants::MAX_FAILURE_CONTEXT_WARNINGS;
use super::imports_errors::ImportError;
use super::imports_model::{ParsedTransaction, SourceFile};
use super::workbook::{is_workbook, parse_excel_serial, read_first_sheet};
use crate::Result;

/// Rows of text read from a file, header row first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTable {
    pub rows: Vec<Vec<String>>,
    /// File-level warnings raised while reading.
    pub warnings: Vec<String>,
}

/// Output of a successful parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub transactions: Vec<ParsedTransaction>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Title,
    Amount,
    Currency,
    Date,
    ExchangeRate,
    AmountUsd,
    Location,
    Description,
    Category,
}

const REQUIRED_COLUMNS: [(Column, &str); 4] = [
    (Column::Title, "title"),
    (Column::Amount, "amount"),
    (Column::Currency, "currency"),
    (Column::Date, "date"),
];

fn column_for_header(header: &str) -> Option<Column> {
    let key: String = header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();

    match key.as_str() {
        "title" | "name" | "merchant" | "payee" => Some(Column::Title),
        "amount" | "value" | "total" => Some(Column::Amount),
        "currency" | "ccy" => Some(Column::Currency),
        "date" | "transactiondate" | "day" => Some(Column::Date),
        "exchangerate" | "rate" | "fxrate" => Some(Column::ExchangeRate),
        "amountusd" | "usdamount" | "usd" => Some(Column::AmountUsd),
        "location" => Some(Column::Location),
        "description" | "notes" | "memo" => Some(Column::Description),
        "category" => Some(Column::Category),
        _ => None,
    }
}

/// Maps each known column to the index of the first header naming it.
#[derive(Debug, Default)]
struct ColumnMap {
    indices: Vec<(Column, usize)>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Result<Self> {
        let mut map = ColumnMap::default();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(column) = column_for_header(header) {
                if map.index_of(column).is_none() {
                    map.indices.push((column, idx));
                }
            }
        }

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|(column, _)| map.index_of(*column).is_none())
            .map(|(_, name)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::Parse(format!(
                "Missing required column(s): {}",
                missing.join(", ")
            ))
            .into());
        }
        Ok(map)
    }

    fn index_of(&self, column: Column) -> Option<usize> {
        self.indices
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, idx)| *idx)
    }

    fn cell(&self, row: &[String], column: Column) -> Option<String> {
        self.index_of(column)
            .and_then(|idx| row.get(idx))
            .map(|cell| cell.to_string())
    }

    fn raw_row(&self, row: &[String]) -> RawRow {
        RawRow {
            title: self.cell(row, Column::Title),
            amount: self.cell(row, Column::Amount),
            currency: self.cell(row, Column::Currency),
            date: self.cell(row, Column::Date),
            exchange_rate: self.cell(row, Column::ExchangeRate),
            amount_usd: self.cell(row, Column::AmountUsd),
            location: self.cell(row, Column::Location),
            description: self.cell(row, Column::Description),
            category: self.cell(row, Column::Category),
        }
    }
}

/// Parses an uploaded spreadsheet.
///
/// Every warning for a skipped row names its 1-based data row.
pub fn parse_spreadsheet(
    content: &[u8],
    file: &SourceFile,
    base_currency: &str,
) -> Result<ParseOutcome> {
    let workbook = is_workbook(&file.media_type, &file.name);
    let table = if workbook {
        read_first_sheet(content)?
    } else {
        read_delimited(content)?
    };

    let mut warnings = table.warnings;
    let mut rows = table.rows.into_iter();
    let headers = rows.next().unwrap_or_default();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut transactions = Vec::new();
    for (idx, row) in rows.enumerate() {
        let row_number = idx + 1;
        let mut raw = columns.raw_row(&row);
        if workbook {
            raw.date = raw.date.map(|text| {
                parse_excel_serial(&text)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or(text)
            });
        }

        let validated = match validate_row(raw) {
            Ok(validated) => validated,
            Err(reason) => {
                debug!("Skipping spreadsheet row {}: {}", row_number, reason);
                warnings.push(format!("Row {}: {}", row_number, reason));
                continue;
            }
        };

        match derive_pricing(&validated, base_currency) {
            Some(pricing) => transactions.push(validated.into_transaction(Some(pricing))),
            None => {
                let reason = format!(
                    "{} amount needs an exchange rate or a USD amount",
                    validated.currency
                );
                debug!("Skipping spreadsheet row {}: {}", row_number, reason);
                warnings.push(format!("Row {}: {}", row_number, reason));
            }
        }
    }

    if transactions.is_empty() {
        return Err(no_valid_rows(&warnings).into());
    }

    Ok(ParseOutcome {
        transactions,
        warnings,
    })
}

/// Error raised when nothing survived validation, quoting the first warnings.
pub fn no_valid_rows(warnings: &[String]) -> ImportError {
    let mut message = "No valid transactions found.".to_string();
    if !warnings.is_empty() {
        let context: Vec<&str> = warnings
            .iter()
            .take(MAX_FAILURE_CONTEXT_WARNINGS)
            .map(String::as_str)
            .collect();
        message.push(' ');
        message.push_str(&context.join("; "));
    }
    ImportError::Parse(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::records::PricingSource;
    use rust_decimal_macros::dec;

    fn csv_file() -> SourceFile {
        SourceFile {
            name: "march.csv".to_string(),
            size: 0,
            media_type: "text/csv".to_string(),
        }
    }

    #[test]
    fn test_workbook_serial_dates_become_calendar_days() {
        let content = crate::test_support::xlsx_workbook(&[
            (
                "March",
                vec![
                    vec!["Title", "Amount", "Currency", "Date"],
                    vec!["Rent", "950", "USD", "45352"],
                    vec!["Coffee", "4.5", "USD", "2024-03-02"],
                    vec!["Broken", "12", "USD", "not a date"],
                ],
            ),
            ("Notes", vec![vec!["ignore me"]]),
        ]);
        let file = SourceFile {
            name: "march.xlsx".to_string(),
            size: content.len() as u64,
            media_type: String::new(),
        };

        let outcome = parse_spreadsheet(&content, &file, "USD").unwrap();

        assert_eq!(outcome.transactions.len(), 2);
        assert_eq!(
            outcome.transactions[0].date,
            chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(outcome.transactions[0].amount, dec!(950));
        assert_eq!(
            outcome.transactions[1].date,
            chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );
        assert_eq!(
            outcome.warnings,
            vec![
                "Only the first sheet 'March' was imported; ignored sheets: Notes".to_string(),
                "Row 3: invalid date 'not a date'".to_string(),
            ]
        );
    }

    #[test]
    fn test_ten_rows_with_three_bad_amounts() {
        let mut content = String::from("Title,Amount,Currency,Date\n");
        for i in 1..=10 {
            let amount = match i {
                2 => "abc".to_string(),
                5 => "-4".to_string(),
                9 => String::new(),
                _ => format!("{}.50", i),
            };
            content.push_str(&format!("Item {},{},USD,2024-03-{:02}\n", i, amount, i));
        }

        let outcome = parse_spreadsheet(content.as_bytes(), &csv_file(), "USD").unwrap();

        assert_eq!(outcome.transactions.len(), 7);
        assert_eq!(outcome.warnings.len(), 3);
        assert!(outcome.warnings[0].starts_with("Row 2:"));
        assert!(outcome.warnings[1].starts_with("Row 5:"));
        assert!(outcome.warnings[2].starts_with("Row 9:"));
    }

    #[test]
    fn test_all_rows_invalid_fails_with_context() {
        let mut content = String::from("title,amount,currency,date\n");
        for i in 1..=10 {
            content.push_str(&format!("Item {},zero,USD,2024-03-01\n", i));
        }

        let err = parse_spreadsheet(content.as_bytes(), &csv_file(), "USD").unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("No valid transactions found."));
        assert!(message.contains("Row 1:"));
        assert!(message.contains("Row 3:"));
        assert!(!message.contains("Row 4:"));
        assert!(matches!(err, Error::Import(ImportError::Parse(_))));
    }

    #[test]
    fn test_header_aliases_and_optional_columns() {
        let content = "Merchant;Total;CCY;Transaction Date;FX_Rate;Notes;Category\n\
                       Café Luna;12,00;eur;07.03.2024;0.8;Breakfast;Food\n";

        let outcome = parse_spreadsheet(content.as_bytes(), &csv_file(), "USD").unwrap();

        let tx = &outcome.transactions[0];
        assert_eq!(tx.title, "Café Luna");
        assert_eq!(tx.amount, dec!(12.00));
        assert_eq!(tx.currency, "EUR");
        assert_eq!(tx.exchange_rate, Some(dec!(0.8)));
        assert_eq!(tx.amount_usd, Some(dec!(15.00)));
        assert_eq!(tx.description.as_deref(), Some("Breakfast"));
        assert_eq!(tx.category.as_deref(), Some("Food"));
        assert_eq!(tx.pricing_source, PricingSource::File);
    }

    #[test]
    fn test_foreign_row_without_rate_is_skipped() {
        let content = "title,amount,currency,date\n\
                       Taxi,20,EUR,2024-03-01\n\
                       Coffee,3,USD,2024-03-01\n";

        let outcome = parse_spreadsheet(content.as_bytes(), &csv_file(), "USD").unwrap();

        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.transactions[0].title, "Coffee");
        assert_eq!(outcome.transactions[0].exchange_rate, Some(dec!(1)));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Row 1"));
        assert!(outcome.warnings[0].contains("EUR"));
    }

    #[test]
    fn test_missing_required_header_fails() {
        let content = "title,amount,date\nCoffee,3,2024-03-01\n";

        let err = parse_spreadsheet(content.as_bytes(), &csv_file(), "USD").unwrap_err();

        assert!(err.to_string().contains("currency"));
    }

    #[test]
    fn test_short_rows_are_padded_by_missing_cells() {
        let content = "title,amount,currency,date,category\nCoffee,3,USD,2024-03-01\n";

        let outcome = parse_spreadsheet(content.as_bytes(), &csv_file(), "USD").unwrap();

        assert_eq!(outcome.transactions.len(), 1);
        assert!(outcome.transactions[0].category.is_none());
    }
}
