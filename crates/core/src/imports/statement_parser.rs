//! Statement parser.
//!
//! Uploads a bank statement to the statement-processing service and reads
//! its response as newline-delimited JSON events. Progress and warnings are
//! forwarded to a [`StatementObserver`] as they arrive; the captured
//! transactions are normalized and priced afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::field_parsing::{derive_pricing, price_with_rate, validate_row, RawRow};
use super::imports_errors::ImportError;
use super::imports_model::SourceFile;
use super::imports_traits::{StatementByteStream, StatementProcessorTrait};
use super::spreadsheet_parser::{no_valid_rows, ParseOutcome};
use crate::fx::{RateQuote, RateResolverTrait};
use crate::records::PricingSource;
use crate::Result;

/// Receives live updates while a statement is being processed.
#[async_trait]
pub trait StatementObserver: Send + Sync {
    /// `fraction` is the reported percentage divided by 100.
    async fn on_progress(&self, fraction: f64, message: Option<String>) -> Result<()>;

    async fn on_warning(&self, message: String) -> Result<()>;
}

/// One event line of the service response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatementEvent {
    Progress {
        percent: f64,
        #[serde(default)]
        message: Option<String>,
    },
    Warning {
        message: String,
    },
    Result {
        #[serde(default)]
        data: Vec<StatementTransaction>,
    },
    Error {
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// A number the service may send either as JSON number or as text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LooseValue {
    Number(serde_json::Number),
    Text(String),
}

impl LooseValue {
    fn into_text(self) -> String {
        match self {
            LooseValue::Number(n) => n.to_string(),
            LooseValue::Text(s) => s,
        }
    }
}

/// A transaction as reported by the statement service.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatementTransaction {
    #[serde(alias = "merchant", alias = "name")]
    pub title: Option<String>,
    pub amount: Option<LooseValue>,
    pub currency: Option<String>,
    pub date: Option<String>,
    #[serde(alias = "rate")]
    pub exchange_rate: Option<LooseValue>,
    #[serde(alias = "usdAmount")]
    pub amount_usd: Option<LooseValue>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl From<StatementTransaction> for RawRow {
    fn from(tx: StatementTransaction) -> Self {
        RawRow {
            title: tx.title,
            amount: tx.amount.map(LooseValue::into_text),
            currency: tx.currency,
            date: tx.date,
            exchange_rate: tx.exchange_rate.map(LooseValue::into_text),
            amount_usd: tx.amount_usd.map(LooseValue::into_text),
            location: tx.location,
            description: tx.description,
            category: tx.category,
        }
    }
}

/// Splits a byte stream into lines, holding partial lines across chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to contain no newline.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        for pos in self.scanned..self.pending.len() {
            if self.pending[pos] == b'\n' {
                lines.push(decode_line(&self.pending[start..pos]));
                start = pos + 1;
            }
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Returns the trailing fragment left once the stream closed.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Reads the event stream to its end and returns the captured transactions.
///
/// An `error` event aborts the read immediately. A later `result` event
/// replaces an earlier one.
pub async fn read_statement_events(
    mut stream: StatementByteStream,
    observer: &dyn StatementObserver,
) -> Result<Vec<StatementTransaction>> {
    let mut buffer = LineBuffer::new();
    let mut line_number = 0usize;
    let mut captured: Option<Vec<StatementTransaction>> = None;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for line in buffer.push(&chunk) {
            line_number += 1;
            handle_line(&line, line_number, observer, &mut captured).await?;
        }
    }
    if let Some(line) = buffer.finish() {
        line_number += 1;
        handle_line(&line, line_number, observer, &mut captured).await?;
    }

    match captured {
        Some(rows) if !rows.is_empty() => Ok(rows),
        _ => Err(ImportError::StatementService(
            "the service returned no transactions".to_string(),
        )
        .into()),
    }
}

async fn handle_line(
    line: &str,
    line_number: usize,
    observer: &dyn StatementObserver,
    captured: &mut Option<Vec<StatementTransaction>>,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let event: StatementEvent = serde_json::from_str(line).map_err(|e| {
        ImportError::StatementService(format!("unreadable event on line {}: {}", line_number, e))
    })?;

    match event {
        StatementEvent::Progress { percent, message } => {
            let fraction = (percent / 100.0).clamp(0.0, 1.0);
            observer.on_progress(fraction, message).await?;
        }
        StatementEvent::Warning { message } => {
            observer.on_warning(message).await?;
        }
        StatementEvent::Result { data } => {
            debug!("Statement service returned {} transactions", data.len());
            *captured = Some(data);
        }
        StatementEvent::Error { message } => {
            return Err(ImportError::StatementService(message).into());
        }
        StatementEvent::Unknown => {
            debug!("Ignoring unknown statement event on line {}", line_number);
        }
    }
    Ok(())
}

/// Validates captured statement rows and prices foreign ones.
///
/// Rows priced by neither the service nor the resolver are kept with
/// [`PricingSource::Missing`] and a warning.
pub async fn normalize_statement_transactions(
    rows: Vec<StatementTransaction>,
    base_currency: &str,
    resolver: &dyn RateResolverTrait,
) -> Result<ParseOutcome> {
    let mut outcome = ParseOutcome::default();
    let mut quotes: HashMap<(String, NaiveDate), Option<RateQuote>> = HashMap::new();

    for (idx, row) in rows.into_iter().enumerate() {
        let row_number = idx + 1;
        let validated = match validate_row(row.into()) {
            Ok(validated) => validated,
            Err(reason) => {
                debug!("Skipping statement transaction {}: {}", row_number, reason);
                outcome
                    .warnings
                    .push(format!("Transaction {}: {}", row_number, reason));
                continue;
            }
        };

        if let Some(pricing) = derive_pricing(&validated, base_currency) {
            outcome
                .transactions
                .push(validated.into_transaction(Some(pricing)));
            continue;
        }

        let key = (validated.currency.clone(), validated.date);
        let quote = match quotes.get(&key) {
            Some(quote) => *quote,
            None => {
                let quote = lookup_rate(resolver, &validated.currency, validated.date).await;
                quotes.insert(key, quote);
                quote
            }
        };

        match quote {
            Some(quote) => {
                let pricing = price_with_rate(&validated, quote.rate, PricingSource::from(quote.kind));
                outcome
                    .transactions
                    .push(validated.into_transaction(Some(pricing)));
            }
            None => {
                outcome.warnings.push(format!(
                    "Transaction {}: no {} exchange rate found for {}",
                    row_number, validated.currency, validated.date
                ));
                outcome.transactions.push(validated.into_transaction(None));
            }
        }
    }

    if outcome.transactions.is_empty() {
        return Err(no_valid_rows(&outcome.warnings).into());
    }
    Ok(outcome)
}

async fn lookup_rate(
    resolver: &dyn RateResolverTrait,
    currency: &str,
    date: NaiveDate,
) -> Option<RateQuote> {
    match resolver.resolve_rate(currency, date).await {
        Ok(Some(quote)) if quote.rate > Decimal::ZERO => Some(quote),
        Ok(Some(quote)) => {
            warn!("Ignoring non-positive {} rate {} for {}", currency, quote.rate, date);
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Rate lookup for {} on {} failed: {}", currency, date, e);
            None
        }
    }
}

/// Collaborators of a statement parse.
pub struct StatementParser {
    pub processor: Arc<dyn StatementProcessorTrait>,
    pub resolver: Arc<dyn RateResolverTrait>,
    pub base_currency: String,
    pub timeout: Duration,
}

impl StatementParser {
    /// Runs the statement through the service, bounded by the timeout, and
    /// normalizes the result.
    pub async fn parse(
        &self,
        file: &SourceFile,
        payload: Vec<u8>,
        observer: &dyn StatementObserver,
    ) -> Result<ParseOutcome> {
        let service_call = async {
            let stream = self.processor.process(file, payload).await?;
            read_statement_events(stream, observer).await
        };

        let rows = tokio::time::timeout(self.timeout, service_call)
            .await
            .map_err(|_| ImportError::StatementTimeout {
                elapsed: describe_duration(self.timeout),
            })??;

        normalize_statement_transactions(rows, &self.base_currency, self.resolver.as_ref()).await
    }
}

/// Human-readable duration such as "5 minutes" or "90 seconds".
pub fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (value, unit) = if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else if secs >= 1 {
        (secs, "second")
    } else {
        return format!("{} milliseconds", duration.as_millis());
    };
    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}
