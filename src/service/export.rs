use crate::storage::Exchange;
use anyhow::{bail, Result};
use std::str::FromStr;

const CSV_HEADER: [&str; 7] = [
    "id",
    "timestamp",
    "question",
    "answer",
    "isStarred",
    "rating",
    "tags",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unsupported export format '{}', expected json or csv", other),
        }
    }
}

/// Serialize every exchange; client-identifying metadata never leaves the store.
pub fn render(exchanges: &[Exchange], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let redacted: Vec<Exchange> = exchanges.iter().cloned().map(Exchange::redacted).collect();
            Ok(serde_json::to_string_pretty(&redacted)?)
        }
        ExportFormat::Csv => Ok(to_csv(exchanges)),
    }
}

fn to_csv(exchanges: &[Exchange]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADER.join(","));
    out.push_str("\r\n");

    for exchange in exchanges {
        let fields = [
            exchange.id.clone(),
            exchange.timestamp.to_rfc3339(),
            exchange.question.clone(),
            exchange.answer.clone(),
            exchange.is_starred.to_string(),
            exchange.rating.map(|r| r.to_string()).unwrap_or_default(),
            exchange.tags.join(";"),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

/// RFC 4180 quoting: wrap in quotes when needed, double embedded quotes
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
