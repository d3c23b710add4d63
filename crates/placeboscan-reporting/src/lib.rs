//! Export of ledger rows to analysis-friendly formats.

use std::io::Write;
use std::path::Path;

use thiserror::Error;

use placeboscan_core::ExportRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Parse a user-supplied format name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Render rows in the given format.
pub fn export_rows(rows: &[ExportRow], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => Ok(export_csv(rows)),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(rows)?),
    }
}

/// Render and write rows to `path`.
pub fn write_export(
    rows: &[ExportRow],
    format: ExportFormat,
    path: &Path,
) -> Result<(), ExportError> {
    let content = export_rows(rows, format)?;
    let io_err = |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::create(path).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    Ok(())
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(rows: &[ExportRow]) -> String {
    let mut out = String::from("journal_name,year,volume,issue,article,match,pages,error\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            csv_escape(&row.journal_name),
            row.year,
            csv_escape(&row.volume),
            csv_escape(&row.issue),
            csv_escape(&row.article),
            row.matched as u8,
            csv_escape(row.pages.as_deref().unwrap_or("")),
            row.error as u8,
        ));
    }
    out
}
