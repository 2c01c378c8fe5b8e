//! Error types for invoice dispatch.

use std::path::PathBuf;

/// Top-level error type for a run.
///
/// Only configuration and spreadsheet errors abort a run. A `DispatchError`
/// is always folded into a counted row outcome and never reaches this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Spreadsheet error: {0}")]
    Sheet(#[from] SheetError),
}

/// Configuration-related errors. Fatal for the whole run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Excel file does not exist: {}", .0.display())]
    SpreadsheetNotFound(PathBuf),

    #[error("Invoices directory does not exist: {}", .0.display())]
    InvoicesDirNotFound(PathBuf),
}

/// Spreadsheet loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Failed to read workbook '{}': {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("Workbook has no sheets")]
    NoSheets,

    #[error("Unsupported spreadsheet format: {0}")]
    UnsupportedFormat(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors raised while sending a single invoice email.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Send task failed: {0}")]
    TaskFailed(String),
}

impl DispatchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Protocol, connection and OS-level I/O failures are transient; a
    /// malformed address or message will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

/// Result type alias for invoice dispatch.
pub type Result<T> = std::result::Result<T, Error>;
