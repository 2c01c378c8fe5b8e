//! Invoice Dispatch — match spreadsheet rows to invoice files and email them.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod processor;
pub mod sheet;
pub mod summary;
pub mod template;

pub use config::RunConfig;
pub use dispatch::{DispatchEngine, SmtpMailer, TokioClock};
pub use processor::{RowProcessor, RunObserver, TracingObserver};
pub use summary::RunSummary;
