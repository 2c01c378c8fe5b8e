//! Row processor — turns spreadsheet rows into invoice emails.
//!
//! Per row:
//! 1. Extract account identifiers and recipients
//! 2. Skip the row if either is empty
//! 3. Per identifier: match a file, render, dispatch (or log in dry-run)
//!
//! Every outcome below the run level is returned as a value. A failure on
//! one identifier never stops the rest of the row or the run.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::dispatch::{DispatchEngine, InvoiceEmail};
use crate::error::{ConfigError, DispatchError, Result};
use crate::extract::{AccountId, extract_account_ids, split_recipients};
use crate::matcher::{attachment_name, find_invoice};
use crate::sheet::{Sheet, SpreadsheetRow};
use crate::summary::{RunAggregator, RunSummary};
use crate::template::render_email;

// ── Outcomes ────────────────────────────────────────────────────────

/// Why a whole row was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoIdentifier,
    NoRecipients { accounts: Vec<AccountId> },
}

/// What happened to one identifier within a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierStatus {
    Sent { attachment: String },
    /// Matched and rendered, but not transmitted.
    DryRun { attachment: String },
    MissingFile,
    SendFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierResult {
    pub account: AccountId,
    pub status: IdentifierStatus,
}

/// Classification of one processed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Skipped(SkipReason),
    Dispatched(Vec<IdentifierResult>),
}

// ── Observer ────────────────────────────────────────────────────────

/// Events reported while a run progresses.
#[derive(Debug)]
pub enum RunEvent<'a> {
    RowSkipped {
        row: usize,
        reason: &'a SkipReason,
    },
    LookupFailed {
        row: usize,
        account: &'a AccountId,
        error: &'a io::Error,
    },
    InvoiceMissing {
        row: usize,
        account: &'a AccountId,
        dir: &'a Path,
    },
    DryRun {
        row: usize,
        descriptor: &'a str,
        email: &'a InvoiceEmail,
    },
    Sent {
        row: usize,
        descriptor: &'a str,
        recipients: &'a [String],
    },
    SendFailed {
        row: usize,
        descriptor: &'a str,
        error: &'a DispatchError,
    },
}

/// Receives run events; the engine never logs row outcomes any other way.
pub trait RunObserver: Send + Sync {
    fn notify(&self, event: &RunEvent<'_>);
}

/// Default observer: forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn notify(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::RowSkipped {
                row,
                reason: SkipReason::NoIdentifier,
            } => warn!("Row {row}: missing/invalid account number; skipping"),
            RunEvent::RowSkipped {
                row,
                reason: SkipReason::NoRecipients { accounts },
            } => warn!(
                "Row {row} (acct {}): no recipient emails; skipping",
                join_accounts(accounts)
            ),
            RunEvent::LookupFailed {
                row,
                account,
                error,
            } => error!("Row {row} (acct {account}): failed to list invoices: {error}"),
            RunEvent::InvoiceMissing { row, account, dir } => warn!(
                "Row {row} (acct {account}): no invoice found in {}",
                dir.display()
            ),
            RunEvent::DryRun {
                row,
                descriptor,
                email,
            } => info!(
                row,
                subject = %email.subject,
                body = %email.body,
                "DRY RUN would send {descriptor} to {} with attachment {}",
                email.to.join(", "),
                attachment_name(&email.attachment)
            ),
            RunEvent::Sent {
                row,
                descriptor,
                recipients,
            } => info!(row, "Sent {descriptor} to {}", recipients.join(", ")),
            RunEvent::SendFailed {
                row,
                descriptor,
                error,
            } => error!(row, "Failed sending {descriptor}: {error}"),
        }
    }
}

fn join_accounts(accounts: &[AccountId]) -> String {
    accounts
        .iter()
        .map(AccountId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Processor ───────────────────────────────────────────────────────

/// Resolved column positions for one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub account: usize,
    pub recipients: usize,
    pub company: usize,
}

impl ColumnLayout {
    pub fn resolve(sheet: &Sheet, config: &RunConfig) -> Self {
        Self {
            account: sheet.resolve(&config.columns.account),
            recipients: sheet.resolve(&config.columns.recipients),
            company: sheet.resolve(&config.columns.company),
        }
    }
}

/// Drives a run: rows in, [`RunSummary`] out.
pub struct RowProcessor {
    config: RunConfig,
    engine: DispatchEngine,
    observer: Arc<dyn RunObserver>,
}

impl RowProcessor {
    pub fn new(config: RunConfig, engine: DispatchEngine) -> Self {
        Self {
            config,
            engine,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Full run: check paths, load the sheet, process every row.
    ///
    /// Configuration and spreadsheet errors abort before any row is
    /// touched, and no summary is produced.
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        if !self.config.spreadsheet.is_file() {
            return Err(ConfigError::SpreadsheetNotFound(self.config.spreadsheet.clone()).into());
        }
        if !self.config.invoices_dir.is_dir() {
            return Err(ConfigError::InvoicesDirNotFound(self.config.invoices_dir.clone()).into());
        }

        let sheet = Sheet::load(&self.config.spreadsheet, self.config.sheet_name.as_deref())?;
        info!(
            rows = sheet.rows.len(),
            dry_run = self.config.dry_run,
            "Loaded spreadsheet {}",
            self.config.spreadsheet.display()
        );
        Ok(self.run_sheet(&sheet).await)
    }

    /// Process an already loaded sheet, strictly one row at a time.
    pub async fn run_sheet(&self, sheet: &Sheet) -> RunSummary {
        let layout = ColumnLayout::resolve(sheet, &self.config);
        let mut aggregator = RunAggregator::new();

        for row in &sheet.rows {
            let outcome = self.process_row(row, &layout).await;
            aggregator.record(&outcome);
        }

        let summary = aggregator.finish();
        info!(
            "Done. processed={} sent={} skipped={} missing_file={}",
            summary.processed, summary.sent, summary.skipped, summary.missing_file
        );
        summary
    }

    /// Classify one row, dispatching each of its identifiers.
    pub async fn process_row(&self, row: &SpreadsheetRow, layout: &ColumnLayout) -> RowOutcome {
        let accounts = extract_account_ids(row.get(layout.account).as_text().as_deref());
        if accounts.is_empty() {
            return self.skip(row.number, SkipReason::NoIdentifier);
        }

        let recipients = split_recipients(row.get(layout.recipients).as_text().as_deref());
        if recipients.is_empty() {
            return self.skip(row.number, SkipReason::NoRecipients { accounts });
        }

        let company = row.get(layout.company).as_text();
        let mut results = Vec::with_capacity(accounts.len());
        for account in accounts {
            let status = self
                .process_identifier(row.number, &account, &recipients, company.as_deref())
                .await;
            results.push(IdentifierResult { account, status });
        }
        RowOutcome::Dispatched(results)
    }

    fn skip(&self, row: usize, reason: SkipReason) -> RowOutcome {
        self.observer.notify(&RunEvent::RowSkipped {
            row,
            reason: &reason,
        });
        RowOutcome::Skipped(reason)
    }

    async fn process_identifier(
        &self,
        row: usize,
        account: &AccountId,
        recipients: &[String],
        company: Option<&str>,
    ) -> IdentifierStatus {
        let dir = self.config.invoices_dir.as_path();
        let invoice = match find_invoice(account, dir, &self.config.extension) {
            Ok(Some(path)) => path,
            Ok(None) => {
                self.observer
                    .notify(&RunEvent::InvoiceMissing { row, account, dir });
                return IdentifierStatus::MissingFile;
            }
            Err(error) => {
                self.observer.notify(&RunEvent::LookupFailed {
                    row,
                    account,
                    error: &error,
                });
                return IdentifierStatus::MissingFile;
            }
        };

        let rendered = render_email(
            &self.config.email.subject,
            &self.config.email.body,
            account,
            company,
        );
        let attachment = attachment_name(&invoice);
        let email = InvoiceEmail {
            from: self.config.email.from.clone(),
            to: recipients.to_vec(),
            subject: rendered.subject,
            body: rendered.body,
            attachment: invoice,
        };
        let descriptor = describe(account, company);

        if self.config.dry_run {
            self.observer.notify(&RunEvent::DryRun {
                row,
                descriptor: &descriptor,
                email: &email,
            });
            return IdentifierStatus::DryRun { attachment };
        }

        match self.engine.dispatch(&email).await {
            Ok(()) => {
                self.observer.notify(&RunEvent::Sent {
                    row,
                    descriptor: &descriptor,
                    recipients,
                });
                IdentifierStatus::Sent { attachment }
            }
            Err(error) => {
                self.observer.notify(&RunEvent::SendFailed {
                    row,
                    descriptor: &descriptor,
                    error: &error,
                });
                IdentifierStatus::SendFailed {
                    reason: error.to_string(),
                }
            }
        }
    }
}

/// `acct 12345 - Acme`, or just `acct 12345` without a company.
fn describe(account: &AccountId, company: Option<&str>) -> String {
    match company {
        Some(company) => format!("acct {account} - {company}"),
        None => format!("acct {account}"),
    }
}
