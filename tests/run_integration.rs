//! End-to-end runs over a CSV sheet and a real invoices directory.
//!
//! The SMTP transport and the clock are stubbed, so nothing touches the
//! network and no test waits on real backoff or pacing.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use invoice_dispatch::config::{ColumnMapping, ColumnRef, DispatchPolicy};
use invoice_dispatch::dispatch::{Clock, InvoiceEmail, Mailer, ProbeReport};
use invoice_dispatch::error::{DispatchError, Error};
use invoice_dispatch::{DispatchEngine, RowProcessor, RunConfig, RunSummary};

/// Stub mailer: records every message, fails for one chosen recipient.
#[derive(Default)]
struct StubMailer {
    sent: Mutex<Vec<InvoiceEmail>>,
    calls: Mutex<u32>,
    reject: Option<String>,
}

#[async_trait]
impl Mailer for StubMailer {
    async fn send(&self, email: &InvoiceEmail) -> Result<(), DispatchError> {
        *self.calls.lock().unwrap() += 1;
        if let Some(reject) = &self.reject
            && email.to.iter().any(|r| r == reject)
        {
            return Err(DispatchError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "server hung up",
            )));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }

    async fn probe(&self) -> ProbeReport {
        ProbeReport {
            ok: true,
            message: "SMTP connection successful".to_string(),
        }
    }
}

/// Clock that only counts.
#[derive(Default)]
struct CountingClock {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Clock for CountingClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// Workspace with `accounts.csv` and an `invoices/` folder.
fn workspace(csv: &str, invoices: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "accounts.csv", csv);
    let inv = dir.path().join("invoices");
    std::fs::create_dir(&inv).unwrap();
    for name in invoices {
        write(&inv, name, "%PDF-1.4");
    }
    dir
}

fn config(dir: &TempDir, dry_run: bool) -> RunConfig {
    let mut config = RunConfig {
        spreadsheet: dir.path().join("accounts.csv"),
        invoices_dir: dir.path().join("invoices"),
        columns: ColumnMapping {
            company: ColumnRef::named("Company", 0),
            account: ColumnRef::named("Account", 1),
            recipients: ColumnRef::named("Emails", 2),
        },
        dispatch: DispatchPolicy {
            max_retries: 3,
            delay_between_emails: Duration::from_millis(2100),
            retry_base_delay: Duration::from_secs(1),
        },
        dry_run,
        ..Default::default()
    };
    config.email.from = "billing@example.com".to_string();
    config.smtp.host = "smtp.example.com".to_string();
    config
}

fn processor(
    config: RunConfig,
    mailer: &Arc<StubMailer>,
    clock: &Arc<CountingClock>,
) -> RowProcessor {
    let engine = DispatchEngine::new(mailer.clone(), clock.clone(), config.dispatch.clone());
    RowProcessor::new(config, engine)
}

const SHEET: &str = "\
Company,Account,Emails
Acme Corp,12345,ap@acme.test; billing@acme.test
Globex,,ap@globex.test
Initech,67890,
";

#[tokio::test]
async fn three_row_live_run() {
    let dir = workspace(SHEET, &["12345_2026-09.pdf", "67890_2026-09.pdf"]);
    let mailer = Arc::new(StubMailer::default());
    let clock = Arc::new(CountingClock::default());

    let summary = processor(config(&dir, false), &mailer, &clock)
        .run()
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            processed: 3,
            sent: 1,
            skipped: 2,
            missing_file: 0,
        }
    );

    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["ap@acme.test", "billing@acme.test"]);
    assert!(sent[0].body.contains("Acme Corp"));
    assert!(sent[0].body.contains("12345"));
    assert_eq!(
        sent[0].attachment,
        dir.path().join("invoices").join("12345_2026-09.pdf")
    );
    assert_eq!(*clock.sleeps.lock().unwrap(), vec![Duration::from_millis(2100)]);
}

#[tokio::test]
async fn dry_run_counts_rows_but_sends_nothing() {
    let dir = workspace(SHEET, &["12345_2026-09.pdf"]);
    let mailer = Arc::new(StubMailer::default());
    let clock = Arc::new(CountingClock::default());

    let summary = processor(config(&dir, true), &mailer, &clock)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.sent, 0);
    assert_eq!(*mailer.calls.lock().unwrap(), 0);
    assert!(clock.sleeps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn exhausted_retries_count_as_skipped_and_run_continues() {
    let csv = "\
Company,Account,Emails
Acme,12345,down@acme.test
Globex,54321,ap@globex.test
Hooli,99999,ap@hooli.test
";
    let dir = workspace(csv, &["12345_a.pdf", "54321_a.pdf"]);
    let mailer = Arc::new(StubMailer {
        reject: Some("down@acme.test".to_string()),
        ..Default::default()
    });
    let clock = Arc::new(CountingClock::default());

    let summary = processor(config(&dir, false), &mailer, &clock)
        .run()
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            processed: 3,
            sent: 1,
            skipped: 1,
            missing_file: 1,
        }
    );
    // Three attempts for the failing row, one for the good one.
    assert_eq!(*mailer.calls.lock().unwrap(), 4);
    assert_eq!(
        *clock.sleeps.lock().unwrap(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_millis(2100),
        ]
    );
}

#[tokio::test]
async fn missing_invoices_dir_aborts_before_any_row() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "accounts.csv", SHEET);
    let mailer = Arc::new(StubMailer::default());
    let clock = Arc::new(CountingClock::default());

    let err = processor(config(&dir, false), &mailer, &clock)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(*mailer.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn positional_columns_are_the_fallback() {
    let csv = "\
Name,Acct No,Contact
Acme,acct 12345 and 67890,ap@acme.test
";
    let dir = workspace(csv, &["12345_a.pdf", "67890_b.pdf"]);
    let mailer = Arc::new(StubMailer::default());
    let clock = Arc::new(CountingClock::default());

    // Header names do not exist in this sheet, so indexes 0/1/2 apply.
    let summary = processor(config(&dir, false), &mailer, &clock)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.sent, 2);
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent[0].attachment.file_name().unwrap(), "12345_a.pdf");
    assert_eq!(sent[1].attachment.file_name().unwrap(), "67890_b.pdf");
}

#[tokio::test]
async fn workbook_with_blank_first_column_uses_default_layout() {
    let dir = workspace("", &["12345_2026-09.pdf"]);
    let mailer = Arc::new(StubMailer::default());
    let clock = Arc::new(CountingClock::default());

    let mut config = config(&dir, false);
    config.spreadsheet = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/accounts.xlsx");
    config.sheet_name = Some("Sparse".to_string());
    config.columns = ColumnMapping::default();

    let summary = processor(config, &mailer, &clock).run().await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            processed: 1,
            sent: 1,
            skipped: 0,
            missing_file: 0,
        }
    );
    let sent = mailer.sent.lock().unwrap();
    assert_eq!(sent[0].to, vec!["a@x.com"]);
}
