use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use invoice_dispatch::config::{ColumnRef, parse_seconds};
use invoice_dispatch::{DispatchEngine, RowProcessor, RunConfig, SmtpMailer, TokioClock};

/// Send invoice files to recipients listed in a spreadsheet.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Spreadsheet path (.xlsx, .xls, .ods or .csv). Defaults to UI_EXCEL.
    #[arg(long)]
    excel: Option<PathBuf>,
    /// Sheet name within a workbook; first sheet when omitted.
    #[arg(long)]
    sheet: Option<String>,
    /// Invoices folder. Defaults to UI_INVOICES.
    #[arg(long)]
    invoices: Option<PathBuf>,
    /// Invoice file extension to match.
    #[arg(long)]
    ext: Option<String>,
    /// Match and render everything but send nothing.
    #[arg(long)]
    dry_run: bool,
    /// Only check the SMTP connection and login, then exit.
    #[arg(long)]
    test_smtp: bool,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    body: Option<String>,
    #[arg(long = "from")]
    from_addr: Option<String>,
    #[arg(long)]
    account_column_name: Option<String>,
    #[arg(long)]
    emails_column_name: Option<String>,
    #[arg(long)]
    company_column_name: Option<String>,
    /// Zero-based index of the account column (default 1, column B).
    #[arg(long)]
    account_column_index: Option<usize>,
    /// Zero-based index of the emails column (default 6, column G).
    #[arg(long)]
    emails_column_index: Option<usize>,
    /// Zero-based index of the company column (default 0, column A).
    #[arg(long)]
    company_column_index: Option<usize>,
    /// Seconds to wait after every successful send.
    #[arg(long)]
    delay_between_emails: Option<String>,
    /// Attempts per email, including the first.
    #[arg(long)]
    max_retries: Option<u32>,
    /// Print the final summary as JSON on stdout.
    #[arg(long)]
    json: bool,
    /// Enable debug logging.
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    /// Layer command-line overrides on top of the environment config.
    fn apply(self, config: &mut RunConfig) -> anyhow::Result<()> {
        if let Some(path) = self.excel {
            config.spreadsheet = path;
        }
        if self.sheet.is_some() {
            config.sheet_name = self.sheet;
        }
        if let Some(dir) = self.invoices {
            config.invoices_dir = dir;
        }
        if let Some(ext) = self.ext {
            config.extension = ext;
        }
        config.dry_run = self.dry_run;

        if let Some(subject) = self.subject {
            config.email.subject = subject;
        }
        if let Some(body) = self.body {
            config.email.body = body;
        }
        if let Some(from) = self.from_addr {
            config.email.from = from;
        }

        override_column(
            &mut config.columns.account,
            self.account_column_name,
            self.account_column_index,
        );
        override_column(
            &mut config.columns.recipients,
            self.emails_column_name,
            self.emails_column_index,
        );
        override_column(
            &mut config.columns.company,
            self.company_column_name,
            self.company_column_index,
        );

        if let Some(raw) = self.delay_between_emails {
            config.dispatch.delay_between_emails = parse_seconds(&raw)
                .ok_or_else(|| anyhow::anyhow!("invalid --delay-between-emails: {raw}"))?;
        }
        if let Some(retries) = self.max_retries {
            config.dispatch.max_retries = retries;
        }
        Ok(())
    }
}

fn override_column(column: &mut ColumnRef, name: Option<String>, index: Option<usize>) {
    if name.is_some() {
        column.name = name;
    }
    if let Some(index) = index {
        column.index = index;
    }
}

/// A missing `.env` is fine; anything else about it is worth reporting.
fn dotenv_problem<T>(result: Result<T, dotenvy::Error>) -> Option<dotenvy::Error> {
    match result {
        Ok(_) => None,
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => Some(e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Loaded before logging so RUST_LOG from .env applies.
    let env_file_problem = dotenv_problem(dotenvy::dotenv());

    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Some(e) = env_file_problem {
        tracing::warn!("Ignoring unreadable .env file: {e}");
    }

    let test_smtp = cli.test_smtp;
    let json = cli.json;
    let mut config = RunConfig::from_env();
    cli.apply(&mut config)?;

    let mailer = Arc::new(SmtpMailer::new(config.smtp.clone()));
    let engine = DispatchEngine::new(mailer, Arc::new(TokioClock), config.dispatch.clone());

    if test_smtp {
        let report = engine.probe().await;
        if report.ok {
            tracing::info!("{}", report.message);
            return Ok(());
        }
        anyhow::bail!(report.message);
    }

    let processor = RowProcessor::new(config, engine);
    let summary = match processor.run().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Run failed: {e}");
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_file_is_silent() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = dotenvy::from_path(dir.path().join(".env"));
        assert!(dotenv_problem(result).is_none());
    }

    #[test]
    fn malformed_env_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NOT A VALID LINE\n").unwrap();

        let problem = dotenv_problem(dotenvy::from_path(&path));
        assert!(matches!(problem, Some(dotenvy::Error::LineParse(..))));
    }

    #[test]
    fn column_overrides_keep_unset_parts() {
        let mut column = ColumnRef::named("Account", 1);
        override_column(&mut column, None, Some(3));
        assert_eq!(column, ColumnRef::named("Account", 3));

        override_column(&mut column, Some("Acct".into()), None);
        assert_eq!(column, ColumnRef::named("Acct", 3));
    }
}
