//! Configuration types.
//!
//! A [`RunConfig`] is an explicit value handed to the row processor; nothing
//! in the engine reads the process environment on its own.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

pub const DEFAULT_SUBJECT: &str = "Your Invoice";
pub const DEFAULT_BODY: &str =
    "Hello %COMPANY%,\n\nHere is the invoice for account %ACCOUNT%.\n\nThank you.";

/// A spreadsheet column, addressed by header name when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Header name; preferred when present in the header row.
    pub name: Option<String>,
    /// Zero-based positional fallback.
    pub index: usize,
}

impl ColumnRef {
    pub fn at(index: usize) -> Self {
        Self { name: None, index }
    }

    pub fn named(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: Some(name.into()),
            index,
        }
    }
}

/// Where the account, recipient and company values live in each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub account: ColumnRef,
    pub recipients: ColumnRef,
    pub company: ColumnRef,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        // Column B, column G, column A.
        Self {
            account: ColumnRef::at(1),
            recipients: ColumnRef::at(6),
            company: ColumnRef::at(0),
        }
    }
}

/// Sender and subject/body templates.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl Default for EmailTemplate {
    fn default() -> Self {
        Self {
            from: String::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
        }
    }
}

/// SMTP endpoint settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Upgrade the session with STARTTLS; plaintext otherwise.
    pub starttls: bool,
    /// Bounds every connection, whether a probe or a real send.
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: String::new(),
            password: SecretString::from(String::new()),
            starttls: true,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Retry and pacing parameters for the dispatch engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPolicy {
    /// Total attempts per message, including the first.
    pub max_retries: u32,
    /// Pause after every successful send.
    pub delay_between_emails: Duration,
    /// Backoff before retry `n` is `retry_base_delay * 2^n`.
    pub retry_base_delay: Duration,
}

impl DispatchPolicy {
    /// Backoff to wait after failed attempt `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_between_emails: Duration::from_millis(2100),
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub spreadsheet: PathBuf,
    pub sheet_name: Option<String>,
    pub invoices_dir: PathBuf,
    /// Case-insensitive file name suffix, e.g. `.pdf`.
    pub extension: String,
    pub columns: ColumnMapping,
    pub email: EmailTemplate,
    pub smtp: SmtpConfig,
    pub dispatch: DispatchPolicy,
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            spreadsheet: PathBuf::from("data/accounts.xlsx"),
            sheet_name: None,
            invoices_dir: PathBuf::from("invoices"),
            extension: ".pdf".to_string(),
            columns: ColumnMapping::default(),
            email: EmailTemplate::default(),
            smtp: SmtpConfig::default(),
            dispatch: DispatchPolicy::default(),
            dry_run: true,
        }
    }
}

impl RunConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Unset or empty keys keep their defaults; numbers that fail to parse
    /// fall back to the default as well.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get("UI_EXCEL") {
            config.spreadsheet = PathBuf::from(path);
        }
        config.sheet_name = get("UI_SHEET");
        if let Some(dir) = get("UI_INVOICES") {
            config.invoices_dir = PathBuf::from(dir);
        }
        if let Some(ext) = get("UI_EXT") {
            config.extension = ext;
        }

        if let Some(index) = get("ACCOUNT_COLUMN").and_then(|s| s.trim().parse().ok()) {
            config.columns.account.index = index;
        }
        if let Some(index) = get("EMAILS_COLUMN").and_then(|s| s.trim().parse().ok()) {
            config.columns.recipients.index = index;
        }
        if let Some(index) = get("COMPANY_COLUMN").and_then(|s| s.trim().parse().ok()) {
            config.columns.company.index = index;
        }

        config.smtp.host = get("SMTP_HOST").unwrap_or_default();
        if let Some(port) = get("SMTP_PORT").and_then(|s| s.trim().parse().ok()) {
            config.smtp.port = port;
        }
        config.smtp.username = get("SMTP_USER").unwrap_or_default();
        config.smtp.password = SecretString::from(lookup("SMTP_PASSWORD").unwrap_or_default());
        if let Some(flag) = get("SMTP_USE_TLS") {
            config.smtp.starttls = parse_flag(&flag);
        }
        if let Some(secs) = get("SMTP_TIMEOUT_SECS").and_then(|s| s.trim().parse::<u64>().ok()) {
            config.smtp.timeout = Duration::from_secs(secs);
        }

        config.email.from = get("EMAIL_FROM").unwrap_or_else(|| config.smtp.username.clone());
        if let Some(subject) = get("EMAIL_SUBJECT") {
            config.email.subject = subject;
        }
        if let Some(body) = get("EMAIL_BODY") {
            config.email.body = body.replace("\\n", "\n");
        }

        if let Some(retries) = get("MAX_RETRIES").and_then(|s| s.trim().parse().ok()) {
            config.dispatch.max_retries = retries;
        }
        if let Some(delay) = get("DELAY_BETWEEN_EMAILS").and_then(|s| parse_seconds(&s)) {
            config.dispatch.delay_between_emails = delay;
        }
        if let Some(delay) = get("RETRY_BASE_DELAY").and_then(|s| parse_seconds(&s)) {
            config.dispatch.retry_base_delay = delay;
        }

        config
    }

    /// Reject settings that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_RETRIES".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.smtp.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "SMTP_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.dry_run {
            return Ok(());
        }
        if self.email.from.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "EMAIL_FROM".into(),
                hint: "Provide --from or EMAIL_FROM/SMTP_USER in env.".into(),
            });
        }
        if self.smtp.host.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "SMTP_HOST".into(),
                hint: "Set SMTP_HOST in env.".into(),
            });
        }
        Ok(())
    }
}

/// `1`, `true`, `yes` and `on` (any case) are true; everything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse fractional seconds, e.g. `2.1`.
pub fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}
