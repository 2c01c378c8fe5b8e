//! SMTP via lettre — one transport per attempt, no pooling.

use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};

use super::{InvoiceEmail, Mailer, ProbeReport};
use crate::config::SmtpConfig;
use crate::error::DispatchError;
use crate::matcher::attachment_name;

/// lettre-backed [`Mailer`].
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build a fresh transport: STARTTLS or plaintext, login only when a
    /// username is configured, every connection bounded by the timeout.
    fn transport(config: &SmtpConfig) -> Result<SmtpTransport, DispatchError> {
        let mut builder = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .timeout(Some(config.timeout));

        builder = if config.starttls {
            let params = TlsParameters::new(config.host.clone())?;
            builder.tls(Tls::Required(params))
        } else {
            builder.tls(Tls::None)
        };

        if config.has_credentials() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password().to_string(),
            ));
        }

        Ok(builder.build())
    }

    /// Send on the current (blocking) thread.
    fn send_blocking(config: &SmtpConfig, email: &InvoiceEmail) -> Result<(), DispatchError> {
        let message = build_message(email)?;
        let transport = Self::transport(config)?;
        transport.send(&message)?;
        Ok(())
    }

    fn probe_blocking(config: &SmtpConfig) -> Result<bool, DispatchError> {
        Ok(Self::transport(config)?.test_connection()?)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &InvoiceEmail) -> Result<(), DispatchError> {
        let config = self.config.clone();
        let email = email.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&config, &email))
            .await
            .map_err(|e| DispatchError::TaskFailed(e.to_string()))?
    }

    async fn probe(&self) -> ProbeReport {
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || Self::probe_blocking(&config))
            .await
            .map_err(|e| DispatchError::TaskFailed(e.to_string()))
            .and_then(|r| r);

        match result {
            Ok(true) => ProbeReport {
                ok: true,
                message: "SMTP connection successful".to_string(),
            },
            Ok(false) => ProbeReport {
                ok: false,
                message: "SMTP test failed: server did not respond to NOOP".to_string(),
            },
            Err(e) => ProbeReport {
                ok: false,
                message: format!("SMTP test failed: {e}"),
            },
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DispatchError> {
    address.parse().map_err(|e: lettre::address::AddressError| {
        DispatchError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Content type for the attachment, by extension.
fn attachment_content_type(path: &Path) -> ContentType {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    let mime = if is_pdf {
        "application/pdf"
    } else {
        "application/octet-stream"
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}

/// Build the MIME message: plain-text body plus one binary attachment.
///
/// The attachment is read from disk here, so a read failure surfaces as a
/// (transient) I/O error of this attempt.
pub fn build_message(email: &InvoiceEmail) -> Result<Message, DispatchError> {
    if email.to.is_empty() {
        return Err(DispatchError::Build("no recipients".into()));
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from)?)
        .subject(email.subject.as_str());
    for recipient in &email.to {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let bytes = std::fs::read(&email.attachment)?;
    let attachment = Attachment::new(attachment_name(&email.attachment))
        .body(bytes, attachment_content_type(&email.attachment));

    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(email.body.clone()))
                .singlepart(attachment),
        )
        .map_err(|e| DispatchError::Build(e.to_string()))
}
