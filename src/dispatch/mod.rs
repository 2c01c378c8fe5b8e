//! Dispatch engine — one invoice email, bounded retry, post-send pacing.
//!
//! The transport and the clock are both traits so the retry state machine
//! can be driven in tests without a network or real elapsed time:
//! - [`Mailer`]: opens a fresh session per call and sends one message
//! - [`Clock`]: the only place the engine waits

pub mod smtp;

pub use smtp::SmtpMailer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::DispatchPolicy;
use crate::error::DispatchError;

/// A fully rendered invoice email, ready to transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// File attached as-is, named after its basename.
    pub attachment: PathBuf,
}

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub ok: bool,
    pub message: String,
}

/// SMTP-like transport. Every call is its own session.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Connect, handshake, authenticate and transmit one message.
    async fn send(&self, email: &InvoiceEmail) -> Result<(), DispatchError>;

    /// Connect, handshake and authenticate only; never sends.
    async fn probe(&self) -> ProbeReport;
}

/// Source of deliberate waits.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sends invoice emails with retry and pacing.
pub struct DispatchEngine {
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    policy: DispatchPolicy,
}

impl DispatchEngine {
    pub fn new(mailer: Arc<dyn Mailer>, clock: Arc<dyn Clock>, policy: DispatchPolicy) -> Self {
        Self {
            mailer,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Send `email`, retrying transient failures with exponential backoff.
    ///
    /// Attempt `n` (zero-based) that fails transiently sleeps
    /// `retry_base_delay * 2^n` before attempt `n + 1`, unless it was the
    /// last of `max_retries` attempts, in which case the error is returned.
    /// Fatal errors are returned immediately. After a success the engine
    /// waits `delay_between_emails` before returning.
    pub async fn dispatch(&self, email: &InvoiceEmail) -> Result<(), DispatchError> {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt: u32 = 0;

        loop {
            match self.mailer.send(email).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Send attempt failed, retrying"
                    );
                    self.clock.sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, max_attempts, error = %e, "Send failed");
                    return Err(e);
                }
            }
        }

        info!(
            recipients = %email.to.join(", "),
            attempts = attempt + 1,
            "Invoice email sent"
        );
        self.clock.sleep(self.policy.delay_between_emails).await;
        Ok(())
    }

    /// Handshake/login check against the configured server.
    pub async fn probe(&self) -> ProbeReport {
        self.mailer.probe().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted mailer and recording clock shared by unit tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// What the scripted mailer does on one call.
    pub enum Step {
        Ok,
        Transient,
        Fatal,
    }

    /// Mailer that replays a script, then succeeds.
    #[derive(Default)]
    pub struct ScriptedMailer {
        script: Mutex<VecDeque<Step>>,
        pub sent: Mutex<Vec<InvoiceEmail>>,
        pub calls: Mutex<u32>,
    }

    impl ScriptedMailer {
        pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: Mutex::new(steps.into_iter().collect()),
                ..Default::default()
            }
        }

        pub fn always_failing() -> Self {
            Self::new(std::iter::repeat_with(|| Step::Transient).take(64))
        }

        pub fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Mailer for ScriptedMailer {
        async fn send(&self, email: &InvoiceEmail) -> Result<(), DispatchError> {
            *self.calls.lock().unwrap() += 1;
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
            match step {
                Step::Ok => {
                    self.sent.lock().unwrap().push(email.clone());
                    Ok(())
                }
                Step::Transient => Err(DispatchError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
                Step::Fatal => Err(DispatchError::InvalidAddress {
                    address: email.to.join(", "),
                    reason: "rejected".into(),
                }),
            }
        }

        async fn probe(&self) -> ProbeReport {
            ProbeReport {
                ok: true,
                message: "SMTP connection successful".into(),
            }
        }
    }

    /// Clock that records requested waits instead of sleeping.
    #[derive(Default)]
    pub struct RecordingClock {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingClock {
        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }
}
