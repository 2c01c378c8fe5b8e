//! Placeholder substitution for subject and body templates.

use crate::extract::AccountId;

pub const ACCOUNT_PLACEHOLDER: &str = "%ACCOUNT%";
pub const COMPANY_PLACEHOLDER: &str = "%COMPANY%";

/// Subject and body after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Replace every `%ACCOUNT%` and `%COMPANY%` in `template`.
///
/// A missing company renders as the empty string.
pub fn render(template: &str, account: &AccountId, company: Option<&str>) -> String {
    template
        .replace(ACCOUNT_PLACEHOLDER, account.as_str())
        .replace(COMPANY_PLACEHOLDER, company.unwrap_or(""))
}

/// Render subject and body independently.
pub fn render_email(
    subject: &str,
    body: &str,
    account: &AccountId,
    company: Option<&str>,
) -> RenderedEmail {
    RenderedEmail {
        subject: render(subject, account, company),
        body: render(body, account, company),
    }
}
