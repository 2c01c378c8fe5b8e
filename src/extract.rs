//! Identifier and recipient extraction from raw cell text.
//!
//! Pure string parsing, no I/O.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Account identifiers are exactly this many decimal digits.
pub const ACCOUNT_ID_LEN: usize = 5;

static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9]{5}\b").unwrap());
static RECIPIENT_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[;,\s]+").unwrap());

/// A 5-digit billing account code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Accepts only strings of exactly five ASCII digits.
    pub fn parse(s: &str) -> Option<Self> {
        (s.len() == ACCOUNT_ID_LEN && s.bytes().all(|b| b.is_ascii_digit()))
            .then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract account identifiers from a raw cell value.
///
/// Standalone 5-digit runs win. Only when there are none does the cell get
/// flattened to its digits and cut into 5-digit chunks from the left, with
/// any short tail dropped.
pub fn extract_account_ids(raw: Option<&str>) -> Vec<AccountId> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    let standalone: Vec<AccountId> = ACCOUNT_RE
        .find_iter(s)
        .filter_map(|m| AccountId::parse(m.as_str()))
        .collect();
    if !standalone.is_empty() {
        return standalone;
    }

    let digits: Vec<u8> = s.bytes().filter(u8::is_ascii_digit).collect();
    digits
        .chunks_exact(ACCOUNT_ID_LEN)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok().and_then(AccountId::parse))
        .collect()
}

/// Split a raw cell value into recipient addresses.
///
/// Tokens are separated by any run of commas, semicolons or whitespace;
/// only tokens containing `@` are kept. Duplicates are dropped, first
/// occurrence wins. Anything malformed is left for the transport to reject.
pub fn split_recipients(raw: Option<&str>) -> Vec<String> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };

    let mut recipients: Vec<String> = Vec::new();
    for token in RECIPIENT_SPLIT_RE.split(s).map(str::trim) {
        if token.contains('@') && !recipients.iter().any(|r| r == token) {
            recipients.push(token.to_string());
        }
    }
    recipients
}
