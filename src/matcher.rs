//! Invoice file lookup.

use std::io;
use std::path::{Path, PathBuf};

use crate::extract::AccountId;

/// Find the invoice file for `account` in `dir`.
///
/// Entries are sorted by name, so when several files share the
/// `"<account>_"` prefix the lexicographically first one always wins.
/// The extension check is a case-insensitive suffix match.
///
/// A missing directory is `Ok(None)`; any other listing failure is
/// returned so the caller can log it before treating it as no match.
pub fn find_invoice(account: &AccountId, dir: &Path, extension: &str) -> io::Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    let prefix = format!("{account}_");
    let suffix = extension.to_lowercase();

    Ok(names
        .into_iter()
        .filter(|name| name.to_lowercase().ends_with(&suffix) && name.starts_with(&prefix))
        .map(|name| dir.join(name))
        .find(|path| path.is_file()))
}

/// Just the file name part of a matched invoice, for logs and attachments.
pub fn attachment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
