//! Overflow file naming.
//!
//! A payload larger than the inline threshold lives in its own file under the
//! store root:
//!
//! ```text
//! <root>/<escaped key>_<version>_<escaped subkey>.ov_
//! ```
//!
//! Escaping percent-encodes every byte outside `[A-Za-z0-9.-]`, which keeps
//! names valid on any filesystem and makes `_` an unambiguous separator.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::entry::EntryKey;

/// Extension marking overflow files.
pub const OVERFLOW_EXTENSION: &str = "ov_";

/// Extension of files still being written; renamed to an overflow file on
/// commit and deleted on abort.
pub const STAGING_EXTENSION: &str = "ov_tmp";

/// Deterministic overflow file path for an entry.
pub fn overflow_path(root: &Path, entry: &EntryKey) -> PathBuf {
    root.join(format!(
        "{}_{}_{}.{}",
        escape(&entry.key),
        entry.version,
        escape(&entry.subkey),
        OVERFLOW_EXTENSION
    ))
}

/// Returns `true` if `path` follows the overflow file naming convention.
pub fn is_overflow_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == OVERFLOW_EXTENSION)
}

/// Returns `true` if `path` is a staging file left by an unfinished write.
pub fn is_staging_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == STAGING_EXTENSION)
}

/// Every overflow file directly under `root`.
///
/// A missing root yields an empty list.
pub fn list_overflow_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    list_matching(root, is_overflow_file)
}

/// Every staging file directly under `root`.
pub fn list_staging_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    list_matching(root, is_staging_file)
}

fn list_matching(root: &Path, matches: fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && matches(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-') {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}
