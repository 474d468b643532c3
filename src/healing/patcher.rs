use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PatchError;
use crate::healing::failure_analyzer::LocatorRef;
use crate::locator::locator_model::Strategy;
use crate::locator::normalize::text_fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub original_sha1: String,
    pub patched_sha1: String,
    pub backup_path: PathBuf,
}

/// Framework spellings of each strategy, column-aligned so a swap keeps the
/// same framework: Appium Python client, legacy MobileBy, Java client, and
/// the plain W3C `using` string.
fn tokens_for(strategy: Strategy) -> [&'static str; 4] {
    match strategy {
        Strategy::StableId => ["AppiumBy.ID", "MobileBy.ID", "By.id(", "\"id\""],
        Strategy::AccessibilityId => [
            "AppiumBy.ACCESSIBILITY_ID",
            "MobileBy.ACCESSIBILITY_ID",
            "AppiumBy.accessibilityId(",
            "\"accessibility id\"",
        ],
        Strategy::StructuralPath => ["AppiumBy.XPATH", "MobileBy.XPATH", "By.xpath(", "\"xpath\""],
        Strategy::Text => ["AppiumBy.TEXT", "MobileBy.TEXT", "By.text(", "\"text\""],
    }
}

fn escape(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == quote || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Replace `old` with `new` inside a single source line. Tries the canonical
/// `strategy=value` literal first, then a quoted value (swapping the
/// framework strategy token alongside it). `None` when `old` is not there.
pub fn replace_literal(line: &str, old: &LocatorRef, new: &LocatorRef) -> Option<String> {
    let canonical = old.to_string();
    if line.contains(&canonical) {
        return Some(line.replacen(&canonical, &new.to_string(), 1));
    }

    for quote in ['"', '\''] {
        let needle = format!("{q}{}{q}", escape(&old.value, quote), q = quote);
        let Some(at) = line.find(&needle) else {
            continue;
        };
        let replacement = format!("{q}{}{q}", escape(&new.value, quote), q = quote);
        let (head, tail) = line.split_at(at);
        let tail = tail.replacen(&needle, &replacement, 1);
        let head = if old.strategy == new.strategy {
            head.to_string()
        } else {
            swap_strategy_token(head, old.strategy, new.strategy)
        };
        return Some(format!("{}{}", head, tail));
    }
    None
}

/// Rewrite the last strategy token before the value, if one is present.
fn swap_strategy_token(head: &str, from: Strategy, to: Strategy) -> String {
    let from_tokens = tokens_for(from);
    let to_tokens = tokens_for(to);
    let found = from_tokens
        .iter()
        .enumerate()
        .filter_map(|(column, token)| head.rfind(token).map(|at| (at, column)))
        .max_by_key(|(at, _)| *at);
    match found {
        Some((at, column)) => {
            let mut out = String::with_capacity(head.len());
            out.push_str(&head[..at]);
            out.push_str(to_tokens[column]);
            out.push_str(&head[at + from_tokens[column].len()..]);
            out
        }
        None => head.to_string(),
    }
}

fn read_source(file: &Path) -> Result<String, PatchError> {
    if !file.is_file() {
        return Err(PatchError::FileMissing(file.to_path_buf()));
    }
    std::fs::read_to_string(file).map_err(|source| PatchError::Io {
        context: "reading source".to_string(),
        path: file.to_path_buf(),
        source,
    })
}

fn write_source(file: &Path, content: &str, context: &str) -> Result<(), PatchError> {
    std::fs::write(file, content).map_err(|source| PatchError::Io {
        context: context.to_string(),
        path: file.to_path_buf(),
        source,
    })
}

/// Rewrite one line of `content` (1-based), keeping every line ending as is.
fn rewrite_line(
    file: &Path,
    content: &str,
    line: u32,
    old: &LocatorRef,
    new: &LocatorRef,
) -> Result<String, PatchError> {
    let index = (line as usize)
        .checked_sub(1)
        .ok_or_else(|| PatchError::LineOutOfRange {
            file: file.to_path_buf(),
            line,
        })?;
    let mut lines: Vec<&str> = content.split_inclusive('\n').collect();
    let target = lines.get(index).ok_or_else(|| PatchError::LineOutOfRange {
        file: file.to_path_buf(),
        line,
    })?;
    let replaced = replace_literal(target, old, new).ok_or_else(|| PatchError::LiteralNotFound {
        file: file.to_path_buf(),
        line,
        locator: old.to_string(),
    })?;
    lines[index] = &replaced;
    Ok(lines.concat())
}

/// Back up `file` to `backup_path`, then replace `old` with `new` on `line`.
/// The file is untouched when the literal cannot be found.
pub fn apply_patch(
    file: &Path,
    line: u32,
    old: &LocatorRef,
    new: &LocatorRef,
    backup_path: &Path,
) -> Result<PatchOutcome, PatchError> {
    let original = read_source(file)?;
    let patched = rewrite_line(file, &original, line, old, new)?;

    if let Some(parent) = backup_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PatchError::Io {
            context: "creating backup directory".to_string(),
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(backup_path, &original).map_err(|source| PatchError::Io {
        context: "writing backup".to_string(),
        path: backup_path.to_path_buf(),
        source,
    })?;
    debug!(backup = %backup_path.display(), "backup written");

    write_source(file, &patched, "writing patch")?;
    info!(file = %file.display(), line, old = %old, new = %new, "locator patched");

    Ok(PatchOutcome {
        original_sha1: text_fingerprint(&original),
        patched_sha1: text_fingerprint(&patched),
        backup_path: backup_path.to_path_buf(),
    })
}

/// Put the backed-up content back. Returns the SHA-1 of the restored content.
pub fn restore_backup(file: &Path, backup_path: &Path) -> Result<String, PatchError> {
    if !backup_path.is_file() {
        return Err(PatchError::BackupMissing(backup_path.to_path_buf()));
    }
    let original = std::fs::read_to_string(backup_path).map_err(|source| PatchError::Io {
        context: "reading backup".to_string(),
        path: backup_path.to_path_buf(),
        source,
    })?;
    write_source(file, &original, "restoring backup")?;
    info!(file = %file.display(), backup = %backup_path.display(), "backup restored");
    Ok(text_fingerprint(&original))
}

/// Swap `healed` back to `original` on `line` when the file has changed
/// since the patch and the backup can no longer be restored wholesale.
pub fn reverse_patch(
    file: &Path,
    line: u32,
    healed: &LocatorRef,
    original: &LocatorRef,
) -> Result<String, PatchError> {
    let content = read_source(file)?;
    let reverted = rewrite_line(file, &content, line, healed, original)?;
    write_source(file, &reverted, "reversing patch")?;
    info!(file = %file.display(), line, "patch reversed in place");
    Ok(text_fingerprint(&reverted))
}

/// SHA-1 of the file's current content, `None` if it cannot be read.
pub fn current_sha1(file: &Path) -> Option<String> {
    std::fs::read_to_string(file)
        .ok()
        .map(|c| text_fingerprint(&c))
}
