use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::HealError;
use crate::healing::failure_analyzer::{FailureRecord, LocatorRef, SourceLocation};
use crate::locator::locator_model::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Healed,
    Unresolved,
    Rejected,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Healed => "healed",
            Decision::Unresolved => "unresolved",
            Decision::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoCandidate,
    LowConfidence,
    NoSnapshot,
    NoSourceLocation,
    PatchFailed,
    CommitFailed,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnresolvedReason::NoCandidate => "no candidate",
            UnresolvedReason::LowConfidence => "low confidence",
            UnresolvedReason::NoSnapshot => "no snapshot",
            UnresolvedReason::NoSourceLocation => "no source location",
            UnresolvedReason::PatchFailed => "patch failed",
            UnresolvedReason::CommitFailed => "commit failed",
        };
        write!(f, "{}", s)
    }
}

/// One healing decision. Records are never edited; a rollback appends a new
/// `rejected` record pointing at the commit it reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingRecord {
    pub failure_id: String,
    pub test_id: String,
    pub old_locator: LocatorRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_locator: Option<LocatorRef>,
    /// Final (blended) confidence of the best candidate, 0 when none
    pub confidence: f64,
    #[serde(default)]
    pub heuristic_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnresolvedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
    /// For `rejected` records: the healing commit that was reverted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patched_sha1: Option<String>,
    #[serde(default)]
    pub candidates_considered: usize,
    pub timestamp: DateTime<Utc>,
}

impl HealingRecord {
    /// An `unresolved` record for `failure` with no replacement chosen.
    pub fn unresolved(failure: &FailureRecord, reason: UnresolvedReason) -> Self {
        Self {
            failure_id: failure.failure_id.clone(),
            test_id: failure.test_id.clone(),
            old_locator: failure.failing_locator.clone(),
            new_locator: None,
            confidence: 0.0,
            heuristic_score: 0.0,
            model_score: None,
            strategy: None,
            decision: Decision::Unresolved,
            reason: Some(reason),
            detail: None,
            commit_ref: None,
            reverts: None,
            source_location: failure.source_location.clone(),
            backup_path: None,
            original_sha1: None,
            patched_sha1: None,
            candidates_considered: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn is_healed(&self) -> bool {
        self.decision == Decision::Healed
    }

    /// What a rollback of this heal records in `reverts`: the commit, or the
    /// failure id when commits were disabled.
    pub fn rollback_key(&self) -> String {
        self.commit_ref
            .clone()
            .unwrap_or_else(|| self.failure_id.clone())
    }

    /// Whether this is the rejection of `healed`. Failure-id keys repeat
    /// across heals, so only rejections made after the heal count.
    pub fn reverts_heal(&self, healed: &HealingRecord) -> bool {
        self.decision == Decision::Rejected
            && self.reverts.as_deref() == Some(healed.rollback_key().as_str())
            && self.timestamp >= healed.timestamp
    }
}

// ============================================================================
// Append-only log
// ============================================================================

/// JSON-lines file of HealingRecords. The file is created on the first
/// append; appends are serialised through a mutex so concurrent workers never
/// interleave partial lines.
pub struct HealingLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl fmt::Debug for HealingLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealingLog").field("path", &self.path).finish()
    }
}

impl HealingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File, HealError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| HealError::Log {
                context: format!("creating {}", parent.display()),
                source,
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| HealError::Log {
                context: format!("opening {}", self.path.display()),
                source,
            })
    }

    pub fn append(&self, record: &HealingRecord) -> Result<(), HealError> {
        let json = serde_json::to_string(record).map_err(|e| HealError::Log {
            context: "serializing healing record".to_string(),
            source: std::io::Error::other(e),
        })?;
        let mut slot = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        let Some(file) = slot.as_mut() else {
            return Ok(());
        };
        writeln!(file, "{}", json)
            .and_then(|_| file.flush())
            .map_err(|source| HealError::Log {
                context: format!("appending to {}", self.path.display()),
                source,
            })
    }

    /// All records in append order. Unreadable lines are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<HealingRecord>, HealError> {
        read_records(&self.path)
    }

    /// The healed record whose commit is `commit_ref`. Short refs match by prefix.
    pub fn find_healed(&self, commit_ref: &str) -> Result<Option<HealingRecord>, HealError> {
        Ok(self.read_all()?.into_iter().find(|r| {
            r.is_healed()
                && r.commit_ref
                    .as_deref()
                    .is_some_and(|c| !commit_ref.is_empty() && c.starts_with(commit_ref))
        }))
    }

    /// Healed record for a failure id, latest first.
    pub fn find_healed_failure(&self, failure_id: &str) -> Result<Option<HealingRecord>, HealError> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .find(|r| r.is_healed() && r.failure_id == failure_id))
    }

    /// Whether `healed` has already been rolled back.
    pub fn is_reverted(&self, healed: &HealingRecord) -> Result<bool, HealError> {
        Ok(self.read_all()?.iter().any(|r| r.reverts_heal(healed)))
    }
}

/// Read a healing log without opening it for writing.
pub fn read_records(path: &Path) -> Result<Vec<HealingRecord>, HealError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HealError::Log {
                context: format!("reading {}", path.display()),
                source,
            });
        }
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| HealError::Log {
            context: format!("reading {}", path.display()),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HealingRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), line = index + 1, error = %e, "skipping unreadable healing record"),
        }
    }
    Ok(records)
}
