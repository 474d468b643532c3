use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, HealError, PatchError};
use crate::healing::confidence::{ConfidenceModel, LogisticModel, blend, heuristic_confidence};
use crate::healing::discovery::{Candidate, DiscoveryConfig, discover};
use crate::healing::failure_analyzer::{FailureRecord, LocatorRef};
use crate::healing::patcher::{apply_patch, current_sha1, restore_backup, reverse_patch};
use crate::healing::record::{Decision, HealingLog, HealingRecord, UnresolvedReason};
use crate::healing::snapshot::{FsSnapshotSource, SnapshotSource};
use crate::healing::summary::HealingSummary;
use crate::healing::vcs::{GitVcs, VersionControl};
use crate::locator::locator_model::Strategy;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_classifier_weight")]
    pub classifier_weight: f64,
    /// Learned classifier artifact; heuristic scoring alone when absent
    #[serde(default)]
    pub classifier_path: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Relative paths resolve against the repository root
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Create a version-control commit per patch
    #[serde(default = "default_commit")]
    pub commit: bool,
    #[serde(default = "default_allowed_strategies")]
    pub allowed_strategies: BTreeSet<Strategy>,
}

fn default_min_confidence() -> f64 { 0.7 }
fn default_classifier_weight() -> f64 { 0.5 }
fn default_workers() -> usize { 4 }
fn default_backup_dir() -> PathBuf { PathBuf::from(".screen-healing/backups") }
fn default_log_path() -> PathBuf { PathBuf::from(".screen-healing/healing.jsonl") }
fn default_commit() -> bool { true }
fn default_allowed_strategies() -> BTreeSet<Strategy> { Strategy::ALL.into_iter().collect() }

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            classifier_weight: default_classifier_weight(),
            classifier_path: None,
            workers: default_workers(),
            backup_dir: default_backup_dir(),
            log_path: default_log_path(),
            commit: default_commit(),
            allowed_strategies: default_allowed_strategies(),
        }
    }
}

impl HealingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidMinConfidence(self.min_confidence));
        }
        if !(0.0..=1.0).contains(&self.classifier_weight) {
            return Err(ConfigError::InvalidClassifierWeight(self.classifier_weight));
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }
        Ok(())
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingState {
    Detected,
    Discovered,
    Scored,
    Healed,
    Unresolved,
    Rejected,
}

impl fmt::Display for HealingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealingState::Detected => "detected",
            HealingState::Discovered => "discovered",
            HealingState::Scored => "scored",
            HealingState::Healed => "healed",
            HealingState::Unresolved => "unresolved",
            HealingState::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub heuristic: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<f64>,
    pub confidence: f64,
}

impl ScoredCandidate {
    pub fn locator(&self) -> LocatorRef {
        LocatorRef {
            strategy: self.candidate.strategy,
            value: self.candidate.value.clone(),
        }
    }
}

/// Highest confidence first; ties go to the strategy with the higher prior,
/// then the closer resemblance, then the value for a stable order.
fn rank(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.candidate.strategy.prior().total_cmp(&a.candidate.strategy.prior()))
        .then_with(|| b.candidate.resemblance.total_cmp(&a.candidate.resemblance))
        .then_with(|| a.candidate.value.cmp(&b.candidate.value))
}

/// Outcome of the side-effect-free part of healing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub failure: FailureRecord,
    /// Ranked, best first
    pub candidates: Vec<ScoredCandidate>,
    pub state: HealingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnresolvedReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Evaluation {
    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }

    /// Passed the threshold and has somewhere to write the patch.
    pub fn is_healable(&self) -> bool {
        self.reason.is_none() && self.best().is_some()
    }

    fn base_record(&self, decision: Decision) -> HealingRecord {
        let best = self.best();
        HealingRecord {
            failure_id: self.failure.failure_id.clone(),
            test_id: self.failure.test_id.clone(),
            old_locator: self.failure.failing_locator.clone(),
            new_locator: best.map(ScoredCandidate::locator),
            confidence: best.map(|b| b.confidence).unwrap_or(0.0),
            heuristic_score: best.map(|b| b.heuristic).unwrap_or(0.0),
            model_score: best.and_then(|b| b.model),
            strategy: best.map(|b| b.candidate.strategy),
            decision,
            reason: self.reason,
            detail: self.detail.clone(),
            commit_ref: None,
            reverts: None,
            source_location: self.failure.source_location.clone(),
            backup_path: None,
            original_sha1: None,
            patched_sha1: None,
            candidates_considered: self.candidates.len(),
            timestamp: Utc::now(),
        }
    }

    /// `unresolved` record carrying the best confidence seen, for visibility.
    pub fn unresolved_record(&self, reason: UnresolvedReason, detail: Option<String>) -> HealingRecord {
        let mut record = self.base_record(Decision::Unresolved);
        record.reason = Some(reason);
        record.detail = detail;
        record
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default)]
pub struct HealingRun {
    pub records: Vec<HealingRecord>,
    /// FailureRecords not started because a stop was requested
    pub not_processed: usize,
    pub errors: Vec<String>,
}

impl HealingRun {
    pub fn summary(&self, min_confidence: f64) -> HealingSummary {
        HealingSummary::from_records(&self.records, min_confidence)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

type LockRegistry = Mutex<BTreeMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Drives FailureRecords through Detected -> Discovered -> Scored ->
/// Healed | Unresolved, and Healed -> Rejected on rollback.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<HealingConfig>,
    repo_root: PathBuf,
    snapshots: Arc<dyn SnapshotSource>,
    model: Option<Arc<dyn ConfidenceModel>>,
    vcs: Arc<dyn VersionControl>,
    log: Arc<HealingLog>,
    file_locks: Arc<LockRegistry>,
    stop: Arc<AtomicBool>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("repo_root", &self.repo_root)
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        config: HealingConfig,
        repo_root: impl Into<PathBuf>,
        snapshots: Arc<dyn SnapshotSource>,
        vcs: Arc<dyn VersionControl>,
        log: Arc<HealingLog>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repo_root: repo_root.into(),
            snapshots,
            model: None,
            vcs,
            log,
            file_locks: Arc::new(Mutex::new(BTreeMap::new())),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ConfidenceModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Wire up the filesystem snapshot source, git, the healing log and the
    /// classifier artifact (if configured) for a repository on disk.
    pub fn for_repo(
        config: HealingConfig,
        repo_root: &Path,
        snapshot_dir: &Path,
    ) -> Result<Self, HealError> {
        let log_path = resolve_in(repo_root, &config.log_path);
        let log = Arc::new(HealingLog::new(log_path));
        let model = match &config.classifier_path {
            Some(path) => {
                let model = LogisticModel::load(path)?;
                info!(path = %path.display(), version = %model.version, "classifier loaded");
                Some(Arc::new(model) as Arc<dyn ConfidenceModel>)
            }
            None => None,
        };
        let mut orchestrator = Self::new(
            config,
            repo_root,
            Arc::new(FsSnapshotSource::new(snapshot_dir)),
            Arc::new(GitVcs::new(repo_root)),
            log,
        );
        orchestrator.model = model;
        Ok(orchestrator)
    }

    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    pub fn log(&self) -> &HealingLog {
        &self.log
    }

    /// Stop picking up new FailureRecords. Work already started finishes.
    pub fn request_stop(&self) {
        self.stop.store(true, AtomicOrdering::SeqCst);
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        resolve_in(&self.repo_root, path)
    }

    /// Resolve a report-supplied source path, refusing anything that lands
    /// outside the repository once symlinks and `..` are resolved.
    fn confine(&self, path: &Path) -> Result<PathBuf, PatchError> {
        let outside = || PatchError::OutsideRepository(path.to_path_buf());
        let root = std::fs::canonicalize(&self.repo_root).map_err(|_| outside())?;
        let file = std::fs::canonicalize(self.resolve(path))
            .map_err(|_| PatchError::FileMissing(self.resolve(path)))?;
        let relative = file.strip_prefix(&root).map_err(|_| outside())?;
        Ok(self.repo_root.join(relative))
    }

    fn file_lock(&self, file: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let key = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        let mut locks = self.file_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key).or_default())
    }

    fn transition(&self, failure: &FailureRecord, state: HealingState) {
        debug!(failure_id = %failure.failure_id, %state, "healing state changed");
    }

    // ------------------------------------------------------------------------
    // Evaluate (no side effects)
    // ------------------------------------------------------------------------

    /// Discover and score candidates for one failure and decide whether it
    /// can be healed. Never touches the source tree.
    pub fn evaluate(&self, failure: &FailureRecord) -> Evaluation {
        self.transition(failure, HealingState::Detected);
        let mut evaluation = Evaluation {
            failure: failure.clone(),
            candidates: Vec::new(),
            state: HealingState::Detected,
            reason: None,
            detail: None,
        };

        let snapshot = match failure.snapshot_ref.as_deref() {
            None => return self.unresolved(evaluation, UnresolvedReason::NoSnapshot, None),
            Some(reference) => match self.snapshots.load(reference) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    return self.unresolved(evaluation, UnresolvedReason::NoSnapshot, Some(e.to_string()));
                }
            },
        };

        let discovery = DiscoveryConfig {
            allowed_strategies: self.config.allowed_strategies.clone(),
            ..DiscoveryConfig::default()
        };
        let candidates = discover(failure, &snapshot, &discovery);
        evaluation.state = HealingState::Discovered;
        self.transition(failure, HealingState::Discovered);

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let heuristic = heuristic_confidence(&candidate);
                let model = self.model.as_deref().map(|m| m.predict(&candidate));
                let confidence = blend(heuristic, model, self.config.classifier_weight);
                ScoredCandidate {
                    candidate,
                    heuristic,
                    model,
                    confidence,
                }
            })
            .collect();
        scored.sort_by(rank);
        evaluation.candidates = scored;
        evaluation.state = HealingState::Scored;
        self.transition(failure, HealingState::Scored);

        let Some(best) = evaluation.best() else {
            return self.unresolved(evaluation, UnresolvedReason::NoCandidate, None);
        };
        if best.confidence < self.config.min_confidence {
            let detail = format!(
                "best candidate {} scored {:.2}, below {:.2}",
                best.locator(),
                best.confidence,
                self.config.min_confidence
            );
            return self.unresolved(evaluation, UnresolvedReason::LowConfidence, Some(detail));
        }
        if failure.source_location.is_none() {
            return self.unresolved(evaluation, UnresolvedReason::NoSourceLocation, None);
        }
        evaluation
    }

    fn unresolved(
        &self,
        mut evaluation: Evaluation,
        reason: UnresolvedReason,
        detail: Option<String>,
    ) -> Evaluation {
        info!(
            failure_id = %evaluation.failure.failure_id,
            state = %HealingState::Unresolved,
            %reason,
            best_confidence = evaluation.best().map(|b| b.confidence).unwrap_or(0.0),
            "failure left unresolved"
        );
        evaluation.state = HealingState::Unresolved;
        evaluation.reason = Some(reason);
        evaluation.detail = detail;
        evaluation
    }

    /// Evaluate many failures on the worker pool. Input order is kept.
    pub async fn evaluate_all(&self, failures: Vec<FailureRecord>) -> Vec<Evaluation> {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(failures.len());
        for failure in failures {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                tokio::task::spawn_blocking(move || this.evaluate(&failure)).await
            }));
        }

        let mut evaluations = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(evaluation)) => evaluations.push(evaluation),
                Ok(Err(e)) | Err(e) => warn!(error = %e, "evaluation worker failed"),
            }
        }
        evaluations
    }

    // ------------------------------------------------------------------------
    // Heal
    // ------------------------------------------------------------------------

    /// Evaluate, then patch and commit when the best candidate qualifies.
    /// Every outcome, healed or not, is appended to the healing log.
    pub async fn heal(&self, failure: FailureRecord) -> Result<HealingRecord, HealError> {
        let this = self.clone();
        let evaluation = tokio::task::spawn_blocking(move || this.evaluate(&failure))
            .await
            .map_err(|e| HealError::Worker(e.to_string()))?;

        let record = if evaluation.is_healable() {
            self.patch_and_commit(evaluation).await?
        } else {
            let reason = evaluation.reason.unwrap_or(UnresolvedReason::NoCandidate);
            evaluation.unresolved_record(reason, evaluation.detail.clone())
        };

        if let Err(e) = self.log.append(&record) {
            if record.is_healed() {
                self.undo_unlogged(&record).await;
            }
            return Err(e);
        }
        Ok(record)
    }

    /// A heal that never reached the log could not be rolled back later, so
    /// its patch (and commit) are reverted straight away.
    async fn undo_unlogged(&self, record: &HealingRecord) {
        let (Some(location), Some(new_locator)) = (record.source_location.clone(), record.new_locator.clone())
        else {
            return;
        };
        let Ok(file) = self.confine(&location.file) else {
            return;
        };
        let lock = self.file_lock(&file);
        let guard = lock.lock_owned().await;

        let this = self.clone();
        let record = record.clone();
        let failure_id = record.failure_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            this.revert_file(&record, &file, location.line, &new_locator)?;
            if let Some(commit_ref) = record.commit_ref.as_deref() {
                this.vcs.commit(&[file.clone()], &revert_message(&record, commit_ref))?;
            }
            Ok::<(), HealError>(())
        })
        .await;

        match outcome {
            Ok(Ok(())) => warn!(%failure_id, "healing log unavailable, patch undone"),
            Ok(Err(e)) => warn!(%failure_id, error = %e, "could not undo unlogged patch"),
            Err(e) => warn!(%failure_id, error = %e, "undo worker failed"),
        }
    }

    /// Restore the backup when the file is exactly as patched, otherwise
    /// swap the literal back on the recorded line.
    fn revert_file(
        &self,
        healed: &HealingRecord,
        file: &Path,
        line: u32,
        new_locator: &LocatorRef,
    ) -> Result<(), PatchError> {
        let unchanged = healed.patched_sha1.is_some() && current_sha1(file) == healed.patched_sha1;
        match (&healed.backup_path, unchanged) {
            (Some(backup), true) => restore_backup(file, backup).map(|_| ()),
            _ => reverse_patch(file, line, new_locator, &healed.old_locator).map(|_| ()),
        }
    }

    /// Holds the file's lock from backup to commit; the guard is released on
    /// every path out of this function.
    async fn patch_and_commit(&self, evaluation: Evaluation) -> Result<HealingRecord, HealError> {
        let Some(location) = evaluation.failure.source_location.clone() else {
            return Ok(evaluation.unresolved_record(UnresolvedReason::NoSourceLocation, None));
        };
        let file = match self.confine(&location.file) {
            Ok(file) => file,
            Err(e) => {
                warn!(failure_id = %evaluation.failure.failure_id, error = %e, "refusing to patch");
                return Ok(evaluation.unresolved_record(UnresolvedReason::PatchFailed, Some(e.to_string())));
            }
        };
        let lock = self.file_lock(&file);
        let guard = lock.lock_owned().await;
        debug!(file = %file.display(), failure_id = %evaluation.failure.failure_id, "file lock acquired");

        let this = self.clone();
        let record = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            this.patch_and_commit_locked(&evaluation, &file, location.line)
        })
        .await
        .map_err(|e| HealError::Worker(e.to_string()))?;
        Ok(record)
    }

    fn patch_and_commit_locked(&self, evaluation: &Evaluation, file: &Path, line: u32) -> HealingRecord {
        let failure = &evaluation.failure;
        let Some(best) = evaluation.best() else {
            return evaluation.unresolved_record(UnresolvedReason::NoCandidate, None);
        };
        let new_locator = best.locator();
        let backup_path = self
            .resolve(&self.config.backup_dir)
            .join(format!("{}.bak", failure.failure_id));

        let outcome = match apply_patch(file, line, &failure.failing_locator, &new_locator, &backup_path) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(failure_id = %failure.failure_id, error = %e, "patch failed");
                return evaluation.unresolved_record(UnresolvedReason::PatchFailed, Some(e.to_string()));
            }
        };

        let mut record = evaluation.base_record(Decision::Healed);
        record.reason = None;
        record.detail = None;
        record.backup_path = Some(outcome.backup_path.clone());
        record.original_sha1 = Some(outcome.original_sha1.clone());
        record.patched_sha1 = Some(outcome.patched_sha1.clone());

        if self.config.commit {
            let message = commit_message(&record);
            match self.vcs.commit(&[file.to_path_buf()], &message) {
                Ok(commit_ref) => record.commit_ref = Some(commit_ref),
                Err(e) => {
                    warn!(failure_id = %failure.failure_id, error = %e, "commit failed, restoring backup");
                    if let Err(restore) = restore_backup(file, &outcome.backup_path) {
                        warn!(failure_id = %failure.failure_id, error = %restore, "backup restore failed");
                    }
                    let mut unresolved =
                        evaluation.unresolved_record(UnresolvedReason::CommitFailed, Some(e.to_string()));
                    unresolved.backup_path = Some(outcome.backup_path);
                    unresolved.original_sha1 = Some(outcome.original_sha1);
                    return unresolved;
                }
            }
        }

        info!(
            failure_id = %failure.failure_id,
            state = %HealingState::Healed,
            old = %record.old_locator,
            new = %new_locator,
            confidence = record.confidence,
            commit = record.commit_ref.as_deref().unwrap_or("-"),
            "failure healed"
        );
        record
    }

    /// Heal every failure on the bounded worker pool. A stop request is
    /// honoured between failures; per-failure errors never abort the batch.
    pub async fn heal_all(&self, failures: Vec<FailureRecord>) -> HealingRun {
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(failures.len());
        for failure in failures {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if this.stop.load(AtomicOrdering::SeqCst) {
                    return None;
                }
                let failure_id = failure.failure_id.clone();
                Some(this.heal(failure).await.map_err(|e| format!("{}: {}", failure_id, e)))
            }));
        }

        let mut run = HealingRun::default();
        for handle in handles {
            match handle.await {
                Ok(Some(Ok(record))) => run.records.push(record),
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "healing failed");
                    run.errors.push(e);
                }
                Ok(None) => run.not_processed += 1,
                Err(e) => {
                    warn!(error = %e, "healing worker failed");
                    run.errors.push(e.to_string());
                }
            }
        }
        info!(
            records = run.records.len(),
            not_processed = run.not_processed,
            errors = run.errors.len(),
            "healing run finished"
        );
        run
    }

    // ------------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------------

    /// Revert a healed record, found by commit reference or failure id.
    /// Restores the backup byte-for-byte when the file is unchanged since
    /// the patch, otherwise swaps the literal back on the recorded line.
    pub async fn rollback(&self, reference: &str) -> Result<HealingRecord, HealError> {
        let healed = match self.log.find_healed(reference)? {
            Some(record) => record,
            None => self
                .log
                .find_healed_failure(reference)?
                .ok_or_else(|| HealError::UnknownCommit(reference.to_string()))?,
        };
        let key = healed.rollback_key();
        if self.log.is_reverted(&healed)? {
            return Err(HealError::AlreadyRejected(key));
        }
        let (Some(location), Some(new_locator)) = (healed.source_location.clone(), healed.new_locator.clone())
        else {
            return Err(HealError::UnknownCommit(reference.to_string()));
        };

        let file = self.confine(&location.file)?;
        let lock = self.file_lock(&file);
        let guard = lock.lock_owned().await;

        let this = self.clone();
        let rejected = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            this.rollback_locked(healed, key, &file, location.line, &new_locator)
        })
        .await
        .map_err(|e| HealError::Worker(e.to_string()))??;

        self.log.append(&rejected)?;
        Ok(rejected)
    }

    fn rollback_locked(
        &self,
        healed: HealingRecord,
        key: String,
        file: &Path,
        line: u32,
        new_locator: &LocatorRef,
    ) -> Result<HealingRecord, HealError> {
        let before = std::fs::read_to_string(file).map_err(|source| HealError::Log {
            context: format!("reading {}", file.display()),
            source,
        })?;

        self.revert_file(&healed, file, line, new_locator)?;

        let mut rejected = healed;
        rejected.decision = Decision::Rejected;
        rejected.reason = None;
        rejected.detail = Some("rolled back".to_string());
        rejected.reverts = Some(key.clone());
        rejected.commit_ref = None;
        rejected.timestamp = Utc::now();

        if self.config.commit {
            let message = revert_message(&rejected, &key);
            match self.vcs.commit(&[file.to_path_buf()], &message) {
                Ok(commit_ref) => rejected.commit_ref = Some(commit_ref),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "revert commit failed, reapplying patch");
                    if let Err(write) = std::fs::write(file, &before) {
                        warn!(file = %file.display(), error = %write, "could not reapply patch");
                    }
                    return Err(e.into());
                }
            }
        }

        info!(
            failure_id = %rejected.failure_id,
            state = %HealingState::Rejected,
            reverts = %key,
            "healing rolled back"
        );
        Ok(rejected)
    }
}

fn resolve_in(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// First line is a one-line summary; the rest is `key: value` trailers.
pub fn commit_message(record: &HealingRecord) -> String {
    let new = record
        .new_locator
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_default();
    let strategy = record.strategy.map(|s| s.to_string()).unwrap_or_default();
    format!(
        "heal(locator): {old} -> {new}\n\nold-locator: {old}\nnew-locator: {new}\nconfidence: {confidence:.2}\nstrategy: {strategy}\nfailure: {failure}\ntest: {test}\n",
        old = record.old_locator,
        new = new,
        confidence = record.confidence,
        strategy = strategy,
        failure = record.failure_id,
        test = record.test_id,
    )
}

fn revert_message(record: &HealingRecord, reverts: &str) -> String {
    let new = record
        .new_locator
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_default();
    format!(
        "revert heal(locator): {new} -> {old}\n\nreverts: {reverts}\nfailure: {failure}\ntest: {test}\n",
        new = new,
        old = record.old_locator,
        reverts = reverts,
        failure = record.failure_id,
        test = record.test_id,
    )
}
