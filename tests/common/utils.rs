use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use screen_healing::error::VcsError;
use screen_healing::healing::confidence::ConfidenceModel;
use screen_healing::healing::discovery::Candidate;
use screen_healing::healing::orchestrator::{HealingConfig, Orchestrator};
use screen_healing::healing::record::HealingLog;
use screen_healing::healing::snapshot::{MemorySnapshotSource, PageSnapshot};
use screen_healing::healing::vcs::VersionControl;

/// Returns the same probability for every candidate.
pub struct FixedModel(pub f64);

impl ConfidenceModel for FixedModel {
    fn predict(&self, _candidate: &Candidate) -> f64 {
        self.0
    }
}

/// Records commits in memory and hands out sequential refs.
#[derive(Default)]
pub struct RecordingVcs {
    pub commits: Mutex<Vec<(Vec<PathBuf>, String)>>,
}

impl RecordingVcs {
    pub fn messages(&self) -> Vec<String> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl VersionControl for RecordingVcs {
    fn commit(&self, files: &[PathBuf], message: &str) -> Result<String, VcsError> {
        let mut commits = self.commits.lock().unwrap();
        commits.push((files.to_vec(), message.to_string()));
        Ok(format!("c{:039}", commits.len()))
    }
}

/// Refuses every commit.
pub struct RejectingVcs;

impl VersionControl for RejectingVcs {
    fn commit(&self, _files: &[PathBuf], _message: &str) -> Result<String, VcsError> {
        Err(VcsError::Rejected("pre-commit hook failed".to_string()))
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

pub fn config(min_confidence: f64) -> HealingConfig {
    HealingConfig {
        min_confidence,
        ..HealingConfig::default()
    }
}

/// Orchestrator over an in-memory snapshot set, a fixed model and `vcs`.
pub fn orchestrator(
    repo: &Path,
    config: HealingConfig,
    snapshots: Vec<PageSnapshot>,
    model: f64,
    vcs: Arc<dyn VersionControl>,
) -> Orchestrator {
    let mut source = MemorySnapshotSource::new();
    for snapshot in snapshots {
        source.insert(snapshot);
    }
    let log = Arc::new(HealingLog::new(repo.join(&config.log_path)));
    Orchestrator::new(config, repo, Arc::new(source), vcs, log).with_model(Arc::new(FixedModel(model)))
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn git(repo: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
