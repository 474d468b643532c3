use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::VcsError;

/// Commits patched files. Implementations serialise commits per repository.
pub trait VersionControl: Send + Sync {
    /// Commit exactly `files` with `message`; returns the commit reference.
    fn commit(&self, files: &[PathBuf], message: &str) -> Result<String, VcsError>;
}

/// `git` on the command line, run inside `repo`.
#[derive(Debug)]
pub struct GitVcs {
    repo: PathBuf,
    author_name: String,
    author_email: String,
    lock: Mutex<()>,
}

impl GitVcs {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            author_name: "screen-healing".to_string(),
            author_email: "screen-healing@localhost".to_string(),
            lock: Mutex::new(()),
        }
    }

    fn git(&self, args: &[&str], label: &str) -> Result<String, VcsError> {
        debug!(repo = %self.repo.display(), command = label, "running git");
        let output = Command::new("git")
            .current_dir(&self.repo)
            .args(args)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: label.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(VcsError::Failed {
                command: label.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn relative<'a>(&self, file: &'a Path) -> &'a Path {
        file.strip_prefix(&self.repo).unwrap_or(file)
    }
}

impl VersionControl for GitVcs {
    fn commit(&self, files: &[PathBuf], message: &str) -> Result<String, VcsError> {
        if files.is_empty() {
            return Err(VcsError::Rejected("no files to commit".to_string()));
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let paths: Vec<String> = files
            .iter()
            .map(|f| self.relative(f).to_string_lossy().into_owned())
            .collect();

        let mut add = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        self.git(&add, "add")?;

        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        let mut commit = vec!["-c", name.as_str(), "-c", email.as_str(), "commit", "--quiet", "-m", message, "--"];
        commit.extend(paths.iter().map(String::as_str));
        self.git(&commit, "commit")?;

        let head = self.git(&["rev-parse", "HEAD"], "rev-parse")?;
        info!(repo = %self.repo.display(), commit = %head, files = files.len(), "commit created");
        Ok(head)
    }
}
