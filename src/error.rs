use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the session-scoped event store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session '{0}' does not exist")]
    UnknownSession(String),

    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    #[error("session '{0}' is sealed; no further events may be appended")]
    SessionSealed(String),

    #[error("event belongs to session '{event}' but was appended to '{session}'")]
    SessionMismatch { session: String, event: String },

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// A malformed input record. Always isolated to the record that caused it.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed event ({context}): {source}")]
    Event {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed test report ({context}): {message}")]
    Report { context: String, message: String },

    #[error("malformed page snapshot '{reference}': {message}")]
    Snapshot { reference: String, message: String },

    #[error("malformed static hints ({context}): {message}")]
    Hints { context: String, message: String },

    #[error("malformed classifier artifact '{path}': {message}")]
    Classifier { path: PathBuf, message: String },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while editing a locator-definition source file.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("source file {0} does not exist")]
    FileMissing(PathBuf),

    #[error("locator '{locator}' not found on {file}:{line}")]
    LiteralNotFound {
        file: PathBuf,
        line: u32,
        locator: String,
    },

    #[error("line {line} is out of range for {file}")]
    LineOutOfRange { file: PathBuf, line: u32 },

    #[error("backup {0} is missing; cannot restore")]
    BackupMissing(PathBuf),

    #[error("{0} resolves outside the repository")]
    OutsideRepository(PathBuf),

    #[error("I/O error ({context}) on {path}: {source}")]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the version-control adapter.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to spawn `git {command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("version control rejected the commit: {0}")]
    Rejected(String),
}

/// Configuration validation failures.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid min_confidence: {0}. Must be within [0, 1]")]
    InvalidMinConfidence(f64),

    #[error("invalid classifier_weight: {0}. Must be within [0, 1]")]
    InvalidClassifierWeight(f64),

    #[error("invalid workers: {0}. Must be at least 1")]
    InvalidWorkers(usize),

    #[error("invalid correlation window: {0}ms. Must be positive")]
    InvalidWindow(u64),

    #[error("invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Umbrella error for healing operations that cannot be expressed as an
/// `unresolved` decision (rollback, log access, artifact loading).
#[derive(Debug, Error)]
pub enum HealError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("no healed record found for commit '{0}'")]
    UnknownCommit(String),

    #[error("record for commit '{0}' was already rolled back")]
    AlreadyRejected(String),

    #[error("healing log I/O error ({context}): {source}")]
    Log {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker task failed: {0}")]
    Worker(String),
}
