pub mod confidence;
pub mod discovery;
pub mod failure_analyzer;
pub mod orchestrator;
pub mod patcher;
pub mod record;
pub mod snapshot;
pub mod summary;
pub mod vcs;
