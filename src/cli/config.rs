use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::correlation::correlation_model::CorrelationConfig;
use crate::error::ConfigError;
use crate::healing::orchestrator::HealingConfig;
use crate::logging::{LoggingConfig, parse_log_level};

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "screen-healing",
    version,
    about = "Builds app models from observed sessions and heals broken UI locators"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file (default: screen-healing.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log format: pretty or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Correlate recorded sessions and build (or extend) the app model
    Correlate {
        /// Event export (.jsonl/.ndjson one event per line, or JSON); repeatable
        #[arg(long, required = true)]
        events: Vec<PathBuf>,

        /// Static hints YAML (declared elements and API routes)
        #[arg(long)]
        hints: Option<PathBuf>,

        /// Existing app model JSON to merge into
        #[arg(long)]
        model: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Correlation strategy: temporal, thread or tag
        #[arg(long)]
        strategy: Option<String>,

        /// Temporal correlation window in milliseconds
        #[arg(long)]
        window_ms: Option<u64>,

        /// Output format: json or yaml
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Analyze a test report and heal broken locators
    Heal {
        /// Test report (JSON or YAML)
        #[arg(long)]
        report: PathBuf,

        /// Directory holding page snapshots referenced by the report
        #[arg(long)]
        snapshots: PathBuf,

        /// Repository containing the test sources
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Minimum confidence for applying a patch
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Learned classifier artifact (JSON)
        #[arg(long)]
        classifier: Option<PathBuf>,

        /// Worker pool size
        #[arg(long)]
        workers: Option<usize>,

        /// Score candidates and print decisions without touching any file
        #[arg(long)]
        dry_run: bool,

        /// Patch files but do not commit
        #[arg(long)]
        no_commit: bool,
    },

    /// Revert a healed locator by commit reference (or failure id)
    Rollback {
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        #[arg(long)]
        commit: String,
    },

    /// Summarize a healing log
    Summary {
        /// Healing log (default: from config, relative to the current dir)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Print JSON instead of the console summary
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `screen-healing.yaml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub healing: HealingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.correlation.validate()?;
        self.healing.validate()?;
        parse_log_level(&self.logging.level)?;
        Ok(())
    }
}

pub const DEFAULT_CONFIG_FILE: &str = "screen-healing.yaml";

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_FILE);
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

/// Level implied by `-v` flags, if any.
pub fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    }
}
