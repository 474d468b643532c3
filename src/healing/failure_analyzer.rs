use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::locator::locator_model::Strategy;
use crate::locator::normalize::text_fingerprint;

// ============================================================================
// Records
// ============================================================================

/// A locator as written in a test's source, without a score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatorRef {
    pub strategy: Strategy,
    pub value: String,
}

impl fmt::Display for LocatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 1-based
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// One "element lookup failed" entry from a test report. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub failure_id: String,
    pub test_id: String,
    pub failing_locator: LocatorRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_ref: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl FailureRecord {
    pub fn new(
        test_id: &str,
        failing_locator: LocatorRef,
        source_location: Option<SourceLocation>,
        snapshot_ref: Option<String>,
        message: &str,
    ) -> Self {
        let location = source_location
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_default();
        let digest = text_fingerprint(&format!("{}|{}|{}", test_id, failing_locator, location));
        Self {
            failure_id: digest[..12].to_string(),
            test_id: test_id.to_string(),
            failing_locator,
            source_location,
            snapshot_ref,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub records: Vec<FailureRecord>,
    /// Malformed report entries
    pub skipped: usize,
    pub passed: usize,
    pub not_run: usize,
    /// Failures that are not element lookups, or whose locator could not be read
    pub other_failures: usize,
    pub errors: Vec<String>,
}

// ============================================================================
// Report format
// ============================================================================

#[derive(Debug, Deserialize)]
struct TestEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    test_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    trace: Option<String>,
    #[serde(default)]
    stack_trace: Option<String>,
    #[serde(default)]
    source: Option<SourceField>,
    #[serde(default)]
    snapshot: Option<String>,
    #[serde(default)]
    snapshot_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceField {
    Text(String),
    Structured { file: String, line: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Passed,
    Failed,
    NotRun,
}

impl TestEntry {
    fn test_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.test_id.as_deref())
            .or(self.name.as_deref())
    }

    fn outcome(&self) -> Outcome {
        match self.status.as_deref().map(str::to_lowercase).as_deref() {
            Some("passed" | "pass" | "ok" | "success") => Outcome::Passed,
            Some("skipped" | "skip" | "pending" | "ignored") => Outcome::NotRun,
            Some(_) => Outcome::Failed,
            None if self.message.is_some() || self.error.is_some() => Outcome::Failed,
            None => Outcome::Passed,
        }
    }

    fn text(&self) -> String {
        [&self.message, &self.error, &self.trace, &self.stack_trace]
            .iter()
            .filter_map(|s| s.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Patterns
// ============================================================================

static LOOKUP_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(no such element|nosuchelement|unable to find element|element\b.*\bnot found|could not find element|no element found|did not match any elements)",
    )
    .unwrap()
});

static CANONICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(stable-id|accessibility-id|structural-path|text)=(?:"([^"]+)"|'([^']+)'|([^\s'",)]+))"#,
    )
    .unwrap()
});

static APPIUM_USING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)using='([\w -]+)',\s*value='([^']+)'").unwrap());

static BY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"By\.(\w+):\s*([^\s)]+)").unwrap());

static KEYED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(accessibility[ _]id|resource-id|xpath|id|text)['"]?\s*[=:]\s*['"]([^'"]+)['"]"#)
        .unwrap()
});

static PY_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"File "([^"]+)", line (\d+)"#).unwrap());

static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w./\\-]+\.(?:py|java|kt|kts|swift|js|ts|rb|rs|cs|dart|robot|feature)):(\d+)")
        .unwrap()
});

pub fn is_lookup_failure(text: &str) -> bool {
    LOOKUP_FAILURE.is_match(text)
}

/// First locator literal found in `text`, trying the canonical
/// `strategy=value` form before framework-specific spellings.
pub fn extract_locator(text: &str) -> Option<LocatorRef> {
    if let Some(c) = CANONICAL.captures(text) {
        let strategy = c.get(1)?.as_str().parse::<Strategy>().ok()?;
        let value = c.get(2).or(c.get(3)).or(c.get(4))?.as_str();
        return Some(LocatorRef {
            strategy,
            value: value.to_string(),
        });
    }
    for pattern in [&*APPIUM_USING, &*BY_PREFIX, &*KEYED] {
        for c in pattern.captures_iter(text) {
            let (Some(kind), Some(value)) = (c.get(1), c.get(2)) else {
                continue;
            };
            if let Ok(strategy) = kind.as_str().parse::<Strategy>() {
                return Some(LocatorRef {
                    strategy,
                    value: value.as_str().to_string(),
                });
            }
        }
    }
    None
}

/// Source location hint. Python frames name the innermost frame last; a bare
/// `file.ext:LINE` is taken as the first one mentioned.
pub fn extract_source_location(text: &str) -> Option<SourceLocation> {
    if let Some(c) = PY_FRAME.captures_iter(text).last() {
        let line = c.get(2)?.as_str().parse().ok()?;
        return Some(SourceLocation {
            file: PathBuf::from(c.get(1)?.as_str()),
            line,
        });
    }
    let c = FILE_LINE.captures(text)?;
    Some(SourceLocation {
        file: PathBuf::from(c.get(1)?.as_str()),
        line: c.get(2)?.as_str().parse().ok()?,
    })
}

fn parse_source_field(field: &SourceField) -> Option<SourceLocation> {
    match field {
        SourceField::Structured { file, line } => Some(SourceLocation {
            file: PathBuf::from(file),
            line: *line,
        }),
        SourceField::Text(text) => {
            let (file, line) = text.trim().rsplit_once(':')?;
            Some(SourceLocation {
                file: PathBuf::from(file),
                line: line.trim().parse().ok()?,
            })
        }
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Extract lookup failures from a JSON or YAML report. Only a document that
/// cannot be read at all is an error; bad entries are skipped and counted.
pub fn analyze(content: &str, context: &str) -> Result<FailureAnalysis, ParseError> {
    let document: serde_json::Value =
        serde_yaml::from_str(content).map_err(|e| ParseError::Report {
            context: context.to_string(),
            message: e.to_string(),
        })?;

    let entries = collect_entries(document).ok_or_else(|| ParseError::Report {
        context: context.to_string(),
        message: "expected a list of tests or an object with `tests` or `suites`".to_string(),
    })?;

    let mut analysis = FailureAnalysis::default();
    for (index, raw) in entries.into_iter().enumerate() {
        let entry: TestEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(context, index, error = %e, "skipping malformed test entry");
                analysis.skipped += 1;
                analysis.errors.push(format!("entry {}: {}", index, e));
                continue;
            }
        };
        let Some(test_id) = entry.test_id().map(str::to_string) else {
            analysis.skipped += 1;
            analysis.errors.push(format!("entry {}: missing test id", index));
            continue;
        };

        match entry.outcome() {
            Outcome::Passed => analysis.passed += 1,
            Outcome::NotRun => analysis.not_run += 1,
            Outcome::Failed => {
                let text = entry.text();
                let locator = is_lookup_failure(&text)
                    .then(|| extract_locator(&text))
                    .flatten();
                let Some(locator) = locator else {
                    debug!(%test_id, "failure is not an element lookup");
                    analysis.other_failures += 1;
                    continue;
                };
                let source = entry
                    .source
                    .as_ref()
                    .and_then(parse_source_field)
                    .or_else(|| extract_source_location(&text));
                let snapshot = entry.snapshot.clone().or(entry.snapshot_ref.clone());
                let message = entry
                    .message
                    .as_deref()
                    .or(entry.error.as_deref())
                    .unwrap_or_default();
                analysis
                    .records
                    .push(FailureRecord::new(&test_id, locator, source, snapshot, message));
            }
        }
    }

    info!(
        context,
        failures = analysis.records.len(),
        skipped = analysis.skipped,
        passed = analysis.passed,
        other_failures = analysis.other_failures,
        "test report analyzed"
    );
    Ok(analysis)
}

pub fn analyze_path(path: &Path) -> Result<FailureAnalysis, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    analyze(&content, &path.display().to_string())
}

/// Flatten `[..]`, `{tests: [..]}` and `{suites: [{tests: [..]}]}`.
fn collect_entries(document: serde_json::Value) -> Option<Vec<serde_json::Value>> {
    use serde_json::Value;

    match document {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            let mut entries = Vec::new();
            let mut found = false;
            for key in ["tests", "results", "testcases"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    entries.extend(items);
                    found = true;
                }
            }
            if let Some(Value::Array(suites)) = map.remove("suites") {
                found = true;
                for suite in suites {
                    if let Some(nested) = collect_entries(suite) {
                        entries.extend(nested);
                    }
                }
            }
            found.then_some(entries)
        }
        _ => None,
    }
}
