use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cli::config::AppConfig;
use crate::correlation::correlation_model::CorrelationStrategy;
use crate::correlation::correlator::correlate_sessions;
use crate::event::store::EventStore;
use crate::healing::failure_analyzer::analyze_path;
use crate::healing::orchestrator::{Evaluation, Orchestrator};
use crate::healing::record::read_records;
use crate::healing::summary::{HealingSummary, format_console_summary};
use crate::model::app_model::AppModel;
use crate::model::builder::build_incremental;
use crate::model::hints::load_hints;

// ============================================================================
// correlate subcommand
// ============================================================================

pub struct CorrelateArgs<'a> {
    pub events: &'a [PathBuf],
    pub hints: Option<&'a Path>,
    pub model: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub strategy: Option<&'a str>,
    pub window_ms: Option<u64>,
    pub format: &'a str,
}

pub async fn cmd_correlate(
    args: CorrelateArgs<'_>,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut correlation = config.correlation.clone();
    if let Some(strategy) = args.strategy {
        correlation.strategy = strategy.parse::<CorrelationStrategy>()?;
    }
    if let Some(window_ms) = args.window_ms {
        correlation.window_ms = window_ms;
    }
    correlation.validate()?;

    let mut store = EventStore::new();
    for path in args.events {
        let outcome = store.import_path(path)?;
        if outcome.skipped > 0 {
            eprintln!(
                "{}: {} events imported, {} skipped",
                path.display(),
                outcome.imported,
                outcome.skipped
            );
        }
    }

    let sessions = store.export_all();
    let correlated = correlate_sessions(sessions, &correlation, config.healing.workers).await;
    for session in &correlated {
        for gap in &session.gaps {
            eprintln!("  [{}] {}", session.session_id, gap.message);
        }
    }

    let hints = load_hints(args.hints)?;
    let existing = match args.model {
        Some(path) if path.exists() => Some(AppModel::from_json(&std::fs::read_to_string(path)?)?),
        Some(path) => {
            warn!(path = %path.display(), "existing model not found; building a new one");
            None
        }
        None => None,
    };

    let (model, report) = build_incremental(existing, &correlated, &hints);

    let rendered = match args.format {
        "yaml" | "yml" => model.to_yaml()?,
        _ => model.to_json()?,
    };
    match args.output {
        Some(path) => std::fs::write(path, &rendered)?,
        None => println!("{}", rendered),
    }

    eprintln!(
        "Merged {} sessions: {} screens (+{} new, {} merged), {} elements (+{}), {} transitions (+{}), {} endpoints (+{})",
        correlated.len(),
        model.screen_count(),
        report.screens_added,
        report.screens_merged,
        model.element_count(),
        report.elements_added,
        model.transitions.len(),
        report.transitions_added,
        model.endpoints.len(),
        report.endpoints_added,
    );
    Ok(())
}

// ============================================================================
// heal subcommand
// ============================================================================

pub struct HealArgs<'a> {
    pub report: &'a Path,
    pub snapshots: &'a Path,
    pub repo: &'a Path,
    pub min_confidence: Option<f64>,
    pub classifier: Option<&'a Path>,
    pub workers: Option<usize>,
    pub dry_run: bool,
    pub no_commit: bool,
}

/// Returns whether every failure was healed.
pub async fn cmd_heal(
    args: HealArgs<'_>,
    config: &AppConfig,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut healing = config.healing.clone();
    if let Some(min_confidence) = args.min_confidence {
        healing.min_confidence = min_confidence;
    }
    if let Some(classifier) = args.classifier {
        healing.classifier_path = Some(classifier.to_path_buf());
    }
    if let Some(workers) = args.workers {
        healing.workers = workers;
    }
    if args.no_commit {
        healing.commit = false;
    }
    healing.validate()?;

    let analysis = analyze_path(args.report)?;
    eprintln!(
        "Report: {} lookup failures, {} other failures, {} passed, {} skipped entries",
        analysis.records.len(),
        analysis.other_failures,
        analysis.passed,
        analysis.skipped
    );
    if analysis.records.is_empty() {
        return Ok(true);
    }

    let min_confidence = healing.min_confidence;
    let orchestrator = Orchestrator::for_repo(healing, args.repo, args.snapshots)?;

    if args.dry_run {
        let evaluations = orchestrator.evaluate_all(analysis.records).await;
        print!("{}", format_evaluations(&evaluations, min_confidence));
        return Ok(evaluations.iter().all(Evaluation::is_healable));
    }

    let stopper = orchestrator.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight failures");
            stopper.request_stop();
        }
    });
    let run = orchestrator.heal_all(analysis.records).await;
    interrupt.abort();
    if run.not_processed > 0 {
        eprintln!("Stopped early: {} failures not processed", run.not_processed);
    }
    for error in &run.errors {
        eprintln!("  [ERROR] {}", error);
    }
    let summary = run.summary(min_confidence);
    print!("{}", format_console_summary(&summary));
    info!(log = %orchestrator.log().path().display(), "healing records written");
    Ok(summary.unresolved == 0 && run.errors.is_empty() && run.not_processed == 0)
}

/// One line per failure for dry runs.
pub fn format_evaluations(evaluations: &[Evaluation], min_confidence: f64) -> String {
    let mut out = format!("=== Dry run (threshold {:.2}) ===\n\n", min_confidence);
    for evaluation in evaluations {
        let failure = &evaluation.failure;
        match (evaluation.best(), evaluation.reason) {
            (Some(best), None) => out.push_str(&format!(
                "\u{2713} HEAL  {}  {} -> {}  ({:.2})\n",
                failure.test_id,
                failure.failing_locator,
                best.locator(),
                best.confidence
            )),
            (best, reason) => {
                let reason = reason.map(|r| r.to_string()).unwrap_or_default();
                let best = best
                    .map(|b| format!(", best {} at {:.2}", b.locator(), b.confidence))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "\u{2717} SKIP  {}  {}  ({}{})\n",
                    failure.test_id, failure.failing_locator, reason, best
                ));
            }
        }
    }
    out
}

// ============================================================================
// rollback subcommand
// ============================================================================

pub async fn cmd_rollback(
    repo: &Path,
    commit: &str,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::for_repo(config.healing.clone(), repo, repo)?;
    let record = orchestrator.rollback(commit).await?;
    println!(
        "Rolled back {} ({} restored){}",
        record.reverts.as_deref().unwrap_or(commit),
        record.old_locator,
        record
            .commit_ref
            .as_deref()
            .map(|c| format!(", revert commit {}", c))
            .unwrap_or_default()
    );
    Ok(())
}

// ============================================================================
// summary subcommand
// ============================================================================

pub fn cmd_summary(
    log: Option<&Path>,
    json: bool,
    config: &AppConfig,
) -> Result<HealingSummary, Box<dyn std::error::Error>> {
    let path = log.unwrap_or(config.healing.log_path.as_path());
    let records = read_records(path)?;
    let summary = HealingSummary::from_records(&records, config.healing.min_confidence);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", format_console_summary(&summary));
    }
    Ok(summary)
}
