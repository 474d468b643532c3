use screen_healing::error::{ConfigError, ParseError};
use screen_healing::healing::confidence::{ConfidenceModel, LogisticModel, blend};
use screen_healing::healing::discovery::Candidate;
use screen_healing::healing::orchestrator::HealingConfig;
use screen_healing::healing::record::{
    Decision, HealingLog, HealingRecord, UnresolvedReason, read_records,
};
use screen_healing::healing::summary::{HealingSummary, format_console_summary};
use screen_healing::locator::locator_model::Strategy;

use crate::common::builders::{attrs_with_a11y, failure, locator};
use crate::common::utils::write_file;

mod common;

fn unresolved(test_id: &str, reason: UnresolvedReason, confidence: f64) -> HealingRecord {
    let failure = failure(
        test_id,
        locator(Strategy::StableId, &format!("{}_btn", test_id)),
        "tests/app_test.py",
        4,
        "snap",
    );
    let mut record = HealingRecord::unresolved(&failure, reason);
    record.confidence = confidence;
    record
}

fn healed(test_id: &str, confidence: f64, commit: &str) -> HealingRecord {
    let mut record = unresolved(test_id, UnresolvedReason::NoCandidate, confidence);
    record.decision = Decision::Healed;
    record.reason = None;
    record.new_locator = Some(locator(Strategy::AccessibilityId, test_id));
    record.commit_ref = Some(commit.to_string());
    record
}

fn rejected(of: &HealingRecord) -> HealingRecord {
    let mut record = of.clone();
    record.decision = Decision::Rejected;
    record.reverts = of.commit_ref.clone();
    record.commit_ref = Some("r0000001".to_string());
    record
}

fn candidate() -> Candidate {
    Candidate {
        strategy: Strategy::AccessibilityId,
        value: "login".to_string(),
        attributes: attrs_with_a11y("login"),
        resemblance: 0.5,
    }
}

// =========================================================================
// HealingSummary
// =========================================================================

#[test]
fn summary_counts_and_review_list() {
    let records = vec![
        healed("login", 0.82, "aaaa1111"),
        healed("logout", 0.72, "bbbb2222"),
        unresolved("checkout", UnresolvedReason::LowConfidence, 0.45),
    ];
    let summary = HealingSummary::from_records(&records, 0.7);

    assert_eq!(summary.total, 3);
    assert_eq!(summary.healed, 2);
    assert_eq!(summary.unresolved, 1);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.by_reason.get("low confidence"), Some(&1));
    assert_eq!(summary.by_reason.len(), 1);

    assert_eq!(summary.histogram[8], 1, "0.82");
    assert_eq!(summary.histogram[7], 1, "0.72");
    assert_eq!(summary.histogram[4], 1, "0.45");
    assert_eq!(summary.histogram.iter().sum::<usize>(), 3);
    assert_eq!(summary.mean_confidence, Some(0.66));

    let notes: Vec<(&str, &str)> = summary
        .needs_review
        .iter()
        .map(|i| (i.test_id.as_str(), i.note.as_str()))
        .collect();
    assert_eq!(notes, vec![("logout", "near threshold"), ("checkout", "low confidence")]);
}

#[test]
fn rolled_back_heal_counts_once_as_rejected() {
    let login = healed("login", 0.82, "aaaa1111");
    let records = vec![login.clone(), rejected(&login), healed("logout", 0.72, "bbbb2222")];
    let summary = HealingSummary::from_records(&records, 0.7);

    assert_eq!(summary.total, 2);
    assert_eq!(summary.healed, 1, "Reverted heal no longer counts as healed");
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.histogram.iter().sum::<usize>(), 1);
    assert_eq!(summary.mean_confidence, Some(0.72));
    assert_eq!(summary.needs_review.len(), 1);
}

#[test]
fn reheal_after_rollback_without_commits_counts_as_healed() {
    let mut first = healed("login", 0.82, "unused");
    first.commit_ref = None;
    let mut rejection = first.clone();
    rejection.decision = Decision::Rejected;
    rejection.reverts = Some(first.failure_id.clone());
    let mut second = first.clone();
    second.timestamp = first.timestamp + chrono::Duration::seconds(1);

    let summary = HealingSummary::from_records(&[first, rejection, second], 0.7);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.healed, 1, "Second heal is still standing");
    assert_eq!(summary.rejected, 1);
}

#[test]
fn full_confidence_lands_in_last_bucket() {
    let summary = HealingSummary::from_records(&[healed("login", 1.0, "c1")], 0.7);
    assert_eq!(summary.histogram[9], 1);
    assert!(summary.needs_review.is_empty());
}

#[test]
fn empty_summary_has_no_mean() {
    let summary = HealingSummary::from_records(&[], 0.7);
    assert_eq!(summary.total, 0);
    assert!(summary.mean_confidence.is_none());
}

#[test]
fn console_summary_lists_reviews() {
    let login = healed("login", 0.82, "aaaa1111");
    let records = vec![
        login.clone(),
        healed("logout", 0.72, "bbbb2222"),
        unresolved("checkout", UnresolvedReason::LowConfidence, 0.46),
        rejected(&login),
    ];
    let out = format_console_summary(&HealingSummary::from_records(&records, 0.7));

    assert!(out.starts_with("=== Healing: 1 healed, 1 unresolved, 1 rejected (3 total) ===\n"), "{}", out);
    assert!(out.contains("Confidence (mean 0.59, threshold 0.70):"));
    assert!(out.contains("Needs review:"));
    assert!(out.contains("checkout  stable-id=checkout_btn  (0.46, low confidence)"));
    assert!(out.contains("logout  stable-id=logout_btn  (0.72, near threshold)"));
}

// =========================================================================
// Confidence
// =========================================================================

#[test]
fn blend_weights_heuristic_and_model() {
    assert_eq!(blend(0.85, Some(0.79), 0.5), 0.82);
    assert_eq!(blend(0.85, None, 0.5), 0.85, "Heuristic alone");
    assert_eq!(blend(0.6, Some(1.0), 0.0), 0.6, "Zero weight ignores the model");
    assert_eq!(blend(0.5, Some(2.0), 1.0), 1.0, "Model output clamped");
}

#[test]
fn logistic_model_loads_and_predicts() {
    let dir = tempfile::tempdir().unwrap();
    let neutral = write_file(
        dir.path(),
        "neutral.json",
        r#"{"version": "1", "bias": 0.0, "weights": {"unknown_feature": 9.0}}"#,
    );
    let model = LogisticModel::load(&neutral).unwrap();
    assert_eq!(model.version, "1");
    assert_eq!(model.predict(&candidate()), 0.5, "Unknown features are ignored");
    assert_eq!(model.name(), "logistic");

    let confident = write_file(
        dir.path(),
        "confident.json",
        r#"{"bias": -1.0, "weights": {"stability": 4.0, "strategy_accessibility_id": 1.0}}"#,
    );
    let p = LogisticModel::load(&confident).unwrap().predict(&candidate());
    assert!(p > 0.9 && p < 1.0, "p = {}", p);
}

#[test]
fn logistic_features_describe_candidate() {
    let features = LogisticModel::features(&candidate());
    assert_eq!(features["stability"], 0.85);
    assert_eq!(features["resemblance"], 0.5);
    assert_eq!(features["has_accessibility_id"], 1.0);
    assert_eq!(features["has_stable_id"], 0.0);
    assert_eq!(features["strategy_accessibility_id"], 1.0);
    assert_eq!(features["strategy_text"], 0.0);
}

#[test]
fn broken_classifier_artifacts_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let bad = write_file(dir.path(), "bad.json", "{\"weights\": [1, 2");
    assert!(matches!(LogisticModel::load(&bad), Err(ParseError::Classifier { .. })));
    assert!(LogisticModel::load(&dir.path().join("missing.json")).is_err());
}

// =========================================================================
// Configuration
// =========================================================================

#[test]
fn healing_config_validation() {
    assert!(HealingConfig::default().validate().is_ok());

    let config = HealingConfig { min_confidence: 1.5, ..HealingConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidMinConfidence(v)) if v == 1.5));

    let config = HealingConfig { classifier_weight: -0.1, ..HealingConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidClassifierWeight(_))));

    let config = HealingConfig { workers: 0, ..HealingConfig::default() };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidWorkers(0))));
}

// =========================================================================
// Healing log
// =========================================================================

#[test]
fn log_appends_and_finds_records() {
    let dir = tempfile::tempdir().unwrap();
    let log = HealingLog::new(dir.path().join("nested/healing.jsonl"));
    assert!(log.read_all().unwrap().is_empty(), "Missing log reads as empty");
    assert!(!log.path().exists(), "Nothing created until the first append");

    let login = healed("login", 0.82, "aaaa1111");
    log.append(&login).unwrap();
    log.append(&unresolved("checkout", UnresolvedReason::NoSnapshot, 0.0)).unwrap();

    assert_eq!(log.read_all().unwrap().len(), 2);
    let found = log.find_healed("aaaa").unwrap().expect("prefix match");
    assert_eq!(found.failure_id, login.failure_id);
    assert_eq!(found.new_locator, login.new_locator);
    assert!(log.find_healed("").unwrap().is_none());
    assert_eq!(
        log.find_healed_failure(&login.failure_id).unwrap().map(|r| r.test_id),
        Some("login".to_string())
    );
    assert!(!log.is_reverted(&login).unwrap());

    log.append(&rejected(&login)).unwrap();
    assert!(log.is_reverted(&login).unwrap());
}

#[test]
fn unreadable_log_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let record = serde_json::to_string(&healed("login", 0.82, "c1")).unwrap();
    let path = write_file(
        dir.path(),
        "healing.jsonl",
        &format!("{}\nnot json\n\n{}\n", record, record),
    );
    assert_eq!(read_records(&path).unwrap().len(), 2);
}
