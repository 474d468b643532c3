use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::healing::record::{Decision, HealingRecord};

// ============================================================================
// Healing summary: aggregates HealingRecords for people
// ============================================================================

/// Healed records this close to the threshold are listed for review too.
pub const REVIEW_MARGIN: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub failure_id: String,
    pub test_id: String,
    pub locator: String,
    pub decision: Decision,
    pub confidence: f64,
    /// Why it needs a look: the unresolved reason or "near threshold"
    pub note: String,
}

/// Counts, confidence distribution and the records someone should look at.
/// Counts are per outcome: a heal that was later rolled back is counted once,
/// as rejected, and drops out of the confidence figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingSummary {
    pub total: usize,
    pub healed: usize,
    pub unresolved: usize,
    pub rejected: usize,

    /// Unresolved records per reason
    pub by_reason: BTreeMap<String, usize>,

    /// Ten buckets of width 0.1 over healed and unresolved confidences;
    /// 1.0 lands in the last bucket
    pub histogram: [usize; 10],

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_confidence: Option<f64>,

    pub min_confidence: f64,

    pub needs_review: Vec<ReviewItem>,
}

impl HealingSummary {
    pub fn from_records(records: &[HealingRecord], min_confidence: f64) -> Self {
        let reverted = |healed: &HealingRecord| {
            healed.is_healed() && records.iter().any(|r| r.reverts_heal(healed))
        };
        let mut summary = Self {
            total: 0,
            healed: 0,
            unresolved: 0,
            rejected: 0,
            by_reason: BTreeMap::new(),
            histogram: [0; 10],
            mean_confidence: None,
            min_confidence,
            needs_review: Vec::new(),
        };

        let mut confidence_sum = 0.0;
        let mut scored = 0usize;
        for record in records {
            if reverted(record) {
                continue;
            }
            summary.total += 1;
            match record.decision {
                Decision::Healed => summary.healed += 1,
                Decision::Unresolved => summary.unresolved += 1,
                Decision::Rejected => {
                    summary.rejected += 1;
                    continue;
                }
            }

            let bucket = ((record.confidence.clamp(0.0, 1.0) * 10.0).floor() as usize).min(9);
            summary.histogram[bucket] += 1;
            confidence_sum += record.confidence;
            scored += 1;

            let note = match (record.decision, record.reason) {
                (Decision::Unresolved, Some(reason)) => Some(reason.to_string()),
                (Decision::Unresolved, None) => Some("unresolved".to_string()),
                (Decision::Healed, _) if record.confidence < min_confidence + REVIEW_MARGIN => {
                    Some("near threshold".to_string())
                }
                _ => None,
            };
            if let (Decision::Unresolved, Some(reason)) = (record.decision, record.reason) {
                *summary.by_reason.entry(reason.to_string()).or_insert(0) += 1;
            }
            if let Some(note) = note {
                summary.needs_review.push(ReviewItem {
                    failure_id: record.failure_id.clone(),
                    test_id: record.test_id.clone(),
                    locator: record.old_locator.to_string(),
                    decision: record.decision,
                    confidence: record.confidence,
                    note,
                });
            }
        }

        if scored > 0 {
            summary.mean_confidence = Some((confidence_sum / scored as f64 * 100.0).round() / 100.0);
        }
        summary
    }
}

/// Format a healing summary for terminal output.
///
/// ```text
/// === Healing: 2 healed, 1 unresolved, 0 rejected (3 total) ===
///
/// Confidence (mean 0.71):
///   0.8-0.9  ## 2
///   ...
///
/// Needs review:
///   ✗ login_test  stable-id=login_btn  (0.45, low confidence)
/// ```
pub fn format_console_summary(summary: &HealingSummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== Healing: {} healed, {} unresolved, {} rejected ({} total) ===\n",
        summary.healed, summary.unresolved, summary.rejected, summary.total
    ));

    if let Some(mean) = summary.mean_confidence {
        out.push_str(&format!("\nConfidence (mean {:.2}, threshold {:.2}):\n", mean, summary.min_confidence));
        for (i, count) in summary.histogram.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            out.push_str(&format!(
                "  {:.1}-{:.1}  {} {}\n",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                "#".repeat((*count).min(40)),
                count
            ));
        }
    }

    if !summary.by_reason.is_empty() {
        out.push_str("\nUnresolved:\n");
        for (reason, count) in &summary.by_reason {
            out.push_str(&format!("  {:<20} {}\n", reason, count));
        }
    }

    if !summary.needs_review.is_empty() {
        out.push_str("\nNeeds review:\n");
        for item in &summary.needs_review {
            let marker = match item.decision {
                Decision::Healed => "\u{26a0}",
                _ => "\u{2717}",
            };
            out.push_str(&format!(
                "  {} {}  {}  ({:.2}, {})\n",
                marker, item.test_id, item.locator, item.confidence, item.note
            ));
        }
    }

    out
}
