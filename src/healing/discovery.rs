use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::healing::failure_analyzer::FailureRecord;
use crate::healing::snapshot::PageSnapshot;
use crate::locator::locator_model::{ElementAttributes, Strategy};
use crate::locator::normalize::identity_tokens;

/// A proposed replacement locator. Unscored; ranking happens in the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub strategy: Strategy,
    pub value: String,
    pub attributes: ElementAttributes,
    /// Token overlap with the failed locator, in [0, 1]
    pub resemblance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Strategies the target platform supports
    pub allowed_strategies: BTreeSet<Strategy>,
    /// Elements below this resemblance are not considered
    pub min_resemblance: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allowed_strategies: Strategy::ALL.into_iter().collect(),
            min_resemblance: 0.01,
        }
    }
}

/// Common abbreviations in element identifiers.
const ABBREVIATIONS: [(&str, &str); 8] = [
    ("btn", "button"),
    ("txt", "text"),
    ("lbl", "label"),
    ("img", "image"),
    ("pwd", "password"),
    ("et", "edittext"),
    ("tv", "textview"),
    ("iv", "imageview"),
];

fn expanded_tokens(value: &str) -> BTreeSet<String> {
    identity_tokens(value)
        .into_iter()
        .map(|t| {
            ABBREVIATIONS
                .iter()
                .find(|(short, _)| *short == t)
                .map(|(_, long)| long.to_string())
                .unwrap_or(t)
        })
        .collect()
}

fn element_tokens(attrs: &ElementAttributes) -> BTreeSet<String> {
    [
        &attrs.stable_id,
        &attrs.accessibility_id,
        &attrs.text,
        &attrs.class_name,
    ]
    .iter()
    .filter_map(|v| v.as_deref())
    .flat_map(expanded_tokens)
    .collect()
}

/// Fraction of the failed locator's tokens found on the element.
pub fn resemblance(failed_value: &str, attrs: &ElementAttributes) -> f64 {
    let wanted = expanded_tokens(failed_value);
    if wanted.is_empty() {
        return 0.0;
    }
    let have = element_tokens(attrs);
    let shared = wanted.intersection(&have).count();
    shared as f64 / wanted.len() as f64
}

/// Enumerate replacement candidates for `failure` from `snapshot`.
///
/// Only elements resembling the failed one are considered; an empty result
/// is normal when nothing resembles it. Locators that would match more than
/// one element in the snapshot, or that equal the failed locator, are pruned.
pub fn discover(
    failure: &FailureRecord,
    snapshot: &PageSnapshot,
    config: &DiscoveryConfig,
) -> Vec<Candidate> {
    let elements = snapshot.elements();
    let failed = &failure.failing_locator;

    // How many snapshot elements each (strategy, value) would match.
    let mut occurrences: BTreeMap<(Strategy, &str), usize> = BTreeMap::new();
    for attrs in &elements {
        for strategy in Strategy::ALL {
            if let Some(value) = attrs.value_for(strategy) {
                *occurrences.entry((strategy, value)).or_insert(0) += 1;
            }
        }
    }

    let mut candidates = Vec::new();
    let mut seen: BTreeSet<(Strategy, String)> = BTreeSet::new();

    for attrs in &elements {
        let r = resemblance(&failed.value, attrs);
        if r < config.min_resemblance || r == 0.0 {
            continue;
        }
        for strategy in Strategy::ALL {
            if !config.allowed_strategies.contains(&strategy) {
                continue;
            }
            let Some(value) = attrs.value_for(strategy) else {
                continue;
            };
            if strategy == failed.strategy && value == failed.value {
                continue;
            }
            if occurrences.get(&(strategy, value)).copied().unwrap_or(0) > 1 {
                continue;
            }
            if !seen.insert((strategy, value.to_string())) {
                continue;
            }
            candidates.push(Candidate {
                strategy,
                value: value.to_string(),
                attributes: (*attrs).clone(),
                resemblance: (r * 100.0).round() / 100.0,
            });
        }
    }

    debug!(
        failure_id = %failure.failure_id,
        snapshot = %snapshot.reference,
        elements = elements.len(),
        candidates = candidates.len(),
        "candidate discovery finished"
    );
    candidates
}
