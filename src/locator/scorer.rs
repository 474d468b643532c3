use serde::{Deserialize, Serialize};

use crate::locator::locator_model::{ElementAttributes, Locator, LocatorSet, Strategy};
use crate::locator::normalize::{
    Volatility, classify_volatility, has_positional_predicate, looks_dynamic, path_depth,
};

/// Locators scoring below this are kept but never presented.
pub const MIN_USABLE_SCORE: f64 = 0.1;

/// Fraction removed from a score when the value looks generated.
pub const DYNAMIC_PENALTY: f64 = 0.3;

const POSITIONAL_FACTOR: f64 = 0.8;
const DEEP_PATH_FACTOR: f64 = 0.7;
const MAX_STABLE_DEPTH: usize = 5;
const ANCHORED_PATH_FACTOR: f64 = 1.2;
const ANCHORED_PATH_CAP: f64 = 0.8;

/// Stability of `strategy` for an element with these attributes, in [0, 1].
///
/// Pure: the result depends only on the strategy prior and the attribute
/// value the strategy would use. Absent attributes score 0.
pub fn score(strategy: Strategy, attributes: &ElementAttributes) -> f64 {
    let Some(value) = attributes.value_for(strategy) else {
        return 0.0;
    };

    let mut s = strategy.prior();
    let dynamic = looks_dynamic(value);
    if dynamic {
        s *= 1.0 - DYNAMIC_PENALTY;
    }

    match strategy {
        Strategy::StructuralPath => {
            let positional = has_positional_predicate(value)
                || attributes.sibling_index.is_some_and(|i| i > 0);
            if positional {
                s *= POSITIONAL_FACTOR;
            }
            if path_depth(value) > MAX_STABLE_DEPTH {
                s *= DEEP_PATH_FACTOR;
            }
            // A path anchored on an identifier attribute survives layout churn.
            if is_anchored(value) {
                s = (s * ANCHORED_PATH_FACTOR).min(ANCHORED_PATH_CAP);
            }
        }
        Strategy::Text => {
            if !dynamic && classify_volatility(value) == Volatility::Volatile {
                s *= 1.0 - DYNAMIC_PENALTY;
            }
        }
        Strategy::StableId | Strategy::AccessibilityId => {}
    }

    round2(s.clamp(0.0, 1.0))
}

fn is_anchored(path: &str) -> bool {
    ["@resource-id", "@content-desc", "@id=", "@name=", "@accessibility-id"]
        .iter()
        .any(|anchor| path.contains(anchor))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ============================================================================
// Stability bands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityLevel {
    Fragile,
    Poor,
    Fair,
    Good,
    Excellent,
}

pub fn stability_level(score: f64) -> StabilityLevel {
    if score >= 0.9 {
        StabilityLevel::Excellent
    } else if score >= 0.7 {
        StabilityLevel::Good
    } else if score >= 0.5 {
        StabilityLevel::Fair
    } else if score >= 0.3 {
        StabilityLevel::Poor
    } else {
        StabilityLevel::Fragile
    }
}

/// Ordered fallbacks for `primary`: every other locator the attributes
/// support, scoring at least 0.5, at most three.
pub fn recommend_fallbacks(attributes: &ElementAttributes, primary: &Locator) -> Vec<Locator> {
    LocatorSet::from_attributes(attributes)
        .iter()
        .filter(|l| !l.same_target(primary) && l.stability_score >= 0.5)
        .take(3)
        .cloned()
        .collect()
}
