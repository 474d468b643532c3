use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::healing::discovery::Candidate;
use crate::locator::locator_model::Strategy;
use crate::locator::normalize::looks_dynamic;
use crate::locator::scorer::score;

/// A learned estimate of how likely a candidate is the right element.
/// Plugged into scoring when configured; scoring works the same without it.
pub trait ConfidenceModel: Send + Sync {
    /// Probability in [0, 1].
    fn predict(&self, candidate: &Candidate) -> f64;

    fn name(&self) -> &str {
        "classifier"
    }
}

/// Heuristic confidence: the locator's stability score.
pub fn heuristic_confidence(candidate: &Candidate) -> f64 {
    score(candidate.strategy, &candidate.attributes)
}

/// Weighted average of heuristic and model scores, rounded to two decimals.
/// Without a model the heuristic is returned unchanged.
pub fn blend(heuristic: f64, model: Option<f64>, classifier_weight: f64) -> f64 {
    let combined = match model {
        Some(m) => {
            let w = classifier_weight.clamp(0.0, 1.0);
            (1.0 - w) * heuristic + w * m.clamp(0.0, 1.0)
        }
        None => heuristic,
    };
    (combined * 100.0).round() / 100.0
}

// ============================================================================
// Logistic classifier artifact
// ============================================================================

/// A logistic model over named candidate features, stored as JSON:
/// `{"version": "1", "bias": -1.2, "weights": {"stability": 2.5, ...}}`.
/// Unknown feature names are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub bias: f64,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl LogisticModel {
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: LogisticModel =
            serde_json::from_str(&content).map_err(|e| ParseError::Classifier {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        if model.weights.values().any(|w| !w.is_finite()) || !model.bias.is_finite() {
            return Err(ParseError::Classifier {
                path: path.to_path_buf(),
                message: "weights must be finite numbers".to_string(),
            });
        }
        Ok(model)
    }

    /// Feature vector the weights are keyed by.
    pub fn features(candidate: &Candidate) -> BTreeMap<&'static str, f64> {
        let attrs = &candidate.attributes;
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let mut f = BTreeMap::new();
        f.insert("stability", heuristic_confidence(candidate));
        f.insert("prior", candidate.strategy.prior());
        f.insert("resemblance", candidate.resemblance);
        f.insert("has_stable_id", flag(attrs.value_for(Strategy::StableId).is_some()));
        f.insert(
            "has_accessibility_id",
            flag(attrs.value_for(Strategy::AccessibilityId).is_some()),
        );
        f.insert("has_text", flag(attrs.value_for(Strategy::Text).is_some()));
        f.insert("dynamic_value", flag(looks_dynamic(&candidate.value)));
        f.insert(
            "value_length",
            (candidate.value.chars().count() as f64 / 50.0).min(1.0),
        );
        for strategy in Strategy::ALL {
            let key = match strategy {
                Strategy::StableId => "strategy_stable_id",
                Strategy::AccessibilityId => "strategy_accessibility_id",
                Strategy::StructuralPath => "strategy_structural_path",
                Strategy::Text => "strategy_text",
            };
            f.insert(key, flag(candidate.strategy == strategy));
        }
        f
    }
}

impl ConfidenceModel for LogisticModel {
    fn predict(&self, candidate: &Candidate) -> f64 {
        let z = Self::features(candidate)
            .iter()
            .filter_map(|(name, value)| self.weights.get(*name).map(|w| w * value))
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }

    fn name(&self) -> &str {
        "logistic"
    }
}
