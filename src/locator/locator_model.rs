use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::locator::scorer::{MIN_USABLE_SCORE, score};

// ============================================================================
// Strategy
// ============================================================================

/// How a locator finds its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    StableId,
    AccessibilityId,
    StructuralPath,
    Text,
}

impl Strategy {
    /// All strategies in descending static priority.
    pub const ALL: [Strategy; 4] = [
        Strategy::StableId,
        Strategy::AccessibilityId,
        Strategy::StructuralPath,
        Strategy::Text,
    ];

    /// Static prior used as the base stability score and as the tie-breaker
    /// when two candidates score the same.
    pub fn prior(self) -> f64 {
        match self {
            Strategy::StableId => 0.95,
            Strategy::AccessibilityId => 0.85,
            Strategy::StructuralPath => 0.55,
            Strategy::Text => 0.45,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::StableId => "stable-id",
            Strategy::AccessibilityId => "accessibility-id",
            Strategy::StructuralPath => "structural-path",
            Strategy::Text => "text",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the canonical names plus the aliases test frameworks print
/// (`id`, `resource-id`, `xpath`, `accessibility id`, ...).
impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['_', ' '], "-");
        match key.as_str() {
            "stable-id" | "id" | "resource-id" | "test-id" | "testid" | "test-tag" => {
                Ok(Strategy::StableId)
            }
            "accessibility-id" | "accessibilityid" | "content-desc" | "a11y" | "name" => {
                Ok(Strategy::AccessibilityId)
            }
            "structural-path" | "xpath" | "path" | "class-chain" => Ok(Strategy::StructuralPath),
            "text" | "partial-text" | "link-text" | "label" => Ok(Strategy::Text),
            _ => Err(format!("unknown locator strategy '{}'", s)),
        }
    }
}

// ============================================================================
// Element attributes (as observed on device or in a snapshot)
// ============================================================================

/// Attributes of one on-screen element. Field aliases accept the names the
/// Android and iOS dumps use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementAttributes {
    #[serde(
        default,
        alias = "id",
        alias = "resource-id",
        alias = "resourceId",
        alias = "test_id",
        alias = "testTag",
        skip_serializing_if = "Option::is_none"
    )]
    pub stable_id: Option<String>,

    #[serde(
        default,
        alias = "content-desc",
        alias = "contentDescription",
        alias = "accessibilityId",
        skip_serializing_if = "Option::is_none"
    )]
    pub accessibility_id: Option<String>,

    #[serde(default, alias = "label", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(
        default,
        alias = "class",
        alias = "className",
        skip_serializing_if = "Option::is_none"
    )]
    pub class_name: Option<String>,

    /// Structural path from the root, e.g. `/FrameLayout/LinearLayout[2]/Button`
    #[serde(default, alias = "xpath", skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Position among same-class siblings (0-based)
    #[serde(default, alias = "index", skip_serializing_if = "Option::is_none")]
    pub sibling_index: Option<u32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ElementAttributes {
    /// The attribute value a strategy would use, if present and non-blank.
    pub fn value_for(&self, strategy: Strategy) -> Option<&str> {
        let raw = match strategy {
            Strategy::StableId => self.stable_id.as_deref(),
            Strategy::AccessibilityId => self.accessibility_id.as_deref(),
            Strategy::StructuralPath => self.path.as_deref(),
            Strategy::Text => self.text.as_deref(),
        };
        raw.map(str::trim).filter(|v| !v.is_empty())
    }

    /// True when no strategy can produce a locator from these attributes.
    pub fn is_unlocatable(&self) -> bool {
        Strategy::ALL.iter().all(|s| self.value_for(*s).is_none())
    }

    /// Fill attributes that are missing here from `other`. Present values are
    /// never overwritten. Returns the number of attributes filled.
    pub fn fill_gaps(&mut self, other: &ElementAttributes) -> usize {
        let mut filled = 0;
        filled += fill(&mut self.stable_id, &other.stable_id);
        filled += fill(&mut self.accessibility_id, &other.accessibility_id);
        filled += fill(&mut self.text, &other.text);
        filled += fill(&mut self.class_name, &other.class_name);
        filled += fill(&mut self.path, &other.path);
        if self.sibling_index.is_none() && other.sibling_index.is_some() {
            self.sibling_index = other.sibling_index;
            filled += 1;
        }
        for (k, v) in &other.extra {
            if !self.extra.contains_key(k) {
                self.extra.insert(k.clone(), v.clone());
                filled += 1;
            }
        }
        filled
    }
}

fn fill(slot: &mut Option<String>, other: &Option<String>) -> usize {
    let blank = slot.as_deref().is_none_or(|v| v.trim().is_empty());
    match other {
        Some(v) if blank && !v.trim().is_empty() => {
            *slot = Some(v.clone());
            1
        }
        _ => 0,
    }
}

// ============================================================================
// Locator
// ============================================================================

/// A strategy + value pair with its stability score. Never mutated after
/// construction; re-scoring produces a new `Locator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub strategy: Strategy,
    pub value: String,
    pub stability_score: f64,
}

/// Value used by the zero-confidence placeholder locator.
pub const SENTINEL_VALUE: &str = "//*";

impl Locator {
    /// Score `strategy` against `attributes`; `None` when the attribute the
    /// strategy needs is absent.
    pub fn scored(strategy: Strategy, attributes: &ElementAttributes) -> Option<Locator> {
        let value = attributes.value_for(strategy)?;
        Some(Locator {
            strategy,
            value: value.to_string(),
            stability_score: score(strategy, attributes),
        })
    }

    /// Placeholder inserted for elements with no usable attributes.
    pub fn sentinel() -> Locator {
        Locator {
            strategy: Strategy::StructuralPath,
            value: SENTINEL_VALUE.to_string(),
            stability_score: 0.0,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.stability_score == 0.0 && self.value == SENTINEL_VALUE
    }

    pub fn is_usable(&self) -> bool {
        self.stability_score >= MIN_USABLE_SCORE
    }

    /// Same strategy and value, ignoring score.
    pub fn same_target(&self, other: &Locator) -> bool {
        self.strategy == other.strategy && self.value == other.value
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

// ============================================================================
// LocatorSet
// ============================================================================

/// Locators for one element, sorted by descending stability score. The first
/// entry is the primary locator; the rest are ordered fallbacks. Never empty.
/// Deserialized lists are re-inserted one by one, so stored order and
/// emptiness are never trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Locator>", into = "Vec<Locator>")]
pub struct LocatorSet(Vec<Locator>);

impl From<Vec<Locator>> for LocatorSet {
    fn from(locators: Vec<Locator>) -> Self {
        let mut set = LocatorSet(vec![Locator::sentinel()]);
        for locator in locators.into_iter().filter(|l| !l.is_sentinel()) {
            set.insert(locator);
        }
        set
    }
}

impl From<LocatorSet> for Vec<Locator> {
    fn from(set: LocatorSet) -> Self {
        set.0
    }
}

impl LocatorSet {
    /// One locator per strategy the attributes support, or the sentinel.
    pub fn from_attributes(attributes: &ElementAttributes) -> LocatorSet {
        let mut set = LocatorSet(vec![Locator::sentinel()]);
        for strategy in Strategy::ALL {
            if let Some(locator) = Locator::scored(strategy, attributes) {
                set.insert(locator);
            }
        }
        set
    }

    /// Insert in sorted position. A locator with the same strategy and value
    /// replaces the existing one; a real locator displaces the sentinel.
    pub fn insert(&mut self, locator: Locator) {
        self.0.retain(|l| !l.same_target(&locator));
        if !locator.is_sentinel() {
            self.0.retain(|l| !l.is_sentinel());
        }
        let pos = self
            .0
            .partition_point(|l| ranks_before(l, &locator));
        self.0.insert(pos, locator);
    }

    pub fn primary(&self) -> &Locator {
        // Invariant: construction always leaves at least one entry.
        &self.0[0]
    }

    pub fn fallbacks(&self) -> &[Locator] {
        &self.0[1..]
    }

    /// Locators at or above the presentation floor.
    pub fn usable(&self) -> impl Iterator<Item = &Locator> {
        self.0.iter().filter(|l| l.is_usable())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Locator> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, strategy: Strategy, value: &str) -> bool {
        self.0.iter().any(|l| l.strategy == strategy && l.value == value)
    }

    pub fn as_slice(&self) -> &[Locator] {
        &self.0
    }
}

/// Ordering used for insertion: score desc, then strategy prior desc, then
/// value asc so equal inputs always produce the same order.
fn ranks_before(existing: &Locator, new: &Locator) -> bool {
    if existing.stability_score != new.stability_score {
        return existing.stability_score > new.stability_score;
    }
    if existing.strategy != new.strategy {
        return existing.strategy.prior() > new.strategy.prior();
    }
    existing.value <= new.value
}
