use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::locator::locator_model::{ElementAttributes, LocatorSet};

// ============================================================================
// Elements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementSource {
    #[default]
    Observed,
    Declared,
}

/// One element of one screen. Never shared across screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub element_id: String,
    /// Identity within the owning screen (see `identity::element_signature`)
    pub signature: String,
    pub attributes: ElementAttributes,
    /// Primary first, then fallbacks. Never empty.
    pub locators: LocatorSet,
    #[serde(default)]
    pub source: ElementSource,
}

impl Element {
    pub fn new(element_id: String, signature: String, attributes: ElementAttributes) -> Self {
        let locators = LocatorSet::from_attributes(&attributes);
        Self {
            element_id,
            signature,
            attributes,
            locators,
            source: ElementSource::Observed,
        }
    }

    /// Union another observation of the same element into this one. Present
    /// attributes win; locators are rebuilt from the merged attributes and
    /// any extra locators already held are kept.
    pub fn absorb(&mut self, other: &ElementAttributes) -> usize {
        let filled = self.attributes.fill_gaps(other);
        if filled > 0 {
            let mut rebuilt = LocatorSet::from_attributes(&self.attributes);
            for locator in self.locators.iter() {
                if !rebuilt.contains(locator.strategy, &locator.value) && !locator.is_sentinel() {
                    rebuilt.insert(locator.clone());
                }
            }
            self.locators = rebuilt;
        }
        filled
    }
}

// ============================================================================
// Screens and transitions (flat graph keyed by screen fingerprint)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    /// Structural fingerprint
    pub screen_id: String,
    /// Human labels this screen was observed under
    #[serde(default)]
    pub labels: BTreeSet<String>,
    /// Keyed by element signature
    pub elements: BTreeMap<String, Element>,
    /// Ids of transitions that lead here
    #[serde(default)]
    pub entered_from: BTreeSet<String>,
    #[serde(default)]
    pub visits: usize,
}

impl Screen {
    pub fn new(screen_id: &str) -> Self {
        Self {
            screen_id: screen_id.to_string(),
            labels: BTreeSet::new(),
            elements: BTreeMap::new(),
            entered_from: BTreeSet::new(),
            visits: 0,
        }
    }

    pub fn signatures(&self) -> BTreeSet<String> {
        self.elements.keys().cloned().collect()
    }

    pub fn element_by_id(&self, element_id: &str) -> Option<&Element> {
        self.elements.values().find(|e| e.element_id == element_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub transition_id: String,
    pub from_screen: String,
    pub to_screen: String,
    /// Element id on `from_screen`
    pub trigger_element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_action: Option<String>,
    /// Endpoint keys (`METHOD path`) called while making this transition
    #[serde(default)]
    pub correlated_calls: BTreeSet<String>,
    #[serde(default)]
    pub occurrences: usize,
}

// ============================================================================
// API surface
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// `METHOD path` (declared template when one matched)
    pub key: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub observed_paths: BTreeSet<String>,
    #[serde(default)]
    pub response_codes: BTreeSet<u16>,
    #[serde(default)]
    pub call_count: usize,
    #[serde(default)]
    pub orphaned_calls: usize,
    #[serde(default)]
    pub sessions: BTreeSet<String>,
    /// Element ids whose actions triggered this endpoint
    #[serde(default)]
    pub triggered_by: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_shape: Option<serde_json::Value>,
    #[serde(default)]
    pub declared: bool,
}

impl Endpoint {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            key: crate::model::identity::endpoint_key(method, path),
            method: method.to_uppercase(),
            path: path.to_string(),
            observed_paths: BTreeSet::new(),
            response_codes: BTreeSet::new(),
            call_count: 0,
            orphaned_calls: 0,
            sessions: BTreeSet::new(),
            triggered_by: BTreeSet::new(),
            request_shape: None,
            declared: false,
        }
    }
}

// ============================================================================
// App model
// ============================================================================

/// The merged model handed to code generators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppModel {
    #[serde(default)]
    pub screens: BTreeMap<String, Screen>,
    #[serde(default)]
    pub transitions: BTreeMap<String, Transition>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, Endpoint>,
    /// Sessions merged so far
    #[serde(default)]
    pub sessions: BTreeSet<String>,
}

impl AppModel {
    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    pub fn element_count(&self) -> usize {
        self.screens.values().map(|s| s.elements.len()).sum()
    }

    pub fn screen_by_label(&self, label: &str) -> Option<&Screen> {
        self.screens.values().find(|s| s.labels.contains(label))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// What one merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub screens_added: usize,
    pub screens_merged: usize,
    pub elements_added: usize,
    pub attributes_filled: usize,
    pub locators_added: usize,
    pub transitions_added: usize,
    pub endpoints_added: usize,
    /// Screen hints whose name matched no observed screen
    pub hints_unmatched: usize,
}
