use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::app_model::{Element, Screen};

// ============================================================================
// Configuration
// ============================================================================

/// How API calls are linked to the UI events that caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrategy {
    /// Most recent UI event within the time window
    #[default]
    Temporal,
    /// Same originating thread / execution context
    Thread,
    /// Explicit correlation tags only
    Tag,
}

impl fmt::Display for CorrelationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorrelationStrategy::Temporal => "temporal",
            CorrelationStrategy::Thread => "thread",
            CorrelationStrategy::Tag => "tag",
        };
        f.write_str(s)
    }
}

impl FromStr for CorrelationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "temporal" | "time" => Ok(CorrelationStrategy::Temporal),
            "thread" | "thread-id" | "thread_id" => Ok(CorrelationStrategy::Thread),
            "tag" | "correlation-id" | "correlation_id" => Ok(CorrelationStrategy::Tag),
            other => Err(format!(
                "unknown correlation strategy '{}' (expected temporal, thread or tag)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    #[serde(default)]
    pub strategy: CorrelationStrategy,

    /// Temporal strategy: max delay between a UI event and the call it caused
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Max delay between a UI event and the navigation it triggered
    #[serde(default = "default_transition_window_ms")]
    pub transition_window_ms: u64,
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::InvalidWindow(self.window_ms));
        }
        if self.transition_window_ms == 0 {
            return Err(ConfigError::InvalidWindow(self.transition_window_ms));
        }
        Ok(())
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            strategy: CorrelationStrategy::Temporal,
            window_ms: default_window_ms(),
            transition_window_ms: default_transition_window_ms(),
        }
    }
}

fn default_window_ms() -> u64 { 2000 }
fn default_transition_window_ms() -> u64 { 3000 }

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethod {
    Tag,
    Thread,
    Temporal,
}

/// How an API call was attached to a UI event, and how sure we are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLink {
    pub method: LinkMethod,
    pub confidence: f64,
    /// Sequence number of the UI event
    pub ui_seq: u64,
    /// Element acted on, scoped to its screen
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// `<session_id>:<seq>`
    pub call_id: String,
    pub session_id: String,
    pub method: String,
    /// Normalised path (no scheme, host or query)
    pub path: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_shape: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp_ms: u64,
    /// Screen the app was on when the call started
    pub screen_id: String,
    /// `None` for orphaned calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<CallLink>,
    /// Id of the transition this call belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_id: Option<String>,
}

impl ApiCall {
    pub fn is_orphan(&self) -> bool {
        self.link.is_none()
    }
}

/// One observed screen change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedTransition {
    pub transition_id: String,
    pub from_screen: String,
    pub to_screen: String,
    pub trigger_element: String,
    pub trigger_action: String,
    pub timestamp_ms: u64,
    /// Call ids
    pub correlated_calls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// No navigation events; everything was folded into one screen
    NoNavigation,
    /// The session had no events at all
    EmptySession,
    /// Navigations happened but none was preceded by a UI action
    NoTriggers,
}

/// A degraded-but-valid correlation outcome. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationGap {
    pub kind: GapKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationStats {
    pub ui_events: usize,
    pub navigation_events: usize,
    pub hierarchy_events: usize,
    pub api_calls: usize,
    pub linked_calls: usize,
    pub orphaned_calls: usize,
    pub screens: usize,
    pub transitions: usize,
}

/// Everything one correlation pass learned from one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedSession {
    pub session_id: String,
    pub strategy: CorrelationStrategy,
    /// Keyed by structural fingerprint
    pub screens: BTreeMap<String, Screen>,
    pub transitions: Vec<ObservedTransition>,
    pub api_calls: Vec<ApiCall>,
    #[serde(default)]
    pub gaps: Vec<CorrelationGap>,
    pub stats: CorrelationStats,
}

impl CorrelatedSession {
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.screens.values().flat_map(|s| s.elements.values())
    }

    pub fn orphaned_calls(&self) -> impl Iterator<Item = &ApiCall> {
        self.api_calls.iter().filter(|c| c.is_orphan())
    }

    pub fn is_degraded(&self) -> bool {
        !self.gaps.is_empty()
    }
}
