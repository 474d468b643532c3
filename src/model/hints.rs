use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::locator::locator_model::ElementAttributes;

/// Declared element identifiers and API routes from static source analysis.
/// Every section is optional; an absent document is the same as an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticHints {
    #[serde(default)]
    pub screens: Vec<ScreenHint>,

    #[serde(default, alias = "routes", alias = "endpoints")]
    pub api_endpoints: Vec<RouteHint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenHint {
    /// Human screen name, matched against observed screen labels
    pub name: String,

    #[serde(default, alias = "ui_elements")]
    pub elements: Vec<ElementHint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementHint {
    #[serde(flatten)]
    pub attributes: ElementAttributes,

    /// Additional locators declared in source (`strategy` accepts aliases
    /// such as `id` or `xpath`)
    #[serde(default, alias = "selectors")]
    pub locators: Vec<DeclaredLocator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredLocator {
    pub strategy: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteHint {
    #[serde(default = "default_method")]
    pub method: String,
    /// Concrete path or `{param}` template
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_shape: Option<serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl StaticHints {
    pub fn is_empty(&self) -> bool {
        self.screens.is_empty() && self.api_endpoints.is_empty()
    }

    /// Parse YAML or JSON (YAML is a superset).
    pub fn parse(content: &str, context: &str) -> Result<Self, ParseError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| ParseError::Hints {
            context: context.to_string(),
            message: e.to_string(),
        })
    }
}

/// Load hints from `path`. A missing path or file yields empty hints.
pub fn load_hints(path: Option<&Path>) -> Result<StaticHints, ParseError> {
    let Some(path) = path else {
        return Ok(StaticHints::default());
    };
    match std::fs::read_to_string(path) {
        Ok(content) => StaticHints::parse(&content, &path.display().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "static hints file not found; continuing without hints");
            Ok(StaticHints::default())
        }
        Err(source) => Err(ParseError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
