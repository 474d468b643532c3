use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::locator::locator_model::ElementAttributes;

/// One node of a captured UI tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(default, alias = "attrs")]
    pub attributes: ElementAttributes,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

/// Structural dump of the screen at failure time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub roots: Vec<SnapshotNode>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotDocument {
    Wrapped {
        #[serde(default)]
        platform: Option<String>,
        root: SnapshotNode,
    },
    Forest {
        #[serde(default)]
        platform: Option<String>,
        nodes: Vec<SnapshotNode>,
    },
    List(Vec<SnapshotNode>),
    Node(SnapshotNode),
}

impl PageSnapshot {
    pub fn from_nodes(reference: &str, roots: Vec<SnapshotNode>) -> Self {
        Self {
            reference: reference.to_string(),
            platform: None,
            roots,
        }
    }

    /// Accepts `{root: node}`, `{nodes: [..]}`, `[node, ..]` or a bare node.
    pub fn parse(reference: &str, content: &str) -> Result<Self, ParseError> {
        let doc: SnapshotDocument =
            serde_json::from_str(content).map_err(|e| ParseError::Snapshot {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;
        let (platform, roots) = match doc {
            SnapshotDocument::Wrapped { platform, root } => (platform, vec![root]),
            SnapshotDocument::Forest { platform, nodes } => (platform, nodes),
            SnapshotDocument::List(nodes) => (None, nodes),
            SnapshotDocument::Node(node) => (None, vec![node]),
        };
        Ok(Self {
            reference: reference.to_string(),
            platform,
            roots,
        })
    }

    /// Every node's attributes in document order (depth first).
    pub fn elements(&self) -> Vec<&ElementAttributes> {
        fn walk<'a>(node: &'a SnapshotNode, out: &mut Vec<&'a ElementAttributes>) {
            out.push(&node.attributes);
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }
}

/// Where page snapshots come from, keyed by `snapshot_ref`.
pub trait SnapshotSource: Send + Sync {
    fn load(&self, reference: &str) -> Result<PageSnapshot, ParseError>;
}

/// Snapshots stored as JSON files under a base directory. A reference without
/// an extension also matches `<reference>.json`.
#[derive(Debug, Clone)]
pub struct FsSnapshotSource {
    base_dir: PathBuf,
}

impl FsSnapshotSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        let direct = self.base_dir.join(reference);
        if direct.is_file() || Path::new(reference).extension().is_some() {
            return direct;
        }
        self.base_dir.join(format!("{}.json", reference))
    }
}

impl SnapshotSource for FsSnapshotSource {
    fn load(&self, reference: &str) -> Result<PageSnapshot, ParseError> {
        let path = self.resolve(reference);
        let content = std::fs::read_to_string(&path).map_err(|source| ParseError::Io {
            path: path.clone(),
            source,
        })?;
        PageSnapshot::parse(reference, &content)
    }
}

/// Snapshots held in memory, e.g. captured in-process.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotSource {
    snapshots: BTreeMap<String, PageSnapshot>,
}

impl MemorySnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: PageSnapshot) {
        self.snapshots.insert(snapshot.reference.clone(), snapshot);
    }
}

impl SnapshotSource for MemorySnapshotSource {
    fn load(&self, reference: &str) -> Result<PageSnapshot, ParseError> {
        self.snapshots
            .get(reference)
            .cloned()
            .ok_or_else(|| ParseError::Snapshot {
                reference: reference.to_string(),
                message: "no such snapshot".to_string(),
            })
    }
}
