use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a link endpoint points at: a whole page or a block inside a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Page,
    Block,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Page => "page",
            NodeKind::Block => "block",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node kind: {0}")]
pub struct UnknownNodeKind(pub String);

impl FromStr for NodeKind {
    type Err = UnknownNodeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // documents are pages from the link graph's point of view
            "page" | "document" => Ok(NodeKind::Page),
            "block" => Ok(NodeKind::Block),
            other => Err(UnknownNodeKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkType {
    PageReference,
    BlockReference,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::PageReference => "page-reference",
            LinkType::BlockReference => "block-reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page-reference" => Some(LinkType::PageReference),
            "block-reference" => Some(LinkType::BlockReference),
            _ => None,
        }
    }

    pub fn target_kind(&self) -> NodeKind {
        match self {
            LinkType::PageReference => NodeKind::Page,
            LinkType::BlockReference => NodeKind::Block,
        }
    }
}

/// A persisted, resolved edge of the link graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source_type: NodeKind,
    pub source_id: String,
    pub target_type: NodeKind,
    pub target_id: String,
    pub link_type: LinkType,
    pub context: Option<String>,
    pub position: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub source_type: NodeKind,
    pub source_id: String,
    pub target_type: NodeKind,
    pub target_id: String,
    pub link_type: LinkType,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

/// Inbound link joined with the metadata of the node holding it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacklinkInfo {
    #[serde(flatten)]
    pub link: Link,
    pub source_title: String,
    pub source_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    pub id: String,
    pub title: String,
    pub kind: NodeKind,
}

/// A parsed reference that could not be resolved when links were rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedTarget {
    pub link_type: LinkType,
    pub target: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkUpdateSummary {
    pub links: Vec<Link>,
    pub unresolved: Vec<UnresolvedTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    /// Breadth-first distance from the center; a layout hint for renderers.
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: LinkType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkGraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub center_node_id: String,
    pub max_depth: usize,
}
