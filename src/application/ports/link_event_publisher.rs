use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::links::link::{Link, NodeKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LinkEvent {
    #[serde(rename = "links:created")]
    Created { link: Link },
    #[serde(rename = "links:updated")]
    Updated {
        source_type: NodeKind,
        source_id: String,
        link_count: usize,
    },
    #[serde(rename = "links:deleted")]
    Deleted { link_id: String },
    #[serde(rename = "links:bulk-updated")]
    BulkUpdated {
        source_type: NodeKind,
        source_id: String,
        links: Vec<Link>,
    },
}

impl LinkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Created { .. } => "links:created",
            LinkEvent::Updated { .. } => "links:updated",
            LinkEvent::Deleted { .. } => "links:deleted",
            LinkEvent::BulkUpdated { .. } => "links:bulk-updated",
        }
    }
}

#[async_trait]
pub trait LinkEventPublisher: Send + Sync {
    async fn publish(&self, event: &LinkEvent) -> anyhow::Result<()>;
}
