pub mod graph;
pub mod source_locks;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::application::parsing::{block_links, page_links};
use crate::application::ports::link_event_publisher::{LinkEvent, LinkEventPublisher};
use crate::application::ports::link_repository::LinkRepository;
use crate::application::services::link_utils::generate_link_id;
use crate::domain::links::link::{
    BacklinkInfo, CreateLinkRequest, Link, LinkGraphData, LinkType, LinkUpdateSummary, NodeKind,
    UnresolvedTarget,
};
use source_locks::{SourceLocks, source_key};

pub const DEFAULT_GRAPH_DEPTH: usize = 2;

#[derive(thiserror::Error, Debug)]
pub enum LinkServiceError {
    #[error("link store operation failed")]
    Store(#[source] anyhow::Error),
    #[error("failed to publish link event")]
    Event(#[source] anyhow::Error),
}

/// Keeps the persisted link graph in step with document content and answers
/// link queries.
#[derive(Clone)]
pub struct LinkManagerService {
    repo: Arc<dyn LinkRepository>,
    events: Arc<dyn LinkEventPublisher>,
    locks: SourceLocks,
    default_graph_depth: usize,
    max_graph_depth: usize,
}

impl LinkManagerService {
    pub fn new(repo: Arc<dyn LinkRepository>, events: Arc<dyn LinkEventPublisher>) -> Self {
        Self {
            repo,
            events,
            locks: SourceLocks::new(),
            default_graph_depth: DEFAULT_GRAPH_DEPTH,
            max_graph_depth: usize::MAX,
        }
    }

    pub fn with_max_graph_depth(mut self, max_graph_depth: usize) -> Self {
        self.max_graph_depth = max_graph_depth;
        self
    }

    pub fn with_default_graph_depth(mut self, depth: usize) -> Self {
        self.default_graph_depth = depth;
        self
    }

    async fn publish(&self, event: LinkEvent) -> Result<(), LinkServiceError> {
        self.events.publish(&event).await.map_err(|e| {
            tracing::warn!(event = event.name(), error = ?e, "link_event_publish_failed");
            LinkServiceError::Event(e)
        })
    }

    pub async fn create_link(&self, request: CreateLinkRequest) -> Result<Link, LinkServiceError> {
        let now = Utc::now();
        let link = Link {
            id: generate_link_id(),
            source_type: request.source_type,
            source_id: request.source_id,
            target_type: request.target_type,
            target_id: request.target_id,
            link_type: request.link_type,
            context: request.context,
            position: request.position,
            created_at: now,
            updated_at: now,
        };
        self.repo
            .insert_link(&link)
            .await
            .map_err(LinkServiceError::Store)?;
        self.publish(LinkEvent::Created { link: link.clone() })
            .await?;
        Ok(link)
    }

    /// Re-derives every outbound link of a source from its content. The old
    /// set is replaced wholesale; references whose target does not exist are
    /// dropped and reported in the summary.
    pub async fn update_links_for_content(
        &self,
        source_type: NodeKind,
        source_id: &str,
        content: &str,
    ) -> Result<LinkUpdateSummary, LinkServiceError> {
        let _guard = self.locks.lock(&source_key(source_type, source_id)).await;

        let now = Utc::now();
        let mut links = Vec::new();
        let mut unresolved = Vec::new();
        let mut resolved_pages: HashMap<String, Option<String>> = HashMap::new();

        for occ in page_links::scan(content) {
            let target = match resolved_pages.get(&occ.page_name) {
                Some(hit) => hit.clone(),
                None => {
                    let hit = self
                        .resolve_page(&occ.page_name)
                        .await
                        .map_err(LinkServiceError::Store)?;
                    resolved_pages.insert(occ.page_name.clone(), hit.clone());
                    hit
                }
            };
            let Some(target_id) = target else {
                tracing::warn!(
                    %source_id,
                    page_name = %occ.page_name,
                    position = occ.position,
                    "link_target_unresolved"
                );
                unresolved.push(UnresolvedTarget {
                    link_type: LinkType::PageReference,
                    target: occ.page_name,
                    position: occ.position,
                });
                continue;
            };
            links.push(Link {
                id: generate_link_id(),
                source_type,
                source_id: source_id.to_string(),
                target_type: NodeKind::Page,
                target_id,
                link_type: LinkType::PageReference,
                context: Some(occ.context),
                position: Some(occ.position as i64),
                created_at: now,
                updated_at: now,
            });
        }

        for occ in block_links::scan(content) {
            let exists = self
                .repo
                .block_exists(&occ.block_id)
                .await
                .map_err(LinkServiceError::Store)?;
            if !exists {
                tracing::warn!(
                    %source_id,
                    block_id = %occ.block_id,
                    position = occ.position,
                    "link_target_unresolved"
                );
                unresolved.push(UnresolvedTarget {
                    link_type: LinkType::BlockReference,
                    target: occ.block_id,
                    position: occ.position,
                });
                continue;
            }
            links.push(Link {
                id: generate_link_id(),
                source_type,
                source_id: source_id.to_string(),
                target_type: NodeKind::Block,
                target_id: occ.block_id,
                link_type: LinkType::BlockReference,
                context: Some(occ.context),
                position: Some(occ.position as i64),
                created_at: now,
                updated_at: now,
            });
        }
        links.sort_by_key(|l| l.position);
        unresolved.sort_by_key(|u| u.position);

        self.repo
            .replace_links_for_source(source_type, source_id, &links)
            .await
            .map_err(LinkServiceError::Store)?;

        self.publish(LinkEvent::BulkUpdated {
            source_type,
            source_id: source_id.to_string(),
            links: links.clone(),
        })
        .await?;
        self.publish(LinkEvent::Updated {
            source_type,
            source_id: source_id.to_string(),
            link_count: links.len(),
        })
        .await?;

        tracing::debug!(
            %source_type,
            %source_id,
            links = links.len(),
            unresolved = unresolved.len(),
            "links_updated_for_content"
        );
        Ok(LinkUpdateSummary { links, unresolved })
    }

    // Titles win over aliases.
    async fn resolve_page(&self, page_name: &str) -> anyhow::Result<Option<String>> {
        if let Some(id) = self.repo.find_page_id_by_title(page_name).await? {
            return Ok(Some(id));
        }
        self.repo.find_page_id_by_alias(page_name).await
    }

    pub async fn get_backlinks(
        &self,
        target_id: &str,
        target_type: Option<NodeKind>,
    ) -> Result<Vec<BacklinkInfo>, LinkServiceError> {
        self.repo
            .backlinks_for(target_id, target_type)
            .await
            .map_err(LinkServiceError::Store)
    }

    pub async fn get_forward_links(
        &self,
        source_id: &str,
        source_type: Option<NodeKind>,
    ) -> Result<Vec<Link>, LinkServiceError> {
        self.repo
            .forward_links_for(source_id, source_type)
            .await
            .map_err(LinkServiceError::Store)
    }

    pub async fn delete_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
    ) -> Result<u64, LinkServiceError> {
        let _guard = self.locks.lock(&source_key(source_type, source_id)).await;
        self.repo
            .delete_links_for_source(source_type, source_id)
            .await
            .map_err(LinkServiceError::Store)
    }

    pub async fn delete_link(&self, link_id: &str) -> Result<bool, LinkServiceError> {
        let removed = self
            .repo
            .delete_link(link_id)
            .await
            .map_err(LinkServiceError::Store)?;
        if removed {
            self.publish(LinkEvent::Deleted {
                link_id: link_id.to_string(),
            })
            .await?;
        }
        Ok(removed)
    }

    /// `max_depth` falls back to the configured default (initially
    /// [`DEFAULT_GRAPH_DEPTH`]) and is capped by the configured maximum.
    pub async fn get_link_graph(
        &self,
        center_node_id: &str,
        max_depth: Option<usize>,
    ) -> Result<LinkGraphData, LinkServiceError> {
        let depth = max_depth
            .unwrap_or(self.default_graph_depth)
            .min(self.max_graph_depth);
        graph::build_link_graph(self.repo.as_ref(), center_node_id, depth)
            .await
            .map_err(LinkServiceError::Store)
    }
}
