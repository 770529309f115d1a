use async_trait::async_trait;

use crate::domain::links::link::{BacklinkInfo, Link, NodeKind, NodeMeta};

#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn insert_link(&self, link: &Link) -> anyhow::Result<()>;

    /// Deletes every link held by the source and inserts `links`, atomically.
    async fn replace_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
        links: &[Link],
    ) -> anyhow::Result<()>;

    async fn delete_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
    ) -> anyhow::Result<u64>;

    // Returns false when no link had that id
    async fn delete_link(&self, link_id: &str) -> anyhow::Result<bool>;

    async fn find_page_id_by_title(&self, title: &str) -> anyhow::Result<Option<String>>;

    async fn find_page_id_by_alias(&self, alias: &str) -> anyhow::Result<Option<String>>;

    async fn block_exists(&self, block_id: &str) -> anyhow::Result<bool>;

    /// Newest first.
    async fn backlinks_for(
        &self,
        target_id: &str,
        target_type: Option<NodeKind>,
    ) -> anyhow::Result<Vec<BacklinkInfo>>;

    /// Document order: position ascending, then creation time.
    async fn forward_links_for(
        &self,
        source_id: &str,
        source_type: Option<NodeKind>,
    ) -> anyhow::Result<Vec<Link>>;

    async fn node_meta(&self, id: &str) -> anyhow::Result<Option<NodeMeta>>;

    async fn ping(&self) -> anyhow::Result<()>;
}
