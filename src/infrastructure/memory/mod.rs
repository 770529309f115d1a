use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::application::ports::link_repository::LinkRepository;
use crate::domain::links::link::{BacklinkInfo, Link, NodeKind, NodeMeta};

const BLOCK_TITLE_CHARS: usize = 50;

#[derive(Debug, Clone)]
struct PageRecord {
    title: String,
    content: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct BlockRecord {
    content: String,
}

#[derive(Debug, Default)]
struct State {
    pages: HashMap<String, PageRecord>,
    // (page id, alias)
    aliases: Vec<(String, String)>,
    blocks: HashMap<String, BlockRecord>,
    links: Vec<Link>,
}

impl State {
    fn source_meta(&self, kind: NodeKind, id: &str) -> (String, Option<String>) {
        match kind {
            NodeKind::Page => match self.pages.get(id) {
                Some(p) => (p.title.clone(), Some(p.content.clone())),
                None => (id.to_string(), None),
            },
            NodeKind::Block => match self.blocks.get(id) {
                Some(b) => (block_title(&b.content), Some(b.content.clone())),
                None => (id.to_string(), None),
            },
        }
    }
}

fn block_title(content: &str) -> String {
    content
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(BLOCK_TITLE_CHARS)
        .collect()
}

/// Process-local link store. Page titles and aliases match trimmed and
/// case-insensitively; when several pages share a title or an alias the most
/// recently updated one wins.
#[derive(Debug, Default)]
pub struct InMemoryLinkRepository {
    state: RwLock<State>,
}

impl InMemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_page(&self, id: &str, title: &str, content: &str) {
        let mut state = self.state.write().await;
        state.pages.insert(
            id.to_string(),
            PageRecord {
                title: title.to_string(),
                content: content.to_string(),
                updated_at: Utc::now(),
            },
        );
    }

    pub async fn add_alias(&self, page_id: &str, alias: &str) {
        let mut state = self.state.write().await;
        state.aliases.push((page_id.to_string(), alias.to_string()));
    }

    pub async fn upsert_block(&self, id: &str, content: &str) {
        let mut state = self.state.write().await;
        state.blocks.insert(
            id.to_string(),
            BlockRecord {
                content: content.to_string(),
            },
        );
    }

    #[cfg(test)]
    pub(crate) async fn link_count(&self) -> usize {
        self.state.read().await.links.len()
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn insert_link(&self, link: &Link) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if state.links.iter().any(|l| l.id == link.id) {
            anyhow::bail!("duplicate link id {}", link.id);
        }
        state.links.push(link.clone());
        Ok(())
    }

    async fn replace_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
        links: &[Link],
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        state
            .links
            .retain(|l| !(l.source_type == source_type && l.source_id == source_id));
        state.links.extend(links.iter().cloned());
        Ok(())
    }

    async fn delete_links_for_source(
        &self,
        source_type: NodeKind,
        source_id: &str,
    ) -> anyhow::Result<u64> {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state
            .links
            .retain(|l| !(l.source_type == source_type && l.source_id == source_id));
        Ok((before - state.links.len()) as u64)
    }

    async fn delete_link(&self, link_id: &str) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state.links.retain(|l| l.id != link_id);
        Ok(state.links.len() != before)
    }

    async fn find_page_id_by_title(&self, title: &str) -> anyhow::Result<Option<String>> {
        let state = self.state.read().await;
        let wanted = title.trim().to_lowercase();
        Ok(state
            .pages
            .iter()
            .filter(|(_, p)| p.title.trim().to_lowercase() == wanted)
            .max_by_key(|(_, p)| p.updated_at)
            .map(|(id, _)| id.clone()))
    }

    async fn find_page_id_by_alias(&self, alias: &str) -> anyhow::Result<Option<String>> {
        let state = self.state.read().await;
        let wanted = alias.trim().to_lowercase();
        Ok(state
            .aliases
            .iter()
            .filter(|(_, a)| a.trim().to_lowercase() == wanted)
            .filter_map(|(page_id, _)| state.pages.get_key_value(page_id))
            .max_by_key(|(_, p)| p.updated_at)
            .map(|(id, _)| id.clone()))
    }

    async fn block_exists(&self, block_id: &str) -> anyhow::Result<bool> {
        Ok(self.state.read().await.blocks.contains_key(block_id))
    }

    async fn backlinks_for(
        &self,
        target_id: &str,
        target_type: Option<NodeKind>,
    ) -> anyhow::Result<Vec<BacklinkInfo>> {
        let state = self.state.read().await;
        let mut out: Vec<BacklinkInfo> = state
            .links
            .iter()
            .filter(|l| l.target_id == target_id)
            .filter(|l| target_type.is_none_or(|t| l.target_type == t))
            .map(|l| {
                let (source_title, source_content) = state.source_meta(l.source_type, &l.source_id);
                BacklinkInfo {
                    link: l.clone(),
                    source_title,
                    source_content,
                }
            })
            .collect();
        out.sort_by(|a, b| b.link.created_at.cmp(&a.link.created_at));
        Ok(out)
    }

    async fn forward_links_for(
        &self,
        source_id: &str,
        source_type: Option<NodeKind>,
    ) -> anyhow::Result<Vec<Link>> {
        let state = self.state.read().await;
        let mut out: Vec<Link> = state
            .links
            .iter()
            .filter(|l| l.source_id == source_id)
            .filter(|l| source_type.is_none_or(|t| l.source_type == t))
            .cloned()
            .collect();
        // positions first, unpositioned links after
        out.sort_by_key(|l| (l.position.is_none(), l.position, l.created_at));
        Ok(out)
    }

    async fn node_meta(&self, id: &str) -> anyhow::Result<Option<NodeMeta>> {
        let state = self.state.read().await;
        if let Some(page) = state.pages.get(id) {
            return Ok(Some(NodeMeta {
                id: id.to_string(),
                title: page.title.clone(),
                kind: NodeKind::Page,
            }));
        }
        Ok(state.blocks.get(id).map(|b| NodeMeta {
            id: id.to_string(),
            title: block_title(&b.content),
            kind: NodeKind::Block,
        }))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn link(id: &str, source: &str, target: &str, position: Option<i64>, age_secs: i64) -> Link {
        let at = Utc::now() - Duration::seconds(age_secs);
        Link {
            id: id.to_string(),
            source_type: NodeKind::Page,
            source_id: source.to_string(),
            target_type: NodeKind::Page,
            target_id: target.to_string(),
            link_type: crate::domain::links::link::LinkType::PageReference,
            context: None,
            position,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn title_lookup_is_case_insensitive_and_prefers_newest() {
        let repo = InMemoryLinkRepository::new();
        repo.upsert_page("old", "Rust", "").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        repo.upsert_page("new", "rust", "").await;
        assert_eq!(
            repo.find_page_id_by_title("RUST").await.unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(repo.find_page_id_by_title("Go").await.unwrap(), None);
    }

    #[tokio::test]
    async fn alias_of_missing_page_does_not_resolve() {
        let repo = InMemoryLinkRepository::new();
        repo.add_alias("ghost", "Phantom").await;
        assert_eq!(repo.find_page_id_by_alias("phantom").await.unwrap(), None);
        repo.upsert_page("ghost", "Ghost", "").await;
        assert_eq!(
            repo.find_page_id_by_alias("phantom").await.unwrap().as_deref(),
            Some("ghost")
        );
    }

    #[tokio::test]
    async fn forward_links_sort_by_position_then_age() {
        let repo = InMemoryLinkRepository::new();
        repo.insert_link(&link("l1", "s", "a", None, 30)).await.unwrap();
        repo.insert_link(&link("l2", "s", "b", Some(10), 10)).await.unwrap();
        repo.insert_link(&link("l3", "s", "c", Some(10), 20)).await.unwrap();
        repo.insert_link(&link("l4", "s", "d", Some(2), 0)).await.unwrap();
        let ids: Vec<String> = repo
            .forward_links_for("s", None)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec!["l4", "l3", "l2", "l1"]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let repo = InMemoryLinkRepository::new();
        repo.insert_link(&link("l1", "s", "a", None, 0)).await.unwrap();
        assert!(repo.insert_link(&link("l1", "s", "b", None, 0)).await.is_err());
    }

    #[tokio::test]
    async fn node_meta_covers_pages_and_blocks() {
        let repo = InMemoryLinkRepository::new();
        repo.upsert_page("p1", "Page One", "").await;
        repo.upsert_block("b1", "first line\nsecond").await;
        assert_eq!(repo.node_meta("p1").await.unwrap().unwrap().kind, NodeKind::Page);
        let block = repo.node_meta("b1").await.unwrap().unwrap();
        assert_eq!(block.kind, NodeKind::Block);
        assert_eq!(block.title, "first line");
        assert!(repo.node_meta("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shared_alias_resolves_to_newest_page() {
        let repo = InMemoryLinkRepository::new();
        repo.upsert_page("older", "Older", "").await;
        repo.add_alias("older", "Docs").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        repo.upsert_page("newer", "Newer", "").await;
        repo.add_alias("newer", "  docs ").await;
        assert_eq!(
            repo.find_page_id_by_alias(" DOCS").await.unwrap().as_deref(),
            Some("newer")
        );

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        repo.upsert_page("older", "Older", "edited").await;
        assert_eq!(
            repo.find_page_id_by_alias("docs").await.unwrap().as_deref(),
            Some("older")
        );
    }

    #[tokio::test]
    async fn stored_titles_match_trimmed() {
        let repo = InMemoryLinkRepository::new();
        repo.upsert_page("p1", "  Page One ", "").await;
        assert_eq!(
            repo.find_page_id_by_title("page one").await.unwrap().as_deref(),
            Some("p1")
        );
    }
}
