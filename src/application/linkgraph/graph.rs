use std::collections::{HashSet, VecDeque};

use crate::application::ports::link_repository::LinkRepository;
use crate::domain::links::link::{GraphEdge, GraphNode, LinkGraphData, LinkType, NodeKind};

struct GraphBuilder {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(String, String)>,
}

impl GraphBuilder {
    fn add_edge(&mut self, source: &str, target: &str, edge_type: LinkType) {
        // directed: a->b and b->a are different edges
        if !self
            .edge_keys
            .insert((source.to_string(), target.to_string()))
        {
            return;
        }
        self.edges.push(GraphEdge {
            id: format!("{source}-{target}"),
            source: source.to_string(),
            target: target.to_string(),
            edge_type,
        });
    }
}

/// Breadth-first neighbourhood of `center_node_id`, following links in both
/// directions up to `max_depth` hops. Nodes are visited once, which keeps
/// cyclic graphs finite. Edges form the induced subgraph: every link between
/// two collected nodes is kept, including links between nodes on the last
/// level, and every edge endpoint ends up in `nodes`.
pub async fn build_link_graph<R>(
    repo: &R,
    center_node_id: &str,
    max_depth: usize,
) -> anyhow::Result<LinkGraphData>
where
    R: LinkRepository + ?Sized,
{
    let mut graph = GraphBuilder {
        nodes: Vec::new(),
        edges: Vec::new(),
        edge_keys: HashSet::new(),
    };
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, Option<NodeKind>, usize)> = VecDeque::new();
    let mut frontier: Vec<String> = Vec::new();
    queue.push_back((center_node_id.to_string(), None, 0));

    while let Some((id, kind_hint, level)) = queue.pop_front() {
        if level > max_depth || !visited.insert(id.clone()) {
            continue;
        }

        let node = match repo.node_meta(&id).await? {
            Some(meta) => GraphNode {
                id: meta.id,
                title: meta.title,
                node_type: meta.kind,
                level,
            },
            None => {
                tracing::debug!(node_id = %id, "link_graph_node_meta_missing");
                GraphNode {
                    title: id.clone(),
                    id: id.clone(),
                    node_type: kind_hint.unwrap_or(NodeKind::Page),
                    level,
                }
            }
        };
        graph.nodes.push(node);

        if level == max_depth {
            frontier.push(id);
            continue;
        }

        for link in repo.forward_links_for(&id, None).await? {
            graph.add_edge(&link.source_id, &link.target_id, link.link_type);
            if !visited.contains(&link.target_id) {
                queue.push_back((link.target_id, Some(link.target_type), level + 1));
            }
        }
        for backlink in repo.backlinks_for(&id, None).await? {
            let link = backlink.link;
            graph.add_edge(&link.source_id, &link.target_id, link.link_type);
            if !visited.contains(&link.source_id) {
                queue.push_back((link.source_id, Some(link.source_type), level + 1));
            }
        }
    }

    // Last-level nodes are not expanded, but links among collected nodes still count.
    if max_depth > 0 {
        for id in &frontier {
            for link in repo.forward_links_for(id, None).await? {
                if visited.contains(&link.target_id) {
                    graph.add_edge(&link.source_id, &link.target_id, link.link_type);
                }
            }
            for backlink in repo.backlinks_for(id, None).await? {
                let link = backlink.link;
                if visited.contains(&link.source_id) {
                    graph.add_edge(&link.source_id, &link.target_id, link.link_type);
                }
            }
        }
    }

    Ok(LinkGraphData {
        nodes: graph.nodes,
        edges: graph.edges,
        center_node_id: center_node_id.to_string(),
        max_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::links::link::Link;
    use crate::infrastructure::memory::InMemoryLinkRepository;
    use chrono::Utc;

    fn page_link(id: &str, source: &str, target: &str) -> Link {
        let now = Utc::now();
        Link {
            id: id.to_string(),
            source_type: NodeKind::Page,
            source_id: source.to_string(),
            target_type: NodeKind::Page,
            target_id: target.to_string(),
            link_type: LinkType::PageReference,
            context: None,
            position: Some(0),
            created_at: now,
            updated_at: now,
        }
    }

    async fn repo_with(links: &[(&str, &str)]) -> InMemoryLinkRepository {
        let repo = InMemoryLinkRepository::new();
        for name in ["a", "b", "c", "d"] {
            repo.upsert_page(name, &name.to_uppercase(), "").await;
        }
        for (i, (source, target)) in links.iter().enumerate() {
            repo.insert_link(&page_link(&format!("l{i}"), source, target))
                .await
                .unwrap();
        }
        repo
    }

    fn ids(graph: &LinkGraphData) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn depth_zero_is_only_the_center() {
        let repo = repo_with(&[("a", "b")]).await;
        let graph = build_link_graph(&repo, "a", 0).await.unwrap();
        assert_eq!(ids(&graph), vec!["a"]);
        assert!(graph.edges.is_empty());
        assert_eq!(graph.nodes[0].title, "A");
    }

    #[tokio::test]
    async fn cycles_terminate_with_both_directions_kept() {
        let repo = repo_with(&[("a", "b"), ("b", "a")]).await;
        let graph = build_link_graph(&repo, "a", 5).await.unwrap();
        assert_eq!(ids(&graph), vec!["a", "b"]);
        let mut edges: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        edges.sort();
        assert_eq!(edges, vec!["a-b", "b-a"]);
    }

    #[tokio::test]
    async fn repeated_links_collapse_into_one_edge() {
        let repo = repo_with(&[("a", "b"), ("a", "b")]).await;
        let graph = build_link_graph(&repo, "a", 1).await.unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "a");
        assert_eq!(graph.edges[0].target, "b");
    }

    #[tokio::test]
    async fn walks_backlinks_and_respects_depth() {
        // d -> a -> b -> c
        let repo = repo_with(&[("d", "a"), ("a", "b"), ("b", "c")]).await;
        let graph = build_link_graph(&repo, "a", 1).await.unwrap();
        let mut got = ids(&graph);
        got.sort();
        assert_eq!(got, vec!["a", "b", "d"]);
        assert!(graph.nodes.iter().all(|n| n.level <= 1));

        let graph = build_link_graph(&repo, "a", 2).await.unwrap();
        assert_eq!(graph.nodes.len(), 4);
        let c = graph.nodes.iter().find(|n| n.id == "c").unwrap();
        assert_eq!(c.level, 2);
    }

    #[tokio::test]
    async fn links_between_last_level_nodes_are_kept() {
        let repo = repo_with(&[("a", "b"), ("a", "c"), ("b", "c")]).await;
        let graph = build_link_graph(&repo, "a", 1).await.unwrap();
        let mut got = ids(&graph);
        got.sort();
        assert_eq!(got, vec!["a", "b", "c"]);
        let mut edges: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        edges.sort();
        assert_eq!(edges, vec!["a-b", "a-c", "b-c"]);
    }

    #[tokio::test]
    async fn last_level_links_to_outside_nodes_are_dropped() {
        // c -> d leaves the depth-1 neighbourhood of a; c -> a points back into it
        let repo = repo_with(&[("a", "b"), ("c", "a"), ("b", "d"), ("c", "b")]).await;
        let graph = build_link_graph(&repo, "a", 1).await.unwrap();
        let mut edges: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        edges.sort();
        assert_eq!(edges, vec!["a-b", "c-a", "c-b"]);
        assert!(!ids(&graph).contains(&"d"));

        let graph = build_link_graph(&repo, "a", 0).await.unwrap();
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn unknown_nodes_get_a_placeholder() {
        let repo = repo_with(&[("a", "ghost")]).await;
        let graph = build_link_graph(&repo, "a", 1).await.unwrap();
        let ghost = graph.nodes.iter().find(|n| n.id == "ghost").unwrap();
        assert_eq!(ghost.title, "ghost");
        assert_eq!(ghost.node_type, NodeKind::Page);
        assert!(graph
            .edges
            .iter()
            .all(|e| ids(&graph).contains(&e.source.as_str())
                && ids(&graph).contains(&e.target.as_str())));
    }
}
