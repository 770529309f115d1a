use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::application::linkgraph::LinkServiceError;
use crate::application::parsing::unified;
use crate::bootstrap::app_context::AppContext;
use crate::domain::links::link::{
    BacklinkInfo as DomainBacklink, CreateLinkRequest as DomainCreateLink, GraphEdge, GraphNode,
    Link as DomainLink, LinkGraphData, LinkType, NodeKind, UnresolvedTarget,
};
use crate::domain::links::occurrence::{BrokenLink, IncompleteLink, LinkOccurrence, LinkStatistics};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ContentBody {
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CursorBody {
    pub content: String,
    /// Byte offset into `content`.
    pub cursor: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ParseLinksResponse {
    #[schema(value_type = Vec<Object>)]
    pub links: Vec<LinkOccurrence>,
    #[schema(value_type = Vec<Object>)]
    pub broken_links: Vec<BrokenLink>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyntaxErrorItem {
    pub position: usize,
    pub length: usize,
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateLinksResponse {
    pub is_valid: bool,
    pub errors: Vec<SyntaxErrorItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PageLinkStatsItem {
    pub total: usize,
    pub unique_pages: usize,
    pub with_alias: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BlockLinkStatsItem {
    pub total: usize,
    pub unique_blocks: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkStatisticsResponse {
    pub pages: PageLinkStatsItem,
    pub blocks: BlockLinkStatsItem,
    pub broken: usize,
    pub total: usize,
}

impl From<LinkStatistics> for LinkStatisticsResponse {
    fn from(s: LinkStatistics) -> Self {
        LinkStatisticsResponse {
            pages: PageLinkStatsItem {
                total: s.pages.total,
                unique_pages: s.pages.unique_pages,
                with_alias: s.pages.with_alias,
            },
            blocks: BlockLinkStatsItem {
                total: s.blocks.total,
                unique_blocks: s.blocks.unique_blocks,
            },
            broken: s.broken,
            total: s.total,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncompleteLinkResponse {
    #[schema(value_type = Option<Object>)]
    pub incomplete: Option<IncompleteLink>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkAtCursorResponse {
    #[schema(value_type = Option<Object>)]
    pub link: Option<LinkOccurrence>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Link {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub link_type: String,
    pub context: Option<String>,
    pub position: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DomainLink> for Link {
    fn from(l: DomainLink) -> Self {
        Link {
            id: l.id,
            source_type: l.source_type.to_string(),
            source_id: l.source_id,
            target_type: l.target_type.to_string(),
            target_id: l.target_id,
            link_type: l.link_type.as_str().to_string(),
            context: l.context,
            position: l.position,
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLinkRequest {
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    /// `page-reference` or `block-reference`
    pub link_type: String,
    pub context: Option<String>,
    pub position: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BacklinkInfo {
    #[serde(flatten)]
    pub link: Link,
    pub source_title: String,
    pub source_content: Option<String>,
}

impl From<DomainBacklink> for BacklinkInfo {
    fn from(b: DomainBacklink) -> Self {
        BacklinkInfo {
            link: b.link.into(),
            source_title: b.source_title,
            source_content: b.source_content,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnresolvedItem {
    pub link_type: String,
    pub target: String,
    pub position: usize,
}

impl From<UnresolvedTarget> for UnresolvedItem {
    fn from(u: UnresolvedTarget) -> Self {
        UnresolvedItem {
            link_type: u.link_type.as_str().to_string(),
            target: u.target,
            position: u.position,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateLinksResponse {
    pub links: Vec<Link>,
    pub unresolved: Vec<UnresolvedItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteLinksResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GraphNodeItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub level: usize,
}

impl From<GraphNode> for GraphNodeItem {
    fn from(n: GraphNode) -> Self {
        GraphNodeItem {
            id: n.id,
            title: n.title,
            node_type: n.node_type.to_string(),
            level: n.level,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GraphEdgeItem {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl From<GraphEdge> for GraphEdgeItem {
    fn from(e: GraphEdge) -> Self {
        GraphEdgeItem {
            id: e.id,
            source: e.source,
            target: e.target,
            edge_type: e.edge_type.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkGraphResponse {
    pub nodes: Vec<GraphNodeItem>,
    pub edges: Vec<GraphEdgeItem>,
    pub center_node_id: String,
    pub max_depth: usize,
}

impl From<LinkGraphData> for LinkGraphResponse {
    fn from(g: LinkGraphData) -> Self {
        LinkGraphResponse {
            nodes: g.nodes.into_iter().map(Into::into).collect(),
            edges: g.edges.into_iter().map(Into::into).collect(),
            center_node_id: g.center_node_id,
            max_depth: g.max_depth,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BacklinksQuery {
    pub target_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForwardLinksQuery {
    pub source_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    pub depth: Option<usize>,
}

fn parse_kind(raw: &str) -> Result<NodeKind, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn parse_optional_kind(raw: Option<&str>) -> Result<Option<NodeKind>, StatusCode> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_kind(v).map(Some),
    }
}

fn internal(err: LinkServiceError) -> StatusCode {
    tracing::error!(error = ?err, "link_service_failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[utoipa::path(post, path = "/api/links/parse", tag = "Links",
    request_body = ContentBody,
    responses((status = 200, body = ParseLinksResponse)))]
pub async fn parse_links(Json(body): Json<ContentBody>) -> Json<ParseLinksResponse> {
    let links = unified::parse_all_links(&body.content);
    let report = unified::detect_and_fix_broken_links(&body.content);
    Json(ParseLinksResponse {
        links,
        broken_links: report.broken_links,
    })
}

#[utoipa::path(post, path = "/api/links/validate", tag = "Links",
    request_body = ContentBody,
    responses((status = 200, body = ValidateLinksResponse)))]
pub async fn validate_links(Json(body): Json<ContentBody>) -> Json<ValidateLinksResponse> {
    let result = unified::validate_link_syntax(&body.content);
    Json(ValidateLinksResponse {
        is_valid: result.is_valid,
        errors: result
            .errors
            .into_iter()
            .map(|e| SyntaxErrorItem {
                position: e.position,
                length: e.length,
                message: e.message,
                error_type: e.error_type.to_string(),
            })
            .collect(),
    })
}

#[utoipa::path(post, path = "/api/links/statistics", tag = "Links",
    request_body = ContentBody,
    responses((status = 200, body = LinkStatisticsResponse)))]
pub async fn link_statistics(Json(body): Json<ContentBody>) -> Json<LinkStatisticsResponse> {
    Json(unified::get_link_statistics(&body.content).into())
}

#[utoipa::path(post, path = "/api/links/incomplete", tag = "Links",
    request_body = CursorBody,
    responses((status = 200, body = IncompleteLinkResponse)))]
pub async fn incomplete_link(Json(body): Json<CursorBody>) -> Json<IncompleteLinkResponse> {
    Json(IncompleteLinkResponse {
        incomplete: unified::get_incomplete_link(&body.content, body.cursor),
    })
}

#[utoipa::path(post, path = "/api/links/at-cursor", tag = "Links",
    request_body = CursorBody,
    responses((status = 200, body = LinkAtCursorResponse)))]
pub async fn link_at_cursor(Json(body): Json<CursorBody>) -> Json<LinkAtCursorResponse> {
    Json(LinkAtCursorResponse {
        link: unified::get_link_at_position(&body.content, body.cursor),
    })
}

#[utoipa::path(post, path = "/api/links", tag = "Links",
    request_body = CreateLinkRequest,
    responses((status = 201, body = Link), (status = 400, description = "Invalid node kind or link type")))]
pub async fn create_link(
    State(ctx): State<AppContext>,
    Json(body): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>), StatusCode> {
    let link_type = LinkType::parse(&body.link_type).ok_or(StatusCode::BAD_REQUEST)?;
    let target_type = parse_kind(&body.target_type)?;
    if link_type.target_kind() != target_type {
        return Err(StatusCode::BAD_REQUEST);
    }
    let request = DomainCreateLink {
        source_type: parse_kind(&body.source_type)?,
        source_id: body.source_id,
        target_type,
        target_id: body.target_id,
        link_type,
        context: body.context,
        position: body.position,
    };
    let link = ctx
        .link_service()
        .create_link(request)
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(link.into())))
}

#[utoipa::path(delete, path = "/api/links/{id}", tag = "Links",
    params(("id" = String, Path, description = "Link ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not found")))]
pub async fn delete_link(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let removed = ctx
        .link_service()
        .delete_link(&id)
        .await
        .map_err(internal)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[utoipa::path(put, path = "/api/sources/{source_type}/{source_id}/links", tag = "Links",
    params(
        ("source_type" = String, Path, description = "page or block"),
        ("source_id" = String, Path, description = "Source node ID"),
    ),
    request_body = ContentBody,
    responses((status = 200, body = UpdateLinksResponse)))]
pub async fn update_source_links(
    State(ctx): State<AppContext>,
    Path((source_type, source_id)): Path<(String, String)>,
    Json(body): Json<ContentBody>,
) -> Result<Json<UpdateLinksResponse>, StatusCode> {
    let kind = parse_kind(&source_type)?;
    let summary = ctx
        .link_service()
        .update_links_for_content(kind, &source_id, &body.content)
        .await
        .map_err(internal)?;
    Ok(Json(UpdateLinksResponse {
        links: summary.links.into_iter().map(Into::into).collect(),
        unresolved: summary.unresolved.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(delete, path = "/api/sources/{source_type}/{source_id}/links", tag = "Links",
    params(
        ("source_type" = String, Path, description = "page or block"),
        ("source_id" = String, Path, description = "Source node ID"),
    ),
    responses((status = 200, body = DeleteLinksResponse)))]
pub async fn delete_source_links(
    State(ctx): State<AppContext>,
    Path((source_type, source_id)): Path<(String, String)>,
) -> Result<Json<DeleteLinksResponse>, StatusCode> {
    let kind = parse_kind(&source_type)?;
    let deleted = ctx
        .link_service()
        .delete_links_for_source(kind, &source_id)
        .await
        .map_err(internal)?;
    Ok(Json(DeleteLinksResponse { deleted }))
}

#[utoipa::path(get, path = "/api/nodes/{id}/backlinks", tag = "Links",
    params(
        ("id" = String, Path, description = "Target node ID"),
        ("target_type" = Option<String>, Query, description = "page or block"),
    ),
    responses((status = 200, body = [BacklinkInfo])))]
pub async fn get_backlinks(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(q): Query<BacklinksQuery>,
) -> Result<Json<Vec<BacklinkInfo>>, StatusCode> {
    let kind = parse_optional_kind(q.target_type.as_deref())?;
    let items = ctx
        .link_service()
        .get_backlinks(&id, kind)
        .await
        .map_err(internal)?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

#[utoipa::path(get, path = "/api/nodes/{id}/links", tag = "Links",
    params(
        ("id" = String, Path, description = "Source node ID"),
        ("source_type" = Option<String>, Query, description = "page or block"),
    ),
    responses((status = 200, body = [Link])))]
pub async fn get_forward_links(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(q): Query<ForwardLinksQuery>,
) -> Result<Json<Vec<Link>>, StatusCode> {
    let kind = parse_optional_kind(q.source_type.as_deref())?;
    let items = ctx
        .link_service()
        .get_forward_links(&id, kind)
        .await
        .map_err(internal)?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

#[utoipa::path(get, path = "/api/nodes/{id}/graph", tag = "Links",
    params(
        ("id" = String, Path, description = "Center node ID"),
        ("depth" = Option<usize>, Query, description = "Hops from the center"),
    ),
    responses((status = 200, body = LinkGraphResponse)))]
pub async fn get_link_graph(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(q): Query<GraphQuery>,
) -> Result<Json<LinkGraphResponse>, StatusCode> {
    let graph = ctx
        .link_service()
        .get_link_graph(&id, q.depth)
        .await
        .map_err(internal)?;
    Ok(Json(graph.into()))
}

#[utoipa::path(
    get,
    path = "/api/links/events",
    tag = "Links",
    responses((status = 200, description = "Link event stream", content_type = "text/event-stream"))
)]
pub async fn sse_link_events(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let initial = stream::iter(vec![Ok(Event::default().event("ready").data("{}"))]);
    let events = ctx.subscribe_link_events().filter_map(|ev| async move {
        match serde_json::to_string(&ev) {
            Ok(payload) => Some(Ok(Event::default().event(ev.name()).data(payload))),
            Err(err) => {
                tracing::error!(error = ?err, event = ev.name(), "link_event_encode_failed");
                None
            }
        }
    });
    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(25))
        .text(":\n");
    Sse::new(initial.chain(events)).keep_alive(keepalive)
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/links", post(create_link))
        .route("/links/:id", delete(delete_link))
        .route("/links/parse", post(parse_links))
        .route("/links/validate", post(validate_links))
        .route("/links/statistics", post(link_statistics))
        .route("/links/incomplete", post(incomplete_link))
        .route("/links/at-cursor", post(link_at_cursor))
        .route("/links/events", get(sse_link_events))
        .route(
            "/sources/:source_type/:source_id/links",
            put(update_source_links).delete(delete_source_links),
        )
        .route("/nodes/:id/backlinks", get(get_backlinks))
        .route("/nodes/:id/links", get(get_forward_links))
        .route("/nodes/:id/graph", get(get_link_graph))
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kinds_in_paths() {
        assert_eq!(parse_kind("page"), Ok(NodeKind::Page));
        assert_eq!(parse_kind("Block"), Ok(NodeKind::Block));
        assert_eq!(parse_kind("folder"), Err(StatusCode::BAD_REQUEST));
        assert_eq!(parse_optional_kind(Some(" ")), Ok(None));
        assert_eq!(parse_optional_kind(None), Ok(None));
    }

    #[tokio::test]
    async fn parse_endpoint_reports_links_and_breakage() {
        let Json(resp) = parse_links(Json(ContentBody {
            content: "[[首页]] and [[broken".into(),
        }))
        .await;
        assert_eq!(resp.links.len(), 1);
        assert_eq!(resp.broken_links.len(), 1);

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["links"][0]["kind"], "page-reference");
    }

    #[tokio::test]
    async fn statistics_keep_their_shape() {
        let Json(resp) = link_statistics(Json(ContentBody {
            content: "[[a]] ((abcdefgh))".into(),
        }))
        .await;
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["total"], 2);
        assert_eq!(value["pages"]["total"], 1);
    }
}
