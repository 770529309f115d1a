use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::MatchedPath;
use dotenvy::dotenv;
use futures_util::StreamExt;
use http::HeaderValue;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use linkgraph::application::linkgraph::LinkManagerService;
use linkgraph::application::ports::link_event_publisher::{LinkEvent, LinkEventPublisher};
use linkgraph::application::ports::link_repository::LinkRepository;
use linkgraph::bootstrap::app_context::{AppContext, AppServices};
use linkgraph::bootstrap::config::{Config, StoreBackend};
use linkgraph::infrastructure::events::{BroadcastLinkEventBus, PgLinkEventBus};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const LINK_EVENT_BUFFER: usize = 256;

#[derive(OpenApi)]
#[openapi(
        paths(
            linkgraph::presentation::http::links::parse_links,
            linkgraph::presentation::http::links::validate_links,
            linkgraph::presentation::http::links::link_statistics,
            linkgraph::presentation::http::links::incomplete_link,
            linkgraph::presentation::http::links::link_at_cursor,
            linkgraph::presentation::http::links::create_link,
            linkgraph::presentation::http::links::delete_link,
            linkgraph::presentation::http::links::update_source_links,
            linkgraph::presentation::http::links::delete_source_links,
            linkgraph::presentation::http::links::get_backlinks,
            linkgraph::presentation::http::links::get_forward_links,
            linkgraph::presentation::http::links::get_link_graph,
            linkgraph::presentation::http::links::sse_link_events,
            linkgraph::presentation::http::health::health,
        ),
        components(schemas(
            linkgraph::presentation::http::links::ContentBody,
            linkgraph::presentation::http::links::CursorBody,
            linkgraph::presentation::http::links::ParseLinksResponse,
            linkgraph::presentation::http::links::SyntaxErrorItem,
            linkgraph::presentation::http::links::ValidateLinksResponse,
            linkgraph::presentation::http::links::PageLinkStatsItem,
            linkgraph::presentation::http::links::BlockLinkStatsItem,
            linkgraph::presentation::http::links::LinkStatisticsResponse,
            linkgraph::presentation::http::links::IncompleteLinkResponse,
            linkgraph::presentation::http::links::LinkAtCursorResponse,
            linkgraph::presentation::http::links::Link,
            linkgraph::presentation::http::links::CreateLinkRequest,
            linkgraph::presentation::http::links::BacklinkInfo,
            linkgraph::presentation::http::links::UnresolvedItem,
            linkgraph::presentation::http::links::UpdateLinksResponse,
            linkgraph::presentation::http::links::DeleteLinksResponse,
            linkgraph::presentation::http::links::GraphNodeItem,
            linkgraph::presentation::http::links::GraphEdgeItem,
            linkgraph::presentation::http::links::LinkGraphResponse,
            linkgraph::presentation::http::health::HealthResp,
        )),
        tags(
            (name = "Links", description = "Link parsing, link graph and backlinks"),
            (name = "Health", description = "System health checks")
        )
    )]
struct ApiDoc;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(?e, "shutdown_signal_failed");
    }
    info!("shutdown_requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "linkgraph=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(?cfg, "Starting link graph service");

    let (link_events, _) = broadcast::channel::<LinkEvent>(LINK_EVENT_BUFFER);

    let (link_repo, event_publisher): (Arc<dyn LinkRepository>, Arc<dyn LinkEventPublisher>) =
        match cfg.store_backend {
            StoreBackend::Memory => {
                tracing::info!("store_backend_memory");
                let repo: Arc<dyn LinkRepository> =
                    Arc::new(linkgraph::infrastructure::memory::InMemoryLinkRepository::new());
                let publisher: Arc<dyn LinkEventPublisher> =
                    Arc::new(BroadcastLinkEventBus::new(link_events.clone()));
                (repo, publisher)
            }
            StoreBackend::Postgres => {
                let database_url = cfg
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;
                let pool = linkgraph::infrastructure::db::connect_pool(database_url).await?;
                linkgraph::infrastructure::db::migrate(&pool).await?;
                tracing::info!(channel = %cfg.link_events_channel, "store_backend_postgres");

                let bus = PgLinkEventBus::new(pool.clone(), cfg.link_events_channel.clone());
                // every instance, this one included, hears its events via LISTEN
                let mut incoming = bus.subscribe().await?;
                let forward_to = link_events.clone();
                tokio::spawn(async move {
                    while let Some(event) = incoming.next().await {
                        let _ = forward_to.send(event);
                    }
                });
                let repo: Arc<dyn LinkRepository> = Arc::new(
                    linkgraph::infrastructure::db::repositories::link_repository_sqlx::SqlxLinkRepository::new(
                        pool,
                    ),
                );
                let publisher: Arc<dyn LinkEventPublisher> = Arc::new(bus);
                (repo, publisher)
            }
        };

    let link_service = LinkManagerService::new(link_repo.clone(), event_publisher)
        .with_max_graph_depth(cfg.graph_max_depth)
        .with_default_graph_depth(cfg.graph_default_depth);

    let services = AppServices::new(link_service, link_repo, link_events);
    let ctx = AppContext::new(cfg.clone(), services);

    let methods = [
        http::Method::GET,
        http::Method::POST,
        http::Method::PUT,
        http::Method::DELETE,
        http::Method::OPTIONS,
    ];
    let cors = match cfg.frontend_url.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([http::header::CONTENT_TYPE]),
        _ if cfg.is_production => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_static("http://invalid")))
            .allow_methods(methods)
            .allow_headers([http::header::CONTENT_TYPE]),
        // Development convenience
        _ => CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers([http::header::CONTENT_TYPE]),
    };

    let app = Router::new()
        .nest(
            "/api",
            linkgraph::presentation::http::health::routes(ctx.clone()),
        )
        .nest(
            "/api",
            linkgraph::presentation::http::links::routes(ctx.clone()),
        )
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        );

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!(%api_addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?e, "API server failed");
        return Err(e.into());
    }
    Ok(())
}
