use std::sync::Arc;

use futures_util::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::application::linkgraph::LinkManagerService;
use crate::application::ports::link_event_publisher::LinkEvent;
use crate::application::ports::link_repository::LinkRepository;
use crate::bootstrap::config::Config;

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

#[derive(Clone)]
pub struct AppServices {
    link_service: LinkManagerService,
    link_repo: Arc<dyn LinkRepository>,
    link_events: broadcast::Sender<LinkEvent>,
}

impl AppServices {
    pub fn new(
        link_service: LinkManagerService,
        link_repo: Arc<dyn LinkRepository>,
        link_events: broadcast::Sender<LinkEvent>,
    ) -> Self {
        Self {
            link_service,
            link_repo,
            link_events,
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn link_service(&self) -> &LinkManagerService {
        &self.services.link_service
    }

    pub fn link_repo(&self) -> Arc<dyn LinkRepository> {
        self.services.link_repo.clone()
    }

    pub fn subscribe_link_events(&self) -> BoxStream<'static, LinkEvent> {
        BroadcastStream::new(self.services.link_events.subscribe())
            .filter_map(|evt| async move { evt.ok() })
            .boxed()
    }
}
