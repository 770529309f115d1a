use std::sync::Mutex;

use async_trait::async_trait;

use crate::application::ports::link_event_publisher::{LinkEvent, LinkEventPublisher};

/// Keeps every published event; optionally rejects them all.
#[derive(Default)]
pub struct RecordingLinkEventBus {
    events: Mutex<Vec<LinkEvent>>,
    fail: bool,
}

impl RecordingLinkEventBus {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkEventPublisher for RecordingLinkEventBus {
    async fn publish(&self, event: &LinkEvent) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("event bus unavailable");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
