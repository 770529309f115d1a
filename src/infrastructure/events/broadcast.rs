use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::link_event_publisher::{LinkEvent, LinkEventPublisher};

/// In-process fan-out of link events. Subscribers attach to the sender's
/// channel; lagging ones skip the events they missed.
#[derive(Clone)]
pub struct BroadcastLinkEventBus {
    sender: broadcast::Sender<LinkEvent>,
}

impl BroadcastLinkEventBus {
    pub fn new(sender: broadcast::Sender<LinkEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl LinkEventPublisher for BroadcastLinkEventBus {
    async fn publish(&self, event: &LinkEvent) -> anyhow::Result<()> {
        match self.sender.send(event.clone()) {
            Ok(_) => Ok(()),
            // no subscribers yet
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let (sender, _) = broadcast::channel(8);
        let bus = BroadcastLinkEventBus::new(sender.clone());
        bus.publish(&LinkEvent::Deleted {
            link_id: "dropped".into(),
        })
        .await
        .unwrap();

        let mut rx = sender.subscribe();
        bus.publish(&LinkEvent::Deleted {
            link_id: "link_1".into(),
        })
        .await
        .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            LinkEvent::Deleted {
                link_id: "link_1".into()
            }
        );
    }
}
