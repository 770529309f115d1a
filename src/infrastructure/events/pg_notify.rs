use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::application::ports::link_event_publisher::{LinkEvent, LinkEventPublisher};
use crate::domain::links::link::{Link, NodeKind};
use crate::infrastructure::db::PgPool;

// NOTIFY payloads must stay under 8000 bytes.
const MAX_NOTIFY_PAYLOAD: usize = 7900;
// Room for the part index and total, whose digits are unknown until packing ends.
const PART_NUMBER_SLACK: usize = 40;
const RELISTEN_DELAY: Duration = Duration::from_secs(1);

/// Link events over Postgres LISTEN/NOTIFY, so every API instance sees
/// changes made through any other.
///
/// A bulk update too large for one notification is sent as numbered parts of
/// one batch, inside one transaction. Listeners put the parts back together
/// and emit a single `links:bulk-updated` event.
#[derive(Clone)]
pub struct PgLinkEventBus {
    pool: PgPool,
    channel: String,
}

impl PgLinkEventBus {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    pub async fn subscribe(&self) -> anyhow::Result<BoxStream<'static, LinkEvent>> {
        let (tx, rx) = mpsc::unbounded_channel::<LinkEvent>();
        let pool = self.pool.clone();
        let channel = self.channel.clone();

        tokio::spawn(async move {
            // relay only returns Ok once the subscriber is gone
            while let Err(err) = relay(&pool, &channel, &tx).await {
                tracing::error!(error = ?err, channel = %channel, "link_event_listener_failed");
                tokio::time::sleep(RELISTEN_DELAY).await;
            }
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

async fn relay(
    pool: &PgPool,
    channel: &str,
    tx: &mpsc::UnboundedSender<LinkEvent>,
) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(pool)
        .await
        .context("link_event_listener_connect")?;
    listener
        .listen(channel)
        .await
        .context("link_event_listener_listen")?;

    // parts of a batch never span connections
    let mut assembler = BulkAssembler::default();
    loop {
        let notification = listener
            .recv()
            .await
            .context("link_event_listener_recv")?;
        let incoming = match decode_notification(notification.payload()) {
            Ok(incoming) => incoming,
            Err(err) => {
                tracing::error!(
                    error = ?err,
                    raw_payload = notification.payload(),
                    "link_event_listener_decode_failed"
                );
                continue;
            }
        };
        if let Some(event) = assembler.accept(incoming) {
            if tx.send(event).is_err() {
                return Ok(());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BulkPart {
    batch: String,
    index: usize,
    total: usize,
}

#[derive(Serialize)]
struct OutgoingNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    part: Option<&'a BulkPart>,
    event: &'a LinkEvent,
}

#[derive(Debug, Deserialize)]
struct IncomingNotification {
    #[serde(default)]
    part: Option<BulkPart>,
    event: LinkEvent,
}

fn decode_notification(payload: &str) -> anyhow::Result<IncomingNotification> {
    serde_json::from_str(payload).context("link_event_decode")
}

fn batch_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Payloads to NOTIFY for `event`, each within the size limit. Only a bulk
/// update can be split; anything else that does not fit is an error.
fn encode_notifications(event: &LinkEvent) -> anyhow::Result<Vec<String>> {
    let whole = serde_json::to_string(&OutgoingNotification { part: None, event })
        .context("link_event_serialize")?;
    if whole.len() <= MAX_NOTIFY_PAYLOAD {
        return Ok(vec![whole]);
    }

    let LinkEvent::BulkUpdated {
        source_type,
        source_id,
        links,
    } = event
    else {
        anyhow::bail!(
            "{} event is {} bytes, over the NOTIFY limit of {MAX_NOTIFY_PAYLOAD}",
            event.name(),
            whole.len()
        );
    };

    let batch = batch_id();
    let frame = |index: usize, total: usize, links: &[Link]| -> anyhow::Result<String> {
        let part = BulkPart {
            batch: batch.clone(),
            index,
            total,
        };
        let event = LinkEvent::BulkUpdated {
            source_type: *source_type,
            source_id: source_id.clone(),
            links: links.to_vec(),
        };
        serde_json::to_string(&OutgoingNotification {
            part: Some(&part),
            event: &event,
        })
        .context("link_event_serialize")
    };

    let overhead = frame(0, 0, &[])?.len() + PART_NUMBER_SLACK;
    let budget = MAX_NOTIFY_PAYLOAD.saturating_sub(overhead);
    let mut chunks: Vec<&[Link]> = Vec::new();
    let (mut start, mut used) = (0, 0);
    for (i, link) in links.iter().enumerate() {
        // plus the separating comma
        let size = serde_json::to_string(link)
            .context("link_event_serialize")?
            .len()
            + 1;
        if size > budget {
            anyhow::bail!(
                "link {} in bulk update of {}:{source_id} does not fit in one notification",
                link.id,
                source_type
            );
        }
        if used + size > budget {
            chunks.push(&links[start..i]);
            start = i;
            used = 0;
        }
        used += size;
    }
    chunks.push(&links[start..]);

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| frame(index, total, chunk))
        .collect()
}

struct PendingBulk {
    source_type: NodeKind,
    source_id: String,
    parts: Vec<Option<Vec<Link>>>,
    received: usize,
}

/// Joins the parts of split bulk updates back into one event per batch.
#[derive(Default)]
struct BulkAssembler {
    pending: HashMap<String, PendingBulk>,
}

impl BulkAssembler {
    fn accept(&mut self, incoming: IncomingNotification) -> Option<LinkEvent> {
        let Some(part) = incoming.part else {
            return Some(incoming.event);
        };
        let (source_type, source_id, links) = match incoming.event {
            LinkEvent::BulkUpdated {
                source_type,
                source_id,
                links,
            } => (source_type, source_id, links),
            other => {
                tracing::warn!(event = other.name(), batch = %part.batch, "link_event_part_not_bulk");
                return None;
            }
        };
        if part.index >= part.total {
            tracing::warn!(batch = %part.batch, index = part.index, total = part.total, "link_event_part_out_of_range");
            return None;
        }

        let pending = self
            .pending
            .entry(part.batch.clone())
            .or_insert_with(|| PendingBulk {
                source_type,
                source_id,
                parts: vec![None; part.total],
                received: 0,
            });
        if pending.parts.len() != part.total {
            tracing::warn!(batch = %part.batch, total = part.total, "link_event_part_total_mismatch");
            return None;
        }
        let slot = &mut pending.parts[part.index];
        if slot.is_none() {
            pending.received += 1;
        }
        *slot = Some(links);
        if pending.received < pending.parts.len() {
            return None;
        }

        let done = self.pending.remove(&part.batch)?;
        Some(LinkEvent::BulkUpdated {
            source_type: done.source_type,
            source_id: done.source_id,
            links: done.parts.into_iter().flatten().flatten().collect(),
        })
    }
}

#[async_trait]
impl LinkEventPublisher for PgLinkEventBus {
    async fn publish(&self, event: &LinkEvent) -> anyhow::Result<()> {
        let payloads = encode_notifications(event)?;
        if payloads.len() > 1 {
            tracing::debug!(event = event.name(), parts = payloads.len(), "link_event_split");
        }

        // notifications are delivered on commit, all parts together
        let mut tx = self.pool.begin().await.context("link_event_begin")?;
        for payload in payloads {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(&self.channel)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .context("link_event_pg_notify")?;
        }
        tx.commit().await.context("link_event_commit")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::links::link::LinkType;
    use chrono::Utc;

    fn cjk_link(i: usize, context_chars: usize) -> Link {
        let now = Utc::now();
        Link {
            id: format!("link_{i}"),
            source_type: NodeKind::Page,
            source_id: "p-home".into(),
            target_type: NodeKind::Page,
            target_id: format!("p-{i}"),
            link_type: LinkType::PageReference,
            context: Some("页面内容".repeat(context_chars / 4)),
            position: Some(i as i64 * 40),
            created_at: now,
            updated_at: now,
        }
    }

    fn bulk(links: Vec<Link>) -> LinkEvent {
        LinkEvent::BulkUpdated {
            source_type: NodeKind::Page,
            source_id: "p-home".into(),
            links,
        }
    }

    fn reassemble(payloads: &[String]) -> Vec<LinkEvent> {
        let mut assembler = BulkAssembler::default();
        payloads
            .iter()
            .filter_map(|p| assembler.accept(decode_notification(p).unwrap()))
            .collect()
    }

    #[test]
    fn small_events_go_out_whole() {
        let event = LinkEvent::Deleted {
            link_id: "link_1".into(),
        };
        let payloads = encode_notifications(&event).unwrap();
        assert_eq!(payloads.len(), 1);
        assert!(!payloads[0].contains("\"part\""));
        assert_eq!(reassemble(&payloads), vec![event]);
    }

    #[test]
    fn large_bulk_update_is_split_and_reassembled() {
        // 15 links with full CJK context windows
        let event = bulk((0..15).map(|i| cjk_link(i, 120)).collect());
        assert!(serde_json::to_string(&event).unwrap().len() > MAX_NOTIFY_PAYLOAD);

        let payloads = encode_notifications(&event).unwrap();
        assert!(payloads.len() >= 2);
        assert!(payloads.iter().all(|p| p.len() <= MAX_NOTIFY_PAYLOAD));

        let events = reassemble(&payloads);
        assert_eq!(events, vec![event]);
    }

    #[test]
    fn parts_arriving_out_of_order_and_interleaved_still_join() {
        let first = bulk((0..40).map(|i| cjk_link(i, 120)).collect());
        let second = LinkEvent::BulkUpdated {
            source_type: NodeKind::Block,
            source_id: "abc12345XY".into(),
            links: (40..80).map(|i| cjk_link(i, 120)).collect(),
        };
        let mut a = encode_notifications(&first).unwrap();
        let b = encode_notifications(&second).unwrap();
        a.reverse();

        let mut mixed = Vec::new();
        for i in 0..a.len().max(b.len()) {
            mixed.extend(a.get(i).cloned());
            mixed.extend(b.get(i).cloned());
        }
        let events = reassemble(&mixed);
        assert_eq!(events.len(), 2);
        assert!(events.contains(&first));
        assert!(events.contains(&second));
    }

    #[test]
    fn unsplittable_events_are_rejected() {
        let huge = cjk_link(0, 4000);
        assert!(encode_notifications(&bulk(vec![huge.clone()])).is_err());
        assert!(encode_notifications(&LinkEvent::Created { link: huge }).is_err());
    }

    #[test]
    fn part_of_a_non_bulk_event_is_ignored() {
        let mut assembler = BulkAssembler::default();
        let incoming = IncomingNotification {
            part: Some(BulkPart {
                batch: "b".into(),
                index: 0,
                total: 2,
            }),
            event: LinkEvent::Deleted {
                link_id: "link_1".into(),
            },
        };
        assert!(assembler.accept(incoming).is_none());
        assert!(assembler.pending.is_empty());
    }
}
