use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::links::link::NodeKind;

/// One async mutex per link source. Waiters are served in FIFO order, so
/// overlapping rewrites of the same source finish in call order.
#[derive(Clone, Default)]
pub struct SourceLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            // entries nobody holds or waits on
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry(key.to_string()).or_default().clone()
        };
        entry.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub fn source_key(source_type: NodeKind, source_id: &str) -> String {
    format!("{}:{}", source_type.as_str(), source_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_waits_other_keys_do_not() {
        let locks = SourceLocks::new();
        let held = locks.lock("page:a").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock("page:a")).await;
        assert!(blocked.is_err());

        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock("page:b")).await;
        assert!(other.is_ok());

        drop(held);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.lock("page:a")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = SourceLocks::new();
        drop(locks.lock("page:a").await);
        drop(locks.lock("page:b").await);
        let _c = locks.lock("page:c").await;
        assert_eq!(locks.tracked().await, 1);
    }

    #[test]
    fn keys_combine_kind_and_id() {
        assert_eq!(source_key(NodeKind::Block, "b1"), "block:b1");
    }
}
