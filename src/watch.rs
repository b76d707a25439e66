use crate::error::Result;
use crate::protocol::Command;
use crate::types::WatchItem;
use std::collections::BTreeMap;
use std::future::Future;

/// Tracks which watch subscriptions are active on the controller
///
/// Enabling an active item or disabling an inactive one sends nothing and
/// succeeds.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    active: BTreeMap<WatchItem, bool>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, item: &WatchItem) -> bool {
        self.active.get(item).copied().unwrap_or(false)
    }

    /// Items currently watched
    pub fn active(&self) -> Vec<WatchItem> {
        self.active
            .iter()
            .filter(|(_, on)| **on)
            .map(|(item, _)| *item)
            .collect()
    }

    /// Forget every subscription (the controller drops them with the socket)
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Turn a watch on or off, sending the `WATCH` command through `send`
    /// only when the state actually changes.
    ///
    /// The registry is updated after `send` succeeds; on failure it is left
    /// as it was.
    pub async fn set<F, Fut>(&mut self, item: WatchItem, turn_on: bool, send: F) -> Result<()>
    where
        F: FnOnce(Command) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if self.is_active(&item) == turn_on {
            tracing::debug!(
                "Watch {} already {}",
                item.key(),
                if turn_on { "on" } else { "off" }
            );
            return Ok(());
        }

        send(Command::watch(item, turn_on)).await?;
        self.active.insert(item, turn_on);
        tracing::info!("Watch {} {}", item.key(), if turn_on { "on" } else { "off" });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RioError;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(Command) -> std::future::Ready<Result<String>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = sent.clone();
        let send = move |cmd: Command| {
            log.lock().unwrap().push(cmd.to_string());
            std::future::ready(Ok(String::new()))
        };
        (sent, send)
    }

    #[tokio::test]
    async fn test_enable_twice_sends_once() {
        let (sent, send) = recorder();
        let mut registry = WatchRegistry::new();

        registry.set(WatchItem::zone(1, 1), true, &send).await.unwrap();
        registry.set(WatchItem::zone(1, 1), true, &send).await.unwrap();

        assert_eq!(*sent.lock().unwrap(), vec!["WATCH C[1].Z[1] ON"]);
        assert!(registry.is_active(&WatchItem::zone(1, 1)));
    }

    #[tokio::test]
    async fn test_disable_inactive_is_noop() {
        let (sent, send) = recorder();
        let mut registry = WatchRegistry::new();

        registry.set(WatchItem::System, false, &send).await.unwrap();
        assert!(sent.lock().unwrap().is_empty());

        registry.set(WatchItem::System, true, &send).await.unwrap();
        registry.set(WatchItem::System, false, &send).await.unwrap();
        assert_eq!(
            *sent.lock().unwrap(),
            vec!["WATCH System ON", "WATCH System OFF"]
        );
        assert!(registry.active().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_state_unchanged() {
        let mut registry = WatchRegistry::new();
        let result = registry
            .set(WatchItem::source(3), true, |_| async {
                Err(RioError::Protocol {
                    detail: "Invalid source".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(RioError::Protocol { .. })));
        assert!(!registry.is_active(&WatchItem::source(3)));
    }

    #[test]
    fn test_keys() {
        assert_eq!(WatchItem::System.key(), "System");
        assert_eq!(WatchItem::zone(1, 4).key(), "zone4");
        assert_eq!(WatchItem::source(2).key(), "source2");
    }
}
