//! Single-slot event feed between the host callback and the classifier task.
//!
//! The host delivers events on its own thread and must never wait. The feed
//! keeps only the newest unprocessed event: publishing overwrites whatever
//! the consumer has not picked up yet, so a slow consumer sees fresh state
//! instead of a growing backlog.

use crate::domain::event::WindowEvent;
use tokio::sync::watch;

/// Producer side of the feed. Cloning shares the same slot.
#[derive(Debug, Clone)]
pub struct EventFeed {
    tx: watch::Sender<Option<WindowEvent>>,
}

/// Consumer side of the feed.
#[derive(Debug)]
pub struct EventSubscription {
    rx: watch::Receiver<Option<WindowEvent>>,
}

impl EventFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Replace the pending event. Never blocks and never fails, even with
    /// no subscriber.
    pub fn publish(&self, event: WindowEvent) {
        self.tx.send_replace(Some(event));
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSubscription {
    /// Wait for the next event. Returns `None` once every producer is gone.
    pub async fn next(&mut self) -> Option<WindowEvent> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(event) = self.rx.borrow_and_update().clone() {
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_latest_event_wins() {
        let feed = EventFeed::new();
        let mut sub = feed.subscribe();

        feed.publish(WindowEvent::state_changed("a.first"));
        feed.publish(WindowEvent::state_changed("a.second"));
        feed.publish(WindowEvent::state_changed("a.third"));

        let event = sub.next().await.unwrap();
        assert_eq!(event.source_package, "a.third");

        // Nothing pending after the slot was consumed
        let pending = tokio::time::timeout(Duration::from_millis(20), sub.next()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_does_not_fail() {
        let feed = EventFeed::new();
        feed.publish(WindowEvent::state_changed("a.lonely"));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_feed_dropped() {
        let feed = EventFeed::new();
        let mut sub = feed.subscribe();
        drop(feed);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_new_subscriber_skips_stale_event() {
        let feed = EventFeed::new();
        feed.publish(WindowEvent::state_changed("a.stale"));

        let mut sub = feed.subscribe();
        feed.publish(WindowEvent::state_changed("a.fresh"));
        assert_eq!(sub.next().await.unwrap().source_package, "a.fresh");
    }
}
