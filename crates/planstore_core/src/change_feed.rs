//! Change feed for observing successful writes.
//!
//! Every successful model write, removal, import and wipe is published as a
//! [`ChangeEvent`]. The feed:
//! - Emits only writes that reached the store
//! - Numbers events in publication order
//! - Supports multiple subscribers
//! - Keeps a bounded history for polling
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut rx = persistence.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         println!("change #{}: {:?}", event.sequence, event.change);
//!     }
//! });
//! ```

use crate::snapshot::AppData;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A write to one model value.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChange {
    /// Logical key of the written value.
    pub logical_key: String,
    /// Project id, for project-scoped models.
    pub project_id: Option<String>,
    /// The persisted value. `None` for removals.
    pub data: Option<Value>,
    /// Whether the write was issued by an import.
    pub is_import: bool,
}

/// What happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A value was saved or removed.
    Model(ModelChange),
    /// A complete snapshot was imported; carries the new snapshot body.
    Imported(Arc<AppData>),
    /// The store was wiped.
    Cleared,
}

/// A numbered change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Publication sequence number, starting at 1.
    pub sequence: u64,
    /// The change.
    pub change: Change,
}

impl ChangeEvent {
    /// Returns the logical key for model changes.
    #[must_use]
    pub fn logical_key(&self) -> Option<&str> {
        match &self.change {
            Change::Model(m) => Some(&m.logical_key),
            _ => None,
        }
    }
}

struct History {
    events: VecDeque<ChangeEvent>,
    next_sequence: u64,
}

/// Distributes change events to subscribers.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<UnboundedSender<ChangeEvent>>>,
    history: RwLock<History>,
    max_history: usize,
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history_len())
            .field("max_history", &self.max_history)
            .finish()
    }
}

impl ChangeFeed {
    /// Creates a change feed retaining up to `max_history` events.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(History {
                events: VecDeque::new(),
                next_sequence: 1,
            }),
            max_history,
        }
    }

    /// Subscribes to future events.
    ///
    /// The receiver is unbounded; drop it when no longer interested.
    pub fn subscribe(&self) -> UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes a change and returns its sequence number.
    ///
    /// Delivery happens while the history lock is held, so every subscriber
    /// receives events in sequence order. Lock order is history, then
    /// subscribers.
    pub fn publish(&self, change: Change) -> u64 {
        let mut history = self.history.write();
        let event = ChangeEvent {
            sequence: history.next_sequence,
            change,
        };
        history.next_sequence += 1;
        if self.max_history > 0 {
            history.events.push_back(event.clone());
            while history.events.len() > self.max_history {
                history.events.pop_front();
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        event.sequence
    }

    /// Returns retained events with sequence > `cursor`, up to `limit`.
    #[must_use]
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .events
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the sequence number of the last published event, or 0.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().next_sequence - 1
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Returns the number of retained events.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().events.len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::with_max_history(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn saved(key: &str) -> Change {
        Change::Model(ModelChange {
            logical_key: key.to_string(),
            project_id: None,
            data: Some(json!({})),
            is_import: false,
        })
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        let seq = feed.publish(saved("tag"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, seq);
        assert_eq!(event.logical_key(), Some("tag"));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let feed = ChangeFeed::default();
        let mut rx1 = feed.subscribe();
        let mut rx2 = feed.subscribe();

        feed.publish(Change::Cleared);
        assert_eq!(rx1.recv().await.unwrap().change, Change::Cleared);
        assert_eq!(rx2.recv().await.unwrap().change, Change::Cleared);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = ChangeFeed::default();
        let rx = feed.subscribe();
        let _keep = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(rx);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::default();
        for key in ["a", "b", "c", "d"] {
            feed.publish(saved(key));
        }

        let events = feed.poll(1, 2);
        let keys: Vec<_> = events.iter().filter_map(ChangeEvent::logical_key).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(feed.latest_sequence(), 4);
    }

    #[test]
    fn concurrent_publishers_deliver_in_sequence_order() {
        let feed = Arc::new(ChangeFeed::with_max_history(0));
        let mut rx = feed.subscribe();

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let feed = Arc::clone(&feed);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        feed.publish(saved("task"));
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().unwrap();
        }

        let mut last = 0;
        let mut received = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.sequence > last, "{} after {last}", event.sequence);
            last = event.sequence;
            received += 1;
        }
        assert_eq!(received, 1000);
        assert_eq!(last, 1000);
    }

    #[test]
    fn history_is_bounded() {
        let feed = ChangeFeed::with_max_history(2);
        for key in ["a", "b", "c"] {
            feed.publish(saved(key));
        }
        assert_eq!(feed.history_len(), 2);
        assert_eq!(feed.poll(0, 10)[0].sequence, 2);
        assert_eq!(feed.latest_sequence(), 3);
    }
}
