//! Live complete-snapshot stream.

use crate::change_feed::ChangeEvent;
use crate::error::PersistenceResult;
use crate::persistence::Persistence;
use crate::snapshot::AppDataComplete;
use tokio::sync::mpsc::UnboundedReceiver;

/// Yields the complete snapshot now and again after every change.
///
/// The first call to [`CompleteStream::next`] returns immediately. Later
/// calls wait for the next change event; events that arrived meanwhile are
/// coalesced into one snapshot.
#[derive(Debug)]
pub struct CompleteStream {
    persistence: Persistence,
    events: UnboundedReceiver<ChangeEvent>,
    started: bool,
    last_sequence: u64,
}

impl CompleteStream {
    /// Returns the sequence number of the last change reflected in a
    /// yielded snapshot (0 before any change).
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Returns the next snapshot, or `None` once the engine is gone.
    ///
    /// # Errors
    ///
    /// Propagates snapshot assembly failures; the stream stays usable.
    pub async fn next(&mut self) -> Option<PersistenceResult<AppDataComplete>> {
        if self.started {
            let event = self.events.recv().await?;
            self.last_sequence = event.sequence;
            while let Ok(event) = self.events.try_recv() {
                self.last_sequence = event.sequence;
            }
        }
        self.started = true;
        Some(self.persistence.load_complete().await)
    }
}

impl Persistence {
    /// Subscribes to the complete snapshot.
    #[must_use]
    pub fn complete_stream(&self) -> CompleteStream {
        CompleteStream {
            events: self.subscribe(),
            last_sequence: self.latest_change_sequence(),
            persistence: self.clone(),
            started: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::gate::WriteMode;
    use crate::keys::logical;
    use crate::persistence::Persistence;
    use serde_json::json;

    #[tokio::test]
    async fn first_value_is_eager_then_follows_writes() {
        let persistence = Persistence::in_memory().unwrap();
        let mut stream = persistence.complete_stream();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get(logical::REMINDERS), Some(&json!([])));

        persistence
            .save_raw(logical::REMINDERS, None, json!([{"id": "r"}]), WriteMode::Regular)
            .await
            .unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.get(logical::REMINDERS), Some(&json!([{"id": "r"}])));
        assert_eq!(stream.last_sequence(), 1);
    }

    #[tokio::test]
    async fn bursts_are_coalesced() {
        let persistence = Persistence::in_memory().unwrap();
        let mut stream = persistence.complete_stream();
        stream.next().await.unwrap().unwrap();

        for i in 0..3 {
            persistence
                .save_raw(logical::REMINDERS, None, json!([i]), WriteMode::Regular)
                .await
                .unwrap();
        }
        let latest = stream.next().await.unwrap().unwrap();
        assert_eq!(latest.get(logical::REMINDERS), Some(&json!([2])));
        assert_eq!(stream.last_sequence(), 3);
    }
}
