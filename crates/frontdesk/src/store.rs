//! Backing-store abstraction for the queue.
//!
//! The queue manager talks to storage only through [`EntryStore`]. Two
//! implementations exist: [`crate::storage::LocalStore`] (durable local blob,
//! no change feed) and [`crate::remote::RemoteStore`] (hosted table with a
//! realtime change feed). Stores that rebroadcast their own writes hand out a
//! [`ChangeFeed`]; the manager then waits for the feed instead of applying
//! mutations itself.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::entry::{Entry, EntryId, Status};
use crate::error::Result;

/// A row-level change pushed by the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new row, as stored.
    Inserted(Entry),
    /// The full new version of an existing row.
    Updated(Entry),
    /// A row was removed. Only the key is guaranteed.
    Deleted {
        /// Id of the removed row.
        id: EntryId,
    },
}

impl ChangeEvent {
    /// Id of the row the event is about.
    #[must_use]
    pub fn id(&self) -> &EntryId {
        match self {
            Self::Inserted(entry) | Self::Updated(entry) => &entry.id,
            Self::Deleted { id } => id,
        }
    }

    /// Whether this is the insert of a row with the given name and memo.
    ///
    /// Inserted rows get their id from the server, so an add can only be
    /// recognized by content.
    #[must_use]
    pub fn is_insert_of(&self, name: &str, memo: &str) -> bool {
        match self {
            Self::Inserted(entry) => entry.name == name.trim() && entry.memo == memo.trim(),
            _ => false,
        }
    }
}

/// Sending half of a change feed, held by whatever produces events.
pub type ChangeSender = mpsc::UnboundedSender<ChangeEvent>;

/// An ordered, unbounded, non-restartable sequence of change events.
///
/// Dropping the feed (or calling [`ChangeFeed::close`]) tears down the
/// producing task, so a superseded connection cannot keep delivering.
#[derive(Debug)]
pub struct ChangeFeed {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    producer: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    /// Create a feed with no background producer.
    ///
    /// Events are pushed through the returned sender.
    #[must_use]
    pub fn channel() -> (ChangeSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, producer: None })
    }

    /// Create a feed whose events come from a spawned task.
    ///
    /// The task is aborted when the feed goes away.
    #[must_use]
    pub fn with_producer(rx: mpsc::UnboundedReceiver<ChangeEvent>, producer: JoinHandle<()>) -> Self {
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// Wait for the next event. Returns `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    /// Unsubscribe.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            debug!("Stopping change feed producer");
            producer.abort();
        }
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Storage operations the queue manager relies on.
///
/// Mutations are requests: for stores that provide a change feed their
/// effect becomes visible only when the matching event arrives.
#[async_trait::async_trait]
pub trait EntryStore: Send + Sync + std::fmt::Debug {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Every stored entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn fetch_all(&self) -> Result<Vec<Entry>>;

    /// Store a new entry. Remote stores ignore `id` and `created_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn insert(&self, entry: &Entry) -> Result<()>;

    /// Change the status of an existing entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn update_status(&self, id: &EntryId, status: Status) -> Result<()>;

    /// Delete an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn remove(&self, id: &EntryId) -> Result<()>;

    /// Open a change feed, if this store pushes changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the store supports a feed but it cannot be opened.
    async fn subscribe(&self) -> Result<Option<ChangeFeed>> {
        Ok(None)
    }
}

/// Builds a remote store from connection settings.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Validate the settings and return a ready store.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings cannot produce a client.
    async fn connect(&self, remote: &RemoteConfig) -> Result<Box<dyn EntryStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_feed_preserves_order() {
        let (tx, mut feed) = ChangeFeed::channel();
        let a = Entry::new("A", "one");
        let b = Entry::new("B", "two");

        tx.send(ChangeEvent::Inserted(a.clone())).unwrap();
        tx.send(ChangeEvent::Inserted(b.clone())).unwrap();
        tx.send(ChangeEvent::Deleted { id: a.id.clone() }).unwrap();

        assert_eq!(feed.next().await, Some(ChangeEvent::Inserted(a.clone())));
        assert_eq!(feed.next().await, Some(ChangeEvent::Inserted(b)));
        assert_eq!(feed.next().await, Some(ChangeEvent::Deleted { id: a.id }));
    }

    #[test]
    fn test_event_id_and_insert_match() {
        let kim = Entry::new("Kim", "taping");
        let other = Entry::new("Lee", "taping");

        assert_eq!(ChangeEvent::Updated(kim.clone()).id(), &kim.id);
        assert_eq!(ChangeEvent::Deleted { id: "x".into() }.id(), &EntryId::from("x"));

        assert!(ChangeEvent::Inserted(kim.clone()).is_insert_of(" Kim ", "taping"));
        assert!(!ChangeEvent::Inserted(kim.clone()).is_insert_of("Kim", "ultrasound"));
        assert!(!ChangeEvent::Inserted(other).is_insert_of("Kim", "taping"));
        assert!(!ChangeEvent::Updated(kim).is_insert_of("Kim", "taping"));
    }

    #[tokio::test]
    async fn test_try_next_does_not_block() {
        let (tx, mut feed) = ChangeFeed::channel();
        assert!(feed.try_next().is_none());

        tx.send(ChangeEvent::Deleted { id: "x".into() }).unwrap();
        assert!(feed.try_next().is_some());
        assert!(feed.try_next().is_none());
    }

    #[tokio::test]
    async fn test_feed_ends_when_sender_dropped() {
        let (tx, mut feed) = ChangeFeed::channel();
        drop(tx);
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_aborts_producer() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let producer = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });

        let feed = ChangeFeed::with_producer(rx, producer);
        feed.close();

        // The aborted task drops its end of the oneshot.
        assert!(alive_rx.await.is_err());
    }

    #[tokio::test]
    async fn test_closed_feed_rejects_sends() {
        let (tx, feed) = ChangeFeed::channel();
        feed.close();
        assert!(tx.send(ChangeEvent::Deleted { id: "x".into() }).is_err());
    }
}
