//! Queue state manager.
//!
//! Owns the authoritative in-memory list. In local mode every mutation is
//! applied, persisted and announced immediately. In remote mode mutations
//! are only requested; the list changes (and notifications fire) when the
//! matching push event comes back through the change feed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::entry::{Entry, EntryId, Status};
use crate::error::{Error, Result};
use crate::notify::{NotificationDispatcher, Severity};
use crate::storage::LocalStore;
use crate::store::{ChangeEvent, ChangeFeed, Connector, EntryStore};

/// The queue and the store behind it.
#[derive(Debug)]
pub struct QueueManager {
    entries: Vec<Entry>,
    store: Arc<dyn EntryStore>,
    local: Arc<LocalStore>,
    connector: Box<dyn Connector>,
    feed: Option<ChangeFeed>,
    connected: bool,
    remote: RemoteConfig,
    notifier: NotificationDispatcher,
}

impl QueueManager {
    /// Create a manager in local mode with an empty list.
    ///
    /// Call [`QueueManager::initialize`] before use.
    #[must_use]
    pub fn new(
        local: Arc<LocalStore>,
        connector: Box<dyn Connector>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            entries: Vec::new(),
            store: local.clone(),
            local,
            connector,
            feed: None,
            connected: false,
            remote: RemoteConfig {
                enabled: false,
                ..RemoteConfig::default()
            },
            notifier,
        }
    }

    /// Pick a mode and load the list.
    ///
    /// Tries remote mode when the settings allow it: connect, fetch every
    /// entry, subscribe. Any failure before the subscription is open falls
    /// back to local mode.
    pub async fn initialize(&mut self, remote: &RemoteConfig) {
        self.release_feed();
        self.remote = remote.clone();

        if remote.is_usable() {
            match self.try_remote(remote).await {
                Ok(()) => return,
                Err(e) => warn!("Remote store unavailable, using local storage: {}", e),
            }
        } else {
            debug!("Remote mode disabled or missing credentials");
        }

        self.use_local();
    }

    async fn try_remote(&mut self, remote: &RemoteConfig) -> Result<()> {
        let store: Arc<dyn EntryStore> = Arc::from(self.connector.connect(remote).await?);

        let entries = match store.fetch_all().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Initial fetch failed, starting empty: {}", e);
                Vec::new()
            }
        };

        let feed = store.subscribe().await?;

        self.entries = entries;
        self.feed = feed;
        self.store = store;
        self.connected = true;
        info!(
            "Connected to {} ({} entries)",
            remote.table,
            self.entries.len()
        );
        Ok(())
    }

    fn use_local(&mut self) {
        let store: Arc<dyn EntryStore> = self.local.clone();
        self.connected = false;
        self.store = store;
        self.entries = self.local.load();
        info!("Using local storage ({} entries)", self.entries.len());
    }

    /// Re-run [`QueueManager::initialize`] if the connection settings
    /// changed. Returns `true` if it did.
    pub async fn reconfigure(&mut self, remote: &RemoteConfig) -> bool {
        if !remote.connection_changed(&self.remote) {
            debug!("Connection settings unchanged");
            return false;
        }
        info!("Connection settings changed, reinitializing");
        self.initialize(remote).await;
        true
    }

    /// Release the change feed.
    pub fn dispose(&mut self) {
        self.release_feed();
    }

    fn release_feed(&mut self) {
        if let Some(feed) = self.feed.take() {
            debug!("Releasing change feed");
            feed.close();
        }
    }

    /// Add a waiting entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if `name` is blank.
    pub async fn add(&mut self, name: &str, memo: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyInput("name"));
        }
        let entry = Entry::new(name, memo.trim());

        if self.connected {
            if let Err(e) = self.store.insert(&entry).await {
                warn!("Insert request for {} failed: {}", entry.name, e);
            }
            return Ok(());
        }

        let message = format!("새 메모: {}", entry.name);
        self.entries.push(entry);
        self.persist_local();
        self.notifier.notify(message, Severity::Alert);
        Ok(())
    }

    /// Move an entry. `Done` deletes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] in local mode if `id` is not on the
    /// list.
    pub async fn set_status(&mut self, id: &EntryId, status: Status) -> Result<()> {
        if status == Status::Done {
            return self.delete(id).await;
        }

        if self.connected {
            if let Err(e) = self.store.update_status(id, status).await {
                warn!("Update request for {} failed: {}", id.short(), e);
            }
            return Ok(());
        }

        let index = self.position(id)?;
        let entry = &mut self.entries[index];
        entry.status = status;
        let name = entry.name.clone();
        self.persist_local();
        self.announce_status(&name, status);
        Ok(())
    }

    /// Remove an entry without notifying.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] in local mode if `id` is not on the
    /// list.
    pub async fn delete(&mut self, id: &EntryId) -> Result<()> {
        if self.connected {
            if let Err(e) = self.store.remove(id).await {
                warn!("Delete request for {} failed: {}", id.short(), e);
            }
            return Ok(());
        }

        let index = self.position(id)?;
        self.entries.remove(index);
        self.persist_local();
        Ok(())
    }

    /// Write the whole in-memory list to the local store.
    ///
    /// The list is authoritative in local mode; a failed write is logged and
    /// the in-memory change stands.
    fn persist_local(&self) {
        if let Err(e) = self.local.save(&self.entries) {
            warn!("Failed to persist local queue: {}", e);
        }
    }

    fn position(&self, id: &EntryId) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| Error::entry_not_found(id.as_str()))
    }

    fn announce_status(&mut self, name: &str, status: Status) {
        match status {
            Status::InProgress => self
                .notifier
                .notify(format!("확인 중: {name}"), Severity::Success),
            Status::Waiting => self
                .notifier
                .notify(format!("대기 이동: {name}"), Severity::Info),
            Status::Done => {}
        }
    }

    /// Wait for the next push event and apply it.
    ///
    /// Returns `None` once the feed has ended; the feed is then dropped.
    /// Never resolves while no feed is open.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        let next = match self.feed.as_mut() {
            Some(feed) => feed.next().await,
            None => return std::future::pending().await,
        };

        match next {
            Some(event) => {
                self.apply_event(event.clone());
                Some(event)
            }
            None => {
                warn!("Change feed ended; remote changes will no longer arrive");
                self.feed = None;
                None
            }
        }
    }

    /// Apply every event already waiting in the feed. Returns how many.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.feed.as_mut().and_then(ChangeFeed::try_next) {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Reconcile one push event into the list.
    pub fn apply_event(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Inserted(entry) => {
                let message = format!("새 메모: {}", entry.name);
                self.upsert(entry);
                self.notifier.notify(message, Severity::Alert);
            }
            ChangeEvent::Updated(entry) if entry.status == Status::Done => {
                self.entries.retain(|e| e.id != entry.id);
            }
            ChangeEvent::Updated(entry) => {
                let name = entry.name.clone();
                let status = entry.status;
                self.upsert(entry);
                self.announce_status(&name, status);
            }
            ChangeEvent::Deleted { id } => {
                self.entries.retain(|e| e.id != id);
            }
        }
    }

    /// Replace the entry with the same id, or append.
    fn upsert(&mut self, entry: Entry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Every entry, in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entries still waiting.
    pub fn waiting(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_waiting())
    }

    /// Entries being handled.
    pub fn in_progress(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.is_in_progress())
    }

    /// Whether remote mode is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether a change feed is open.
    #[must_use]
    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    /// Name of the active store.
    #[must_use]
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// The notification dispatcher.
    #[must_use]
    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// The notification dispatcher, mutably.
    pub fn notifier_mut(&mut self) -> &mut NotificationDispatcher {
        &mut self.notifier
    }

    /// Find an entry by full id or unique id prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] when nothing matches and
    /// [`Error::AmbiguousId`] when several entries share the prefix.
    pub fn resolve_id(&self, prefix: &str) -> Result<EntryId> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(Error::EmptyInput("id"));
        }

        if let Some(entry) = self.entries.iter().find(|e| e.id.as_str() == prefix) {
            return Ok(entry.id.clone());
        }

        let matches: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| e.id.as_str().starts_with(prefix))
            .collect();

        match matches.as_slice() {
            [] => Err(Error::entry_not_found(prefix)),
            [only] => Ok(only.id.clone()),
            many => Err(Error::AmbiguousId {
                prefix: prefix.to_string(),
                count: many.len(),
            }),
        }
    }
}
