//! Mirrors remote profile and chat collections into local state.
//!
//! Each [`CollectionSync`] owns at most one live [`Subscription`]. Whenever
//! its key changes (signed-in identity, selected profile) the old
//! subscription is cancelled, the local list is cleared, and a new query is
//! opened. Every snapshot replaces the whole list. Subscriptions carry an
//! epoch; a snapshot from an older epoch is dropped.

pub mod document;

use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::cache::ResponseCache;
use crate::domain::{ChartProfile, ChatMessage, Identity};
pub use document::{
    CollectionQuery, Direction, Document, DocumentStore, ListenerRegistration,
    MemoryDocumentStore, SnapshotStream,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Document store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A type mirrored from a remote collection, with the order the local list
/// must present.
pub trait Synced: DeserializeOwned + Clone + Send + Sync + 'static {
    fn order(a: &Self, b: &Self) -> Ordering;
}

impl Synced for ChartProfile {
    /// Newest first.
    fn order(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }
}

impl Synced for ChatMessage {
    fn order(a: &Self, b: &Self) -> Ordering {
        a.timestamp.cmp(&b.timestamp)
    }
}

#[must_use]
pub fn profiles_path(identity: &Identity) -> String {
    format!("users/{}/profiles", identity.uid)
}

#[must_use]
pub fn messages_path(identity: &Identity, profile_id: &str) -> String {
    format!("users/{}/profiles/{profile_id}/messages", identity.uid)
}

#[must_use]
pub fn profiles_query(identity: &Identity) -> CollectionQuery {
    CollectionQuery::new(profiles_path(identity), "created_at", Direction::Descending)
}

#[must_use]
pub fn messages_query(identity: &Identity, profile_id: &str) -> CollectionQuery {
    CollectionQuery::new(
        messages_path(identity, profile_id),
        "timestamp",
        Direction::Ascending,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

#[derive(Debug, Clone)]
pub struct SyncState<T> {
    pub status: SyncStatus,
    pub items: Vec<T>,
    pub epoch: u64,
}

impl<T> Default for SyncState<T> {
    fn default() -> Self {
        Self {
            status: SyncStatus::Unsubscribed,
            items: Vec::new(),
            epoch: 0,
        }
    }
}

/// A live query plus the handles needed to stop it.
pub struct Subscription {
    epoch: u64,
    registration: ListenerRegistration,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn cancel(self) {
        self.forwarder.abort();
        self.registration.cancel();
    }
}

struct Shared<T> {
    state: watch::Sender<SyncState<T>>,
    epoch: AtomicU64,
}

impl<T: Synced> Shared<T> {
    fn apply(&self, epoch: u64, docs: Vec<Document>) {
        if epoch != self.epoch.load(AtomicOrdering::SeqCst) {
            debug!(epoch, "Dropping snapshot from superseded subscription");
            return;
        }

        let mut items: Vec<T> = docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc.data) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "Skipping malformed document");
                    None
                }
            })
            .collect();
        items.sort_by(T::order);

        self.state.send_modify(|state| {
            if state.epoch == epoch {
                state.items = items;
            }
        });
    }
}

pub struct CollectionSync<T> {
    store: Arc<dyn DocumentStore>,
    shared: Arc<Shared<T>>,
    current: Mutex<Option<Subscription>>,
}

impl<T: Synced> CollectionSync<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            store,
            shared: Arc::new(Shared {
                state,
                epoch: AtomicU64::new(0),
            }),
            current: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState<T>> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.shared.state.borrow().items.clone()
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.shared.state.borrow().status
    }

    /// Tears down the current subscription and, when `query` is set, opens
    /// a new one.
    pub async fn rebind(&self, query: Option<CollectionQuery>) -> Result<(), SyncError> {
        let mut current = self.current.lock().await;
        if let Some(subscription) = current.take() {
            subscription.cancel();
        }

        let epoch = self.shared.epoch.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let status = if query.is_some() {
            SyncStatus::Subscribing
        } else {
            SyncStatus::Unsubscribed
        };
        self.shared.state.send_modify(|state| {
            state.status = status;
            state.items.clear();
            state.epoch = epoch;
        });

        let Some(query) = query else {
            return Ok(());
        };

        let path = query.path.clone();
        let SnapshotStream {
            mut snapshots,
            registration,
        } = match self.store.listen(query).await {
            Ok(stream) => stream,
            Err(e) => {
                self.shared
                    .state
                    .send_modify(|state| state.status = SyncStatus::Unsubscribed);
                return Err(e);
            }
        };

        let shared = Arc::clone(&self.shared);
        let forwarder = tokio::spawn(async move {
            while let Some(docs) = snapshots.recv().await {
                shared.apply(epoch, docs);
            }
        });

        self.shared.state.send_modify(|state| {
            if state.epoch == epoch {
                state.status = SyncStatus::Subscribed;
            }
        });
        info!(path = %path, epoch, "Subscribed to collection");

        *current = Some(Subscription {
            epoch,
            registration,
            forwarder,
        });
        Ok(())
    }
}

/// Keeps the signed-in user's profile list in sync.
pub struct ProfileSync {
    sync: Arc<CollectionSync<ChartProfile>>,
    driver: JoinHandle<()>,
}

impl ProfileSync {
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        mut identity: watch::Receiver<Option<Identity>>,
    ) -> Self {
        let sync = Arc::new(CollectionSync::new(store));

        let driver_sync = Arc::clone(&sync);
        let driver = tokio::spawn(async move {
            loop {
                let query = identity.borrow_and_update().as_ref().map(profiles_query);
                if let Err(e) = driver_sync.rebind(query).await {
                    warn!(error = %e, "Failed to subscribe to profiles");
                }
                if identity.changed().await.is_err() {
                    break;
                }
            }
            let _ = driver_sync.rebind(None).await;
        });

        Self { sync, driver }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState<ChartProfile>> {
        self.sync.subscribe()
    }

    #[must_use]
    pub fn profiles(&self) -> Vec<ChartProfile> {
        self.sync.items()
    }
}

impl Drop for ProfileSync {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Keeps the chat history of the selected profile in sync.
pub struct ChatSync {
    sync: Arc<CollectionSync<ChatMessage>>,
    driver: JoinHandle<()>,
}

impl ChatSync {
    pub fn spawn(
        store: Arc<dyn DocumentStore>,
        mut identity: watch::Receiver<Option<Identity>>,
        mut selected: watch::Receiver<Option<String>>,
    ) -> Self {
        let sync = Arc::new(CollectionSync::new(store));

        let driver_sync = Arc::clone(&sync);
        let driver = tokio::spawn(async move {
            loop {
                let query = {
                    let identity = identity.borrow_and_update();
                    let selected = selected.borrow_and_update();
                    match (identity.as_ref(), selected.as_deref()) {
                        (Some(identity), Some(profile_id)) => {
                            Some(messages_query(identity, profile_id))
                        }
                        _ => None,
                    }
                };
                if let Err(e) = driver_sync.rebind(query).await {
                    warn!(error = %e, "Failed to subscribe to chat history");
                }

                let closed = tokio::select! {
                    r = identity.changed() => r.is_err(),
                    r = selected.changed() => r.is_err(),
                };
                if closed {
                    break;
                }
            }
            let _ = driver_sync.rebind(None).await;
        });

        Self { sync, driver }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState<ChatMessage>> {
        self.sync.subscribe()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.sync.items()
    }
}

impl Drop for ChatSync {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Writes to the remote collections. Listeners pick the changes up.
#[derive(Clone)]
pub struct RemoteData {
    store: Arc<dyn DocumentStore>,
    caches: Vec<ResponseCache>,
}

impl RemoteData {
    pub fn new(store: Arc<dyn DocumentStore>, caches: Vec<ResponseCache>) -> Self {
        Self { store, caches }
    }

    pub async fn save_profile(
        &self,
        identity: &Identity,
        profile: &ChartProfile,
    ) -> Result<(), SyncError> {
        let data = serde_json::to_value(profile)?;
        self.store
            .set(&profiles_path(identity), &profile.id, data)
            .await
    }

    /// Removes the remote record and any cached computation for it.
    pub async fn delete_profile(
        &self,
        identity: &Identity,
        profile_id: &str,
    ) -> Result<(), SyncError> {
        self.store
            .delete(&profiles_path(identity), profile_id)
            .await?;
        for cache in &self.caches {
            cache.invalidate_profile(profile_id).await;
        }
        Ok(())
    }

    pub async fn append_message(
        &self,
        identity: &Identity,
        profile_id: &str,
        message: &ChatMessage,
    ) -> Result<(), SyncError> {
        let data = serde_json::to_value(message)?;
        self.store
            .set(&messages_path(identity, profile_id), &message.id, data)
            .await
    }

    pub async fn clear_history(
        &self,
        identity: &Identity,
        profile_id: &str,
    ) -> Result<(), SyncError> {
        self.store
            .delete_all(&messages_path(identity, profile_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;
    use crate::domain::{BirthLocation, ChatRole};
    use chrono::{Duration, Utc};
    use std::time::Duration as StdDuration;

    fn profile(id: &str, age_minutes: i64) -> ChartProfile {
        ChartProfile {
            id: id.to_string(),
            name: format!("Profile {id}"),
            birth_date: "1990-01-01".to_string(),
            birth_time: "12:00".to_string(),
            location: BirthLocation {
                lat: 19.076,
                lon: 72.8777,
                place: "Mumbai".to_string(),
            },
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    async fn wait_until<T: Clone>(
        rx: &mut watch::Receiver<SyncState<T>>,
        cond: impl FnMut(&SyncState<T>) -> bool,
    ) -> SyncState<T> {
        tokio::time::timeout(StdDuration::from_secs(2), rx.wait_for(cond))
            .await
            .expect("sync did not settle")
            .expect("sync closed")
            .clone()
    }

    #[tokio::test]
    async fn profiles_follow_identity() {
        let store = Arc::new(MemoryDocumentStore::new());
        let remote = RemoteData::new(store.clone(), vec![]);
        let alice = Identity::new("alice");

        remote.save_profile(&alice, &profile("old", 60)).await.unwrap();
        remote.save_profile(&alice, &profile("new", 1)).await.unwrap();

        let (identity_tx, identity_rx) = watch::channel(None);
        let sync = ProfileSync::spawn(store.clone(), identity_rx);
        let mut rx = sync.subscribe();

        identity_tx.send_replace(Some(alice.clone()));
        let state = wait_until(&mut rx, |s| s.items.len() == 2).await;
        let ids: Vec<_> = state.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(state.status, SyncStatus::Subscribed);

        identity_tx.send_replace(None);
        let state = wait_until(&mut rx, |s| s.status == SyncStatus::Unsubscribed).await;
        assert!(state.items.is_empty());
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn chat_history_is_ascending_and_replaced_on_clear() {
        let store = Arc::new(MemoryDocumentStore::new());
        let remote = RemoteData::new(store.clone(), vec![]);
        let alice = Identity::new("alice");

        let mut first = ChatMessage::new(ChatRole::User, "When will I get a job?");
        first.timestamp = Utc::now() - Duration::seconds(10);
        let second = ChatMessage::new(ChatRole::Assistant, "Jupiter favours you.");
        remote.append_message(&alice, "p1", &second).await.unwrap();
        remote.append_message(&alice, "p1", &first).await.unwrap();

        let (_identity_tx, identity_rx) = watch::channel(Some(alice.clone()));
        let (selected_tx, selected_rx) = watch::channel(None);
        let sync = ChatSync::spawn(store.clone(), identity_rx, selected_rx);
        let mut rx = sync.subscribe();

        selected_tx.send_replace(Some("p1".to_string()));
        let state = wait_until(&mut rx, |s| s.items.len() == 2).await;
        assert_eq!(state.items[0].content, "When will I get a job?");

        remote.clear_history(&alice, "p1").await.unwrap();
        let state = wait_until(&mut rx, |s| s.items.is_empty()).await;
        assert_eq!(state.status, SyncStatus::Subscribed);
    }

    #[tokio::test]
    async fn duplicate_snapshot_is_idempotent() {
        let store = Arc::new(MemoryDocumentStore::new());
        let remote = RemoteData::new(store.clone(), vec![]);
        let alice = Identity::new("alice");
        remote.save_profile(&alice, &profile("a", 5)).await.unwrap();

        let sync: CollectionSync<ChartProfile> = CollectionSync::new(store.clone());
        let mut rx = sync.subscribe();
        sync.rebind(Some(profiles_query(&alice))).await.unwrap();
        let once = wait_until(&mut rx, |s| s.items.len() == 1).await;

        store.redeliver(&profiles_path(&alice));
        store.redeliver(&profiles_path(&alice));
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(sync.items(), once.items);
    }

    #[tokio::test]
    async fn stale_epoch_snapshot_is_dropped() {
        let store = Arc::new(MemoryDocumentStore::new());
        let alice = Identity::new("alice");
        let sync: CollectionSync<ChartProfile> = CollectionSync::new(store.clone());

        sync.rebind(Some(profiles_query(&alice))).await.unwrap();
        let stale_epoch = sync.subscribe().borrow().epoch;
        sync.rebind(Some(profiles_query(&Identity::new("bob"))))
            .await
            .unwrap();

        let doc = Document {
            id: "a".to_string(),
            data: serde_json::to_value(profile("a", 1)).unwrap(),
        };
        sync.shared.apply(stale_epoch, vec![doc]);

        assert!(sync.items().is_empty());
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn delete_profile_invalidates_cache() {
        let store = Arc::new(MemoryDocumentStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let cache = ResponseCache::api(storage.clone());
        let remote = RemoteData::new(store.clone(), vec![cache.clone()]);
        let alice = Identity::new("alice");

        remote.save_profile(&alice, &profile("p-9", 1)).await.unwrap();
        cache
            .set_for("chart", &serde_json::json!({"profile": "p-9"}), &1)
            .await;

        remote.delete_profile(&alice, "p-9").await.unwrap();

        assert!(storage.is_empty().await);
        let mut stream = store.listen(profiles_query(&alice)).await.unwrap();
        assert!(stream.snapshots.recv().await.unwrap().is_empty());
    }
}
