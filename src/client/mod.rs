//! App-side core: local cache, state container, remote sync, notification
//! scheduling and modal navigation. External facilities are traits with
//! in-memory implementations.

pub mod cache;
pub mod navigation;
pub mod notifications;
pub mod storage;
pub mod store;
pub mod sync;

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::Identity;
use cache::ResponseCache;
use storage::KeyValueStore;
use store::{Action, AppStore};
use sync::{ChatSync, DocumentStore, ProfileSync, RemoteData, SyncStatus};

/// Wires the sync layer into the state container.
///
/// Profile and chat snapshots are mirrored into [`AppStore`]; the selected
/// profile in the store drives which chat history is subscribed.
pub struct ClientCore {
    pub store: Arc<AppStore>,
    pub remote: RemoteData,
    pub api_cache: ResponseCache,
    pub astro_cache: ResponseCache,
    identity: watch::Sender<Option<Identity>>,
    profiles: ProfileSync,
    chat: ChatSync,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientCore {
    pub async fn start(
        storage: Arc<dyn KeyValueStore>,
        documents: Arc<dyn DocumentStore>,
        astro_ttl: Duration,
    ) -> Self {
        let store = Arc::new(AppStore::initialize(Arc::clone(&storage)).await);
        let api_cache = ResponseCache::api(Arc::clone(&storage));
        let astro_cache = ResponseCache::astro(storage, astro_ttl);
        let remote = RemoteData::new(
            Arc::clone(&documents),
            vec![api_cache.clone(), astro_cache.clone()],
        );

        let (identity, identity_rx) = watch::channel(None);
        let initial_selection = store.snapshot().session.selected_profile;
        let (selected_tx, selected_rx) = watch::channel(initial_selection);

        let profiles = ProfileSync::spawn(Arc::clone(&documents), identity_rx.clone());
        let chat = ChatSync::spawn(documents, identity_rx, selected_rx);

        let mut tasks = Vec::with_capacity(3);

        let mut state_rx = store.subscribe();
        tasks.push(tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let selected = state_rx.borrow_and_update().session.selected_profile.clone();
                selected_tx.send_if_modified(|current| {
                    if *current == selected {
                        false
                    } else {
                        *current = selected;
                        true
                    }
                });
            }
        }));

        let mut profiles_rx = profiles.subscribe();
        let mut identity_rx = identity.subscribe();
        let profile_store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let mut signed_in = identity_rx.borrow_and_update().is_some();
            loop {
                tokio::select! {
                    changed = identity_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let now = identity_rx.borrow_and_update().is_some();
                        if signed_in && !now {
                            debug!("Signed out, clearing saved profiles");
                            profile_store.dispatch(Action::ReplaceProfiles(Vec::new())).await;
                        }
                        signed_in = now;
                    }
                    changed = profiles_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let (status, items) = {
                            let state = profiles_rx.borrow_and_update();
                            (state.status, state.items.clone())
                        };
                        // Hydrated profiles stay until a live query replaces them.
                        if status != SyncStatus::Subscribed || identity_rx.borrow().is_none() {
                            continue;
                        }
                        debug!(count = items.len(), "Mirroring profiles into store");
                        profile_store.dispatch(Action::ReplaceProfiles(items)).await;
                    }
                }
            }
        }));

        let mut chat_rx = chat.subscribe();
        let chat_store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            while chat_rx.changed().await.is_ok() {
                let items = chat_rx.borrow_and_update().items.clone();
                chat_store.dispatch(Action::SetChatHistory(items)).await;
            }
        }));

        Self {
            store,
            remote,
            api_cache,
            astro_cache,
            identity,
            profiles,
            chat,
            tasks,
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.identity.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.identity.send_replace(None);
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    pub async fn select_profile(&self, profile_id: Option<String>) {
        self.store.dispatch(Action::SelectProfile(profile_id)).await;
    }

    #[must_use]
    pub const fn profiles(&self) -> &ProfileSync {
        &self.profiles
    }

    #[must_use]
    pub const fn chat(&self) -> &ChatSync {
        &self.chat
    }
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
