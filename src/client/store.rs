//! Application state container.
//!
//! State is split into a persisted subset (language and saved profiles,
//! written under [`PERSIST_KEY`]) and a session subset that is rebuilt every
//! run (selection, chat history, chart data). Updates go through the pure
//! [`reduce`] function.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use super::storage::KeyValueStore;
use crate::domain::{ChartProfile, ChatMessage};

pub const PERSIST_KEY: &str = "futurebot-storage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub language: String,
    pub saved_profiles: Vec<ChartProfile>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            saved_profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub selected_profile: Option<String>,
    pub chat_history: Vec<ChatMessage>,
    pub chart_data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    pub persisted: PersistedState,
    pub session: SessionState,
}

#[derive(Debug, Clone)]
pub enum Action {
    SetLanguage(String),
    /// Inserts the profile, or replaces the one with the same id.
    SaveProfile(ChartProfile),
    RemoveProfile(String),
    /// Mirrors the remote profile list wholesale.
    ReplaceProfiles(Vec<ChartProfile>),
    SelectProfile(Option<String>),
    SetChatHistory(Vec<ChatMessage>),
    PushChatMessage(ChatMessage),
    SetChartData {
        key: String,
        data: serde_json::Value,
    },
    Reset,
}

#[must_use]
pub fn reduce(state: &ClientState, action: Action) -> ClientState {
    let mut next = state.clone();

    match action {
        Action::SetLanguage(language) => next.persisted.language = language,
        Action::SaveProfile(profile) => {
            let profiles = &mut next.persisted.saved_profiles;
            if let Some(existing) = profiles.iter_mut().find(|p| p.id == profile.id) {
                *existing = profile;
            } else {
                profiles.insert(0, profile);
            }
        }
        Action::RemoveProfile(id) => {
            next.persisted.saved_profiles.retain(|p| p.id != id);
            if next.session.selected_profile.as_deref() == Some(id.as_str()) {
                next.session.selected_profile = None;
                next.session.chat_history.clear();
            }
            next.session.chart_data.retain(|key, _| !key.contains(&id));
        }
        Action::ReplaceProfiles(profiles) => next.persisted.saved_profiles = profiles,
        Action::SelectProfile(id) => {
            if next.session.selected_profile != id {
                next.session.chat_history.clear();
            }
            next.session.selected_profile = id;
        }
        Action::SetChatHistory(messages) => next.session.chat_history = messages,
        Action::PushChatMessage(message) => next.session.chat_history.push(message),
        Action::SetChartData { key, data } => {
            next.session.chart_data.insert(key, data);
        }
        Action::Reset => next = ClientState::default(),
    }

    next
}

pub struct AppStore {
    state: watch::Sender<ClientState>,
    storage: Arc<dyn KeyValueStore>,
}

impl AppStore {
    /// Hydrates the persisted subset. Missing or unreadable records start
    /// from defaults.
    pub async fn initialize(storage: Arc<dyn KeyValueStore>) -> Self {
        let persisted = match storage.get(PERSIST_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Persisted state is corrupt, starting fresh");
                PersistedState::default()
            }),
            Ok(None) => PersistedState::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted state");
                PersistedState::default()
            }
        };

        let (state, _) = watch::channel(ClientState {
            persisted,
            session: SessionState::default(),
        });

        Self { state, storage }
    }

    #[must_use]
    pub fn snapshot(&self) -> ClientState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    pub async fn dispatch(&self, action: Action) {
        let mut persisted = None;
        self.state.send_modify(|state| {
            let next = reduce(state, action);
            if next.persisted != state.persisted {
                persisted = Some(next.persisted.clone());
            }
            *state = next;
        });

        if let Some(persisted) = persisted {
            self.persist(&persisted).await;
        }
    }

    async fn persist(&self, persisted: &PersistedState) {
        let raw = match serde_json::to_string(persisted) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize persisted state");
                return;
            }
        };

        if let Err(e) = self.storage.set(PERSIST_KEY, &raw).await {
            warn!(error = %e, "Failed to persist state");
        }
    }
}
