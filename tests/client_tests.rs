use chrono::{Duration, Utc};
use futurebot::client::ClientCore;
use futurebot::client::storage::{KeyValueStore, MemoryStorage};
use futurebot::client::store::{AppStore, ClientState};
use futurebot::client::sync::MemoryDocumentStore;
use futurebot::domain::{BirthLocation, ChartProfile, ChatMessage, ChatRole, Identity};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

fn profile(id: &str, age_minutes: i64) -> ChartProfile {
    ChartProfile {
        id: id.to_string(),
        name: format!("Profile {id}"),
        birth_date: "1992-08-14".to_string(),
        birth_time: "05:45".to_string(),
        location: BirthLocation {
            lat: 28.6139,
            lon: 77.2090,
            place: "New Delhi".to_string(),
        },
        created_at: Utc::now() - Duration::minutes(age_minutes),
    }
}

async fn wait_for_state(store: &AppStore, cond: impl FnMut(&ClientState) -> bool) -> ClientState {
    let mut rx = store.subscribe();
    tokio::time::timeout(StdDuration::from_secs(2), rx.wait_for(cond))
        .await
        .expect("state did not settle")
        .expect("store closed")
        .clone()
}

#[tokio::test]
async fn test_profiles_mirrored_and_persisted() {
    let storage = Arc::new(MemoryStorage::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let core = ClientCore::start(storage.clone(), documents, Duration::hours(6)).await;
    let alice = Identity::new("alice");

    core.remote.save_profile(&alice, &profile("older", 30)).await.unwrap();
    core.remote.save_profile(&alice, &profile("newer", 1)).await.unwrap();

    core.sign_in(alice);
    let state = wait_for_state(&core.store, |s| s.persisted.saved_profiles.len() == 2).await;
    assert_eq!(state.persisted.saved_profiles[0].id, "newer");

    // The persisted subset lands in storage under the fixed key.
    let raw = storage.get("futurebot-storage").await.unwrap().unwrap();
    assert!(raw.contains("\"savedProfiles\""));

    core.sign_out();
    wait_for_state(&core.store, |s| s.persisted.saved_profiles.is_empty()).await;
}

#[tokio::test]
async fn test_selected_profile_drives_chat() {
    let storage = Arc::new(MemoryStorage::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let core = ClientCore::start(storage, documents, Duration::hours(6)).await;
    let alice = Identity::new("alice");

    let question = ChatMessage::new(ChatRole::User, "Is this a good year to change jobs?");
    core.remote.append_message(&alice, "p1", &question).await.unwrap();

    core.sign_in(alice.clone());
    core.select_profile(Some("p1".to_string())).await;

    let state = wait_for_state(&core.store, |s| s.session.chat_history.len() == 1).await;
    assert_eq!(state.session.chat_history[0].content, question.content);

    let answer = ChatMessage::new(ChatRole::Assistant, "Jupiter transits your tenth house.");
    core.remote.append_message(&alice, "p1", &answer).await.unwrap();
    let state = wait_for_state(&core.store, |s| s.session.chat_history.len() == 2).await;
    assert_eq!(state.session.chat_history[1].role, ChatRole::Assistant);

    core.select_profile(None).await;
    wait_for_state(&core.store, |s| s.session.chat_history.is_empty()).await;
}

#[tokio::test]
async fn test_delete_profile_drops_cached_results() {
    let storage = Arc::new(MemoryStorage::new());
    let documents = Arc::new(MemoryDocumentStore::new());
    let core = ClientCore::start(storage.clone(), documents, Duration::hours(6)).await;
    let alice = Identity::new("alice");

    core.remote.save_profile(&alice, &profile("p-7", 1)).await.unwrap();
    core.api_cache
        .set_for("birth_chart", &json!({"profile": "p-7"}), &json!({"asc": "Leo"}))
        .await;
    core.astro_cache
        .set_for("transits", &json!({"profile": "p-7"}), &json!({"moon": "Taurus"}))
        .await;
    core.api_cache
        .set_for("birth_chart", &json!({"profile": "p-8"}), &json!({"asc": "Virgo"}))
        .await;

    core.remote.delete_profile(&alice, "p-7").await.unwrap();

    let keys = storage.keys().await.unwrap();
    assert!(keys.iter().all(|k| !k.contains("p-7")));
    assert!(keys.iter().any(|k| k.contains("p-8")));
}

#[tokio::test]
async fn test_hydrated_profiles_survive_startup() {
    let storage = Arc::new(MemoryStorage::new());
    let persisted = json!({"language": "hi", "savedProfiles": [profile("p-1", 5)]});
    storage
        .set("futurebot-storage", &persisted.to_string())
        .await
        .unwrap();

    let documents = Arc::new(MemoryDocumentStore::new());
    let core = ClientCore::start(storage.clone(), documents, Duration::hours(6)).await;
    assert_eq!(core.store.snapshot().persisted.saved_profiles.len(), 1);

    tokio::time::sleep(StdDuration::from_millis(200)).await;

    let state = core.store.snapshot();
    assert_eq!(state.persisted.language, "hi");
    assert_eq!(state.persisted.saved_profiles.len(), 1);
    assert_eq!(state.persisted.saved_profiles[0].id, "p-1");

    let raw = storage.get("futurebot-storage").await.unwrap().unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored["savedProfiles"][0]["id"], "p-1");
}
