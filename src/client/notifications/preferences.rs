use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::client::storage::{KeyValueStore, StorageError};

pub const PREFERENCES_KEY: &str = "notification-preferences";

/// Every alert the app can arm. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RahuKaalStart,
    RahuKaalEnd,
    AbhijeetMuhurat,
    GoodChaughadiya,
    BadChaughadiya,
    DailyTithi,
    DailyNakshatra,
    DailyYoga,
    Ekadashi,
    Purnima,
    Amavasya,
    HoraChange,
    BhadraWarning,
    PanchakWarning,
    DishaShool,
}

impl EventKind {
    pub const ALL: [Self; 15] = [
        Self::RahuKaalStart,
        Self::RahuKaalEnd,
        Self::AbhijeetMuhurat,
        Self::GoodChaughadiya,
        Self::BadChaughadiya,
        Self::DailyTithi,
        Self::DailyNakshatra,
        Self::DailyYoga,
        Self::Ekadashi,
        Self::Purnima,
        Self::Amavasya,
        Self::HoraChange,
        Self::BhadraWarning,
        Self::PanchakWarning,
        Self::DishaShool,
    ];

    /// Payload tag attached to the delivered notification.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::RahuKaalStart => "rahu_kaal_start",
            Self::RahuKaalEnd => "rahu_kaal_end",
            Self::AbhijeetMuhurat => "abhijeet_muhurat",
            Self::GoodChaughadiya => "good_chaughadiya",
            Self::BadChaughadiya => "bad_chaughadiya",
            Self::DailyTithi => "daily_tithi",
            Self::DailyNakshatra => "daily_nakshatra",
            Self::DailyYoga => "daily_yoga",
            Self::Ekadashi => "ekadashi",
            Self::Purnima => "purnima",
            Self::Amavasya => "amavasya",
            Self::HoraChange => "hora_change",
            Self::BhadraWarning => "bhadra_warning",
            Self::PanchakWarning => "panchak_warning",
            Self::DishaShool => "disha_shool",
        }
    }

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::RahuKaalStart => "Rahu Kaal begins",
            Self::RahuKaalEnd => "Rahu Kaal has ended",
            Self::AbhijeetMuhurat => "Abhijeet Muhurat",
            Self::GoodChaughadiya => "Auspicious Chaughadiya",
            Self::BadChaughadiya => "Inauspicious Chaughadiya",
            Self::DailyTithi => "Today's Tithi",
            Self::DailyNakshatra => "Today's Nakshatra",
            Self::DailyYoga => "Today's Yoga",
            Self::Ekadashi => "Ekadashi today",
            Self::Purnima => "Purnima today",
            Self::Amavasya => "Amavasya today",
            Self::HoraChange => "Hora change",
            Self::BhadraWarning => "Bhadra warning",
            Self::PanchakWarning => "Panchak warning",
            Self::DishaShool => "Disha Shool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub enabled: bool,
    /// Minutes relative to the event; negative fires before it.
    pub offset_minutes: i32,
    pub sound: String,
}

impl NotificationPreference {
    #[must_use]
    pub fn enabled(offset_minutes: i32) -> Self {
        Self {
            enabled: true,
            offset_minutes,
            sound: "default".to_string(),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            offset_minutes: 0,
            sound: "default".to_string(),
        }
    }

    /// Offset and sound, only when the alert is on.
    #[must_use]
    pub fn active(&self) -> Option<(i32, &str)> {
        self.enabled
            .then_some((self.offset_minutes, self.sound.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPreferences(BTreeMap<EventKind, NotificationPreference>);

impl Default for NotificationPreferences {
    fn default() -> Self {
        let map = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let pref = match kind {
                    EventKind::RahuKaalStart => NotificationPreference::enabled(-10),
                    EventKind::AbhijeetMuhurat => NotificationPreference::enabled(-5),
                    EventKind::DailyTithi | EventKind::Ekadashi => {
                        NotificationPreference::enabled(0)
                    }
                    _ => NotificationPreference::disabled(),
                };
                (kind, pref)
            })
            .collect();
        Self(map)
    }
}

impl NotificationPreferences {
    /// Kinds missing from a stored record count as disabled.
    #[must_use]
    pub fn enabled_for(&self, kind: EventKind) -> Option<&NotificationPreference> {
        self.0.get(&kind).filter(|p| p.enabled)
    }

    pub fn set(&mut self, kind: EventKind, preference: NotificationPreference) {
        self.0.insert(kind, preference);
    }

    pub fn enabled_kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.0
            .iter()
            .filter(|(_, pref)| pref.enabled)
            .map(|(kind, _)| *kind)
    }
}

/// Reads and writes preferences in local storage.
#[derive(Clone)]
pub struct PreferenceStore {
    storage: Arc<dyn KeyValueStore>,
}

impl PreferenceStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub async fn load(&self) -> NotificationPreferences {
        match self.storage.get(PREFERENCES_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Stored notification preferences are corrupt, using defaults");
                NotificationPreferences::default()
            }),
            Ok(None) => NotificationPreferences::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read notification preferences");
                NotificationPreferences::default()
            }
        }
    }

    pub async fn save(&self, preferences: &NotificationPreferences) -> Result<(), StorageError> {
        let raw = serde_json::to_string(preferences)?;
        self.storage.set(PREFERENCES_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    #[test]
    fn disabled_preference_has_no_offset() {
        let pref = NotificationPreference {
            enabled: false,
            offset_minutes: -30,
            sound: "bell".to_string(),
        };
        assert_eq!(pref.active(), None);
        assert_eq!(NotificationPreference::enabled(-5).active(), Some((-5, "default")));
    }

    #[tokio::test]
    async fn save_and_load_round_trip_through_storage() {
        let store = PreferenceStore::new(Arc::new(MemoryStorage::new()));
        let mut prefs = store.load().await;
        assert_eq!(prefs, NotificationPreferences::default());

        prefs.set(EventKind::HoraChange, NotificationPreference::enabled(0));
        store.save(&prefs).await.unwrap();

        let loaded = store.load().await;
        assert!(loaded.enabled_for(EventKind::HoraChange).is_some());
        assert!(loaded.enabled_for(EventKind::BhadraWarning).is_none());
    }

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<_> = EventKind::ALL.iter().map(|k| k.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), EventKind::ALL.len());
    }
}
