//! Local notifications derived from the daily Panchang.

pub mod listener;
pub mod panchang;
pub mod preferences;
pub mod scheduler;

use thiserror::Error;

use crate::client::storage::StorageError;

pub use listener::RescheduleListener;
pub use panchang::PanchangDay;
pub use preferences::{EventKind, NotificationPreference, NotificationPreferences, PreferenceStore};
pub use scheduler::{
    CachedPanchang, MemoryNotificationPlatform, NotificationPlatform, NotificationScheduler,
    PanchangSource, PendingNotification, Rescheduler,
};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification platform error: {0}")]
    Platform(String),

    #[error("Panchang unavailable: {0}")]
    Source(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
