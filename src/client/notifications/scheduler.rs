//! Rebuilds the platform's pending notification set from the Panchang.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use super::NotificationError;
use super::panchang::PanchangDay;
use super::preferences::PreferenceStore;
use crate::client::cache::{Clock, ResponseCache};
use crate::domain::events::MIDNIGHT_REFRESH_TAG;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub at: DateTime<Utc>,
    /// `None` delivers silently.
    pub sound: Option<String>,
    pub tag: String,
}

/// The OS local-notification facility.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    async fn pending(&self) -> Result<Vec<PendingNotification>, NotificationError>;

    async fn cancel_all(&self) -> Result<(), NotificationError>;

    async fn schedule(
        &self,
        notifications: Vec<PendingNotification>,
    ) -> Result<(), NotificationError>;
}

#[async_trait]
pub trait PanchangSource: Send + Sync {
    async fn panchang(
        &self,
        date: NaiveDate,
        lat: f64,
        lon: f64,
    ) -> Result<PanchangDay, NotificationError>;
}

/// Anything that can rebuild every pending notification.
#[async_trait]
pub trait Rescheduler: Send + Sync {
    /// Returns how many notifications are now pending.
    async fn reschedule_all(&self) -> Result<usize, NotificationError>;
}

/// Serves Panchang days through the astro cache.
pub struct CachedPanchang<S> {
    source: S,
    cache: ResponseCache,
}

impl<S: PanchangSource> CachedPanchang<S> {
    pub const fn new(source: S, cache: ResponseCache) -> Self {
        Self { source, cache }
    }
}

#[async_trait]
impl<S: PanchangSource> PanchangSource for CachedPanchang<S> {
    async fn panchang(
        &self,
        date: NaiveDate,
        lat: f64,
        lon: f64,
    ) -> Result<PanchangDay, NotificationError> {
        let params = serde_json::json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "lat": lat,
            "lon": lon,
        });
        self.cache
            .get_or_fetch("panchang", &params, || self.source.panchang(date, lat, lon))
            .await
    }
}

pub struct NotificationScheduler {
    platform: Arc<dyn NotificationPlatform>,
    source: Arc<dyn PanchangSource>,
    preferences: PreferenceStore,
    clock: Arc<dyn Clock>,
    utc_offset: FixedOffset,
    lat: f64,
    lon: f64,
}

impl NotificationScheduler {
    pub fn new(
        platform: Arc<dyn NotificationPlatform>,
        source: Arc<dyn PanchangSource>,
        preferences: PreferenceStore,
        clock: Arc<dyn Clock>,
        utc_offset: FixedOffset,
        (lat, lon): (f64, f64),
    ) -> Self {
        Self {
            platform,
            source,
            preferences,
            clock,
            utc_offset,
            lat,
            lon,
        }
    }

    /// The first local midnight strictly after `now`.
    fn next_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_today = now.with_timezone(&self.utc_offset).date_naive();
        let tomorrow = local_today + Duration::days(1);
        let midnight_local = tomorrow.and_time(NaiveTime::MIN);
        (midnight_local - self.utc_offset).and_utc()
    }

    async fn build(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PendingNotification>, NotificationError> {
        let preferences = self.preferences.load().await;
        let today = now.with_timezone(&self.utc_offset).date_naive();

        let mut days = Vec::with_capacity(2);
        for date in [today, today + Duration::days(1)] {
            days.push(self.source.panchang(date, self.lat, self.lon).await?);
        }

        let mut notifications = Vec::new();
        let mut next_id = 1;

        for event in days.iter().flat_map(PanchangDay::events) {
            let Some((offset, sound)) = preferences
                .enabled_for(event.kind)
                .and_then(|pref| pref.active())
            else {
                continue;
            };

            let at = event.at + Duration::minutes(i64::from(offset));
            if at <= now {
                continue;
            }

            notifications.push(PendingNotification {
                id: next_id,
                title: event.kind.title().to_string(),
                body: event.detail,
                at,
                sound: Some(sound.to_string()),
                tag: event.kind.tag().to_string(),
            });
            next_id += 1;
        }

        notifications.sort_by_key(|n| n.at);

        notifications.push(PendingNotification {
            id: next_id,
            title: String::new(),
            body: String::new(),
            at: self.next_midnight(now),
            sound: None,
            tag: MIDNIGHT_REFRESH_TAG.to_string(),
        });

        Ok(notifications)
    }
}

#[async_trait]
impl Rescheduler for NotificationScheduler {
    async fn reschedule_all(&self) -> Result<usize, NotificationError> {
        let now = self.clock.now();

        // Build first so a failed fetch leaves the current set untouched.
        let notifications = self.build(now).await?;
        let count = notifications.len();
        debug!(count, "Built notification schedule");

        self.platform.cancel_all().await?;
        self.platform.schedule(notifications).await?;

        info!(count, "Local notifications rescheduled");
        Ok(count)
    }
}

/// Pending notifications held in memory.
#[derive(Default)]
pub struct MemoryNotificationPlatform {
    pending: Mutex<Vec<PendingNotification>>,
}

impl MemoryNotificationPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationPlatform for MemoryNotificationPlatform {
    async fn pending(&self) -> Result<Vec<PendingNotification>, NotificationError> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn cancel_all(&self) -> Result<(), NotificationError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn schedule(
        &self,
        notifications: Vec<PendingNotification>,
    ) -> Result<(), NotificationError> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(notifications);
        Ok(())
    }
}
