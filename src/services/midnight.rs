//! Wakes the notification rescheduler at local midnight.
//!
//! On a phone the OS delivers the silent `midnight_refresh` notification.
//! The gateway has no OS facility, so a cron job publishes the same event
//! on the bus and the [`RescheduleListener`] reacts to it either way.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::client::notifications::{RescheduleListener, Rescheduler};
use crate::config::NotificationConfig;
use crate::domain::PlatformEvent;

pub struct MidnightRefresh {
    config: NotificationConfig,
    event_bus: broadcast::Sender<PlatformEvent>,
    rescheduler: Arc<dyn Rescheduler>,
    scheduler: RwLock<Option<JobScheduler>>,
    listener: RwLock<Option<JoinHandle<()>>>,
}

impl MidnightRefresh {
    pub fn new(
        config: NotificationConfig,
        event_bus: broadcast::Sender<PlatformEvent>,
        rescheduler: Arc<dyn Rescheduler>,
    ) -> Self {
        Self {
            config,
            event_bus,
            rescheduler,
            scheduler: RwLock::new(None),
            listener: RwLock::new(None),
        }
    }

    /// Arms the listener, runs a first reschedule, then starts the cron job.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Notification refresh is disabled in config");
            return Ok(());
        }

        let listener = RescheduleListener::new(Arc::clone(&self.rescheduler));
        *self.listener.write().await = Some(listener.spawn(self.event_bus.subscribe()));

        match self.rescheduler.reschedule_all().await {
            Ok(count) => info!(count, "Initial notification schedule built"),
            Err(e) => warn!(error = %e, "Initial notification schedule failed"),
        }

        let sched = JobScheduler::new().await?;
        let event_bus = self.event_bus.clone();
        let job = Job::new_async(self.config.midnight_cron.as_str(), move |_uuid, _lock| {
            let event_bus = event_bus.clone();
            Box::pin(async move {
                info!(
                    event = "job_started",
                    job_name = "midnight_refresh",
                    "Publishing midnight refresh"
                );
                if let Err(e) = event_bus.send(PlatformEvent::midnight_refresh()) {
                    error!(
                        event = "job_failed",
                        job_name = "midnight_refresh",
                        error = %e,
                        "No listener for midnight refresh"
                    );
                }
            })
        })?;

        sched.add(job).await?;
        sched.start().await?;
        *self.scheduler.write().await = Some(sched);

        info!("Midnight refresh scheduled: {}", self.config.midnight_cron);
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping midnight refresh...");
        if let Some(mut sched) = self.scheduler.write().await.take()
            && let Err(e) = sched.shutdown().await
        {
            warn!(error = %e, "Cron scheduler shutdown failed");
        }
        if let Some(listener) = self.listener.write().await.take() {
            listener.abort();
        }
    }
}
