use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::scheduler::Rescheduler;
use crate::domain::PlatformEvent;

/// Rebuilds the schedule when the midnight refresh (or an explicit
/// reschedule request) is delivered.
#[derive(Clone)]
pub struct RescheduleListener {
    rescheduler: Arc<dyn Rescheduler>,
}

impl RescheduleListener {
    pub fn new(rescheduler: Arc<dyn Rescheduler>) -> Self {
        Self { rescheduler }
    }

    /// Returns whether the event triggered a reschedule.
    pub async fn handle(&self, event: &PlatformEvent) -> bool {
        if !event.requests_reschedule() {
            return false;
        }

        info!(tag = ?event.tag(), "Reschedule requested");
        if let Err(e) = self.rescheduler.reschedule_all().await {
            error!(error = %e, "Failed to reschedule notifications");
        }
        true
    }

    pub fn spawn(self, mut events: broadcast::Receiver<PlatformEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.handle(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification listener lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
