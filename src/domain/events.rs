//! Events delivered by the mobile platform's notification facility.

use serde::{Deserialize, Serialize};

/// Payload tag carried by the silent notification armed for local midnight.
pub const MIDNIGHT_REFRESH_TAG: &str = "midnight_refresh";

/// Payload tag an operator or the app can send to force a full rebuild.
pub const RESCHEDULE_ALL_TAG: &str = "reschedule_all";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PlatformEvent {
    /// The user tapped a delivered notification or one of its actions.
    ActionPerformed {
        tag: Option<String>,
        action_id: String,
    },
    /// A notification arrived while the app was in the foreground.
    Received { tag: Option<String> },
}

impl PlatformEvent {
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::ActionPerformed { tag, .. } | Self::Received { tag } => tag.as_deref(),
        }
    }

    #[must_use]
    pub fn midnight_refresh() -> Self {
        Self::Received {
            tag: Some(MIDNIGHT_REFRESH_TAG.to_string()),
        }
    }

    /// Whether this event asks for every pending notification to be rebuilt.
    #[must_use]
    pub fn requests_reschedule(&self) -> bool {
        matches!(self.tag(), Some(MIDNIGHT_REFRESH_TAG | RESCHEDULE_ALL_TAG))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reschedule_tags() {
        assert!(PlatformEvent::midnight_refresh().requests_reschedule());
        assert!(
            PlatformEvent::ActionPerformed {
                tag: Some(RESCHEDULE_ALL_TAG.to_string()),
                action_id: "tap".to_string(),
            }
            .requests_reschedule()
        );
        assert!(
            !PlatformEvent::Received {
                tag: Some("rahu_kaal_start".to_string())
            }
            .requests_reschedule()
        );
        assert!(!PlatformEvent::Received { tag: None }.requests_reschedule());
    }
}
