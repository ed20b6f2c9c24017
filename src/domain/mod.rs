//! Domain types shared by the gateway and the client core.

pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use events::PlatformEvent;

/// The signed-in user, as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthLocation {
    pub lat: f64,
    pub lon: f64,
    pub place: String,
}

/// A saved birth chart. Edits replace the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartProfile {
    pub id: String,
    pub name: String,
    /// `YYYY-MM-DD`
    pub birth_date: String,
    /// `HH:MM`, local to the birth place
    pub birth_time: String,
    pub location: BirthLocation,
    pub created_at: DateTime<Utc>,
}

impl ChartProfile {
    /// The request body every computation endpoint accepts at minimum.
    #[must_use]
    pub fn chart_request(&self) -> serde_json::Value {
        serde_json::json!({
            "date": self.birth_date,
            "time": self.birth_time,
            "lat": self.location.lat,
            "lon": self.location.lon,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a profile's chat history. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
