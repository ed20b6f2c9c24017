//! HTTP client for the astrology computation backend.
//!
//! The backend is opaque: request bodies are forwarded as JSON and responses
//! are relayed without interpretation, except for the Panchang which the
//! notification schedule reads.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::client::notifications::{NotificationError, PanchangDay, PanchangSource};
use crate::config::ComputeConfig;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Computation backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Computation backend returned {status}: {body}")]
    Status { status: StatusCode, body: Value },

    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fills in `timezone` when the body is an object and the field is absent
/// or null. Other bodies are returned untouched.
#[must_use]
pub fn with_default_timezone(mut body: Value, timezone: &str) -> Value {
    if let Value::Object(map) = &mut body {
        let missing = map.get("timezone").is_none_or(Value::is_null);
        if missing {
            map.insert("timezone".to_string(), Value::String(timezone.to_string()));
        }
    }
    body
}

/// Error bodies are only logged, so non-JSON text is kept as a string.
pub(crate) fn lenient_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[derive(Clone)]
pub struct ComputeClient {
    client: Client,
    base_url: String,
    default_timezone: String,
    timeout: Option<Duration>,
}

impl ComputeClient {
    #[must_use]
    pub fn with_shared_client(client: Client, config: &ComputeConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_timezone: config.default_timezone.clone(),
            timeout: (config.request_timeout_seconds > 0)
                .then(|| Duration::from_secs(config.request_timeout_seconds)),
        }
    }

    fn url(&self, path: &str) -> Result<Url, ComputeError> {
        Ok(Url::parse(&format!("{}{path}", self.base_url))?)
    }

    /// Posts `body` to `path` and returns the status and body. A success
    /// must carry JSON; an error status keeps whatever body came with it.
    pub async fn forward(
        &self,
        path: &str,
        body: Value,
    ) -> Result<(StatusCode, Value), ComputeError> {
        let url = self.url(path)?;
        let body = with_default_timezone(body, &self.default_timezone);

        debug!(%url, "Forwarding to computation backend");

        let mut request = self.client.post(url).json(&body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return Ok((status, serde_json::from_slice(&bytes)?));
        }

        warn!(path, status = status.as_u16(), "Computation backend returned an error");
        Ok((status, lenient_body(&bytes)))
    }

    /// Like [`forward`](Self::forward) but treats a non-2xx status as an error.
    pub async fn call(&self, path: &str, body: Value) -> Result<Value, ComputeError> {
        let (status, body) = self.forward(path, body).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(ComputeError::Status { status, body })
        }
    }

    /// Liveness check used by `check`. Any HTTP answer counts as reachable.
    pub async fn ping(&self) -> Result<StatusCode, ComputeError> {
        let url = self.url("/")?;
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        Ok(response.status())
    }
}

#[async_trait]
impl PanchangSource for ComputeClient {
    async fn panchang(
        &self,
        date: NaiveDate,
        lat: f64,
        lon: f64,
    ) -> Result<PanchangDay, NotificationError> {
        let body = serde_json::json!({
            "date": date.format("%Y-%m-%d").to_string(),
            "time": "06:00",
            "lat": lat,
            "lon": lon,
        });

        let value = self
            .call("/calculate/panchang", body)
            .await
            .map_err(|e| NotificationError::Source(e.to_string()))?;

        serde_json::from_value(value).map_err(|e| NotificationError::Source(e.to_string()))
    }
}
