//! Client for the document-index service behind the book and file-search
//! routes.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::compute::lenient_body;
use crate::config::IndexConfig;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid index URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Document index unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Document index sent a malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct DocumentIndexClient {
    client: Client,
    base_url: String,
}

impl DocumentIndexClient {
    #[must_use]
    pub fn with_shared_client(client: Client, config: &IndexConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Relays one request. A success must carry JSON; an error status comes
    /// back with whatever body the index sent.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value), IndexError> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))?;
        url.set_query(query);

        debug!(%method, %url, "Forwarding to document index");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status.is_success() {
            return Ok((status, serde_json::from_slice(&bytes)?));
        }
        Ok((status, lenient_body(&bytes)))
    }
}
