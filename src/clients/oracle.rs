//! Generated career verdicts.
//!
//! Models are tried in order; the first non-empty answer wins. When every
//! model fails the configured placeholder is returned, so callers always get
//! a verdict.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ModelConfig, OracleConfig};

const PERSONA: &str = "You are FutureBot, a warm and grounded Vedic astrologer. \
You receive a numeric career scoring computed from a birth chart. \
Write a short verdict of three to four sentences in plain language. \
Mention the strongest and weakest factors by name, stay encouraging, \
and never invent scores that are not in the data.";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("No API key configured")]
    MissingKey,

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model {model} returned {status}")]
    Status { model: String, status: u16 },

    #[error("Model {0} returned no text")]
    Empty(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &ModelConfig, prompt: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string()
    }
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    #[must_use]
    pub fn with_shared_client(client: Client, config: &OracleConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, model: &ModelConfig, prompt: &str) -> Result<String, OracleError> {
        if self.api_key.is_empty() {
            return Err(OracleError::MissingKey);
        }

        let mut url = Url::parse(&format!(
            "{}/models/{}:generateContent",
            self.base_url, model.model
        ))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let body = json!({
            "system_instruction": {"parts": [{"text": PERSONA}]},
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": model.temperature,
                "maxOutputTokens": model.max_output_tokens,
            },
        });

        debug!(model = %model.model, "Requesting verdict");

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                model: model.model.clone(),
                status: status.as_u16(),
            });
        }

        let text = response.json::<GenerateResponse>().await?.text();
        if text.is_empty() {
            return Err(OracleError::Empty(model.model.clone()));
        }
        Ok(text)
    }
}

#[derive(Clone)]
pub struct Oracle {
    generator: Arc<dyn TextGenerator>,
    models: [ModelConfig; 2],
    placeholder: String,
}

impl Oracle {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &OracleConfig) -> Self {
        Self {
            generator,
            models: [config.primary.clone(), config.fallback.clone()],
            placeholder: config.placeholder.clone(),
        }
    }

    /// Never fails and never returns an empty string.
    pub async fn verdict(&self, scores: &Value) -> String {
        let prompt = format!("Career scoring for this chart:\n{scores}");

        for model in &self.models {
            match self.generator.generate(model, &prompt).await {
                Ok(text) if !text.trim().is_empty() => return text,
                Ok(_) => warn!(model = %model.model, "Model returned an empty verdict"),
                Err(e) => warn!(model = %model.model, error = %e, "Verdict generation failed"),
            }
        }

        self.placeholder.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Scripted {
        answers: Mutex<Vec<Result<String, OracleError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<String, OracleError>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(
            &self,
            model: &ModelConfig,
            _prompt: &str,
        ) -> Result<String, OracleError> {
            self.seen.lock().unwrap().push(model.model.clone());
            self.answers.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_model() {
        let generator = Arc::new(Scripted::new(vec![
            Err(OracleError::Status {
                model: "primary".to_string(),
                status: 429,
            }),
            Ok("Saturn rewards patience.".to_string()),
        ]));
        let oracle = Oracle::new(generator.clone(), &OracleConfig::default());

        let verdict = oracle.verdict(&json!({"score": 72})).await;

        assert_eq!(verdict, "Saturn rewards patience.");
        assert_eq!(
            *generator.seen.lock().unwrap(),
            vec!["gemini-2.0-flash", "gemini-1.5-flash"]
        );
    }

    #[tokio::test]
    async fn placeholder_when_both_fail() {
        let generator = Arc::new(Scripted::new(vec![
            Err(OracleError::MissingKey),
            Ok("   ".to_string()),
        ]));
        let config = OracleConfig::default();
        let oracle = Oracle::new(generator, &config);

        let verdict = oracle.verdict(&json!({"score": 10})).await;

        assert_eq!(verdict, config.placeholder);
        assert!(!verdict.is_empty());
    }

    #[test]
    fn response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "Mars "}, {"text": "is strong. "}]}}]
        }))
        .unwrap();
        assert_eq!(response.text(), "Mars is strong.");
    }
}
