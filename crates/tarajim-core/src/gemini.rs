use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;

use crate::backend::{ModelBackend, ModelError};
use crate::rate_limit::check_rate_limit_response;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Backend for the Google Generative Language API (`generateContent`).
pub struct Gemini {
    model: String,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for Gemini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gemini")
            .field("model", &self.model)
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Gemini {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Point the backend at a different base URL (local proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl ModelBackend for Gemini {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<String, ModelError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            );
            let body = json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            });

            let resp = client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ModelError::Unavailable(e.to_string()))?;

            check_rate_limit_response(&resp)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ModelError::Unavailable(format!("HTTP {}", status)));
            }

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| ModelError::Unavailable(e.to_string()))?;

            reply_text(&data)
        })
    }
}

/// Extract the reply text from a generateContent response body.
///
/// Concatenates the parts of the first candidate. A response with no
/// candidates is an error; `promptFeedback.blockReason` is surfaced when the
/// API refused the prompt outright.
pub(crate) fn reply_text(data: &serde_json::Value) -> Result<String, ModelError> {
    if let Some(reason) = data["promptFeedback"]["blockReason"].as_str() {
        return Err(ModelError::Unavailable(format!(
            "prompt blocked: {}",
            reason
        )));
    }

    let text: String = data["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.is_empty() {
        Err(ModelError::Unavailable("empty model response".into()))
    } else {
        Ok(text)
    }
}
