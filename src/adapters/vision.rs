//! OpenAI-compatible vision chat provider.
//!
//! Posts a `chat/completions` request with the image as a base64 data URL.
//! Works against any endpoint speaking the same schema (OpenAI, OpenRouter,
//! llama.cpp server, ...).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;

use crate::config::ProviderSettings;

use super::TranscriptionProvider;

/// Chat-completions response (only the fields we read).
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Vision transcription over an OpenAI-compatible HTTP API.
pub struct VisionProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl VisionProvider {
    /// Build a provider from settings, reading the API key from the
    /// configured environment variable.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).with_context(|| {
            format!("API key env var '{}' is not set", settings.api_key_env)
        })?;
        Ok(Self::new(settings, api_key))
    }

    pub fn new(settings: &ProviderSettings, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
        }
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_base, endpoint)
    }

    /// Sniff the payload's mime type from magic bytes; the API rejects data
    /// URLs with a mismatched type.
    fn detect_mime(image: &[u8]) -> &'static str {
        match image {
            [0xFF, 0xD8, ..] => "image/jpeg",
            [0x89, b'P', b'N', b'G', ..] => "image/png",
            [b'R', b'I', b'F', b'F', ..] => "image/webp",
            [b'B', b'M', ..] => "image/bmp",
            _ => "image/jpeg",
        }
    }
}

#[async_trait]
impl TranscriptionProvider for VisionProvider {
    fn name(&self) -> &str {
        "vision"
    }

    async fn transcribe(
        &self,
        image: &[u8],
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String> {
        let mime = Self::detect_mime(image);
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let data_url = format!("data:{};base64,{}", mime, encoded);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user_prompt },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ],
        });

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send transcription request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiError>(&text)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(text);
            anyhow::bail!("Transcription API returned {}: {}", status, detail.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            anyhow::bail!("Transcription API returned an empty result");
        }

        Ok(content)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.api_url("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to reach transcription API")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Transcription API health check failed: {}",
                response.status()
            );
        }

        Ok(())
    }
}
