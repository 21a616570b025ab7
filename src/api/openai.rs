//! OpenAI-compatible HTTP client for all three remote calls.
//!
//! - Transcription: `POST {base}/audio/transcriptions` (multipart)
//! - Extraction and digest: `POST {base}/chat/completions` in JSON mode

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::chunking::{join_transcripts, split_clip, ChunkLimits};
use super::parse::{parse_digest, parse_extraction, ExtractedInsights};
use super::prompts::{DIGEST_PROMPT, EXTRACTION_PROMPT};
use super::{ApiError, AudioClip, DigestRequest, DigestWriter, Extractor, Transcriber, Transcript};
use crate::config::ApiSettings;
use crate::domain::DigestBody;

/// HTTP client for an OpenAI-compatible API
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    transcription_model: String,
    extraction_model: String,
    digest_model: String,
    language: Option<String>,
    chunking: ChunkLimits,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client from resolved API settings
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            transcription_model: settings.transcription_model.clone(),
            extraction_model: settings.extraction_model.clone(),
            digest_model: settings.digest_model.clone(),
            language: settings.language.clone(),
            chunking: settings.chunking,
        })
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Upload one chunk and return its plain-text transcript
    async fn transcribe_chunk(&self, chunk: AudioClip) -> Result<String, ApiError> {
        let file_part = Part::bytes(chunk.bytes)
            .file_name(chunk.file_name)
            .mime_str(&chunk.mime_type)
            .map_err(|e| {
                ApiError::MalformedResponse(format!("invalid MIME type {}: {}", chunk.mime_type, e))
            })?;

        let mut form = Form::new()
            .text("model", self.transcription_model.clone())
            .text("response_format", "text")
            .part("file", file_part);

        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .authorize(self.client.post(self.api_url("audio/transcriptions")))
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.text().await?)
    }

    /// Run a JSON-mode chat completion and return the message content
    async fn chat_json(&self, model: &str, system: &str, user: &str) -> Result<String, ApiError> {
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            temperature: 0.2,
        };

        let response = self
            .authorize(self.client.post(self.api_url("chat/completions")))
            .json(&body)
            .send()
            .await?;

        let response = check_status(response).await?;
        let text = response.text().await?;

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ApiError::MalformedResponse("completion has no content".to_string()))
    }
}

/// Turn a non-2xx response into an ApiError
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(ApiError::from_status(status.as_u16(), body, retry_after))
}

#[async_trait]
impl Transcriber for OpenAiClient {
    fn model(&self) -> &str {
        &self.transcription_model
    }

    #[instrument(skip(self, clip), fields(file = %clip.file_name, bytes = clip.len()))]
    async fn transcribe(&self, clip: &AudioClip) -> Result<Transcript, ApiError> {
        let chunks = if self.chunking.needs_split(clip) {
            let limits = self.chunking;
            let clip = clip.clone();
            tokio::task::spawn_blocking(move || split_clip(&clip, &limits))
                .await
                .map_err(|e| ApiError::InvalidAudio(format!("split task failed: {}", e)))??
        } else {
            vec![clip.clone()]
        };
        let count = chunks.len();
        debug!(chunks = count, "Uploading audio");

        let mut parts = Vec::with_capacity(count);
        for chunk in chunks {
            parts.push(self.transcribe_chunk(chunk).await?);
        }

        Ok(Transcript {
            text: join_transcripts(parts),
            chunks: count,
        })
    }
}

#[async_trait]
impl Extractor for OpenAiClient {
    fn model(&self) -> &str {
        &self.extraction_model
    }

    #[instrument(skip(self, transcript), fields(chars = transcript.len()))]
    async fn extract(&self, transcript: &str) -> Result<ExtractedInsights, ApiError> {
        let content = self
            .chat_json(&self.extraction_model, EXTRACTION_PROMPT, transcript)
            .await?;
        parse_extraction(&content)
    }
}

#[async_trait]
impl DigestWriter for OpenAiClient {
    fn model(&self) -> &str {
        &self.digest_model
    }

    #[instrument(skip(self, request), fields(date = %request.date, notes = request.notes.len()))]
    async fn digest(&self, request: &DigestRequest) -> Result<DigestBody, ApiError> {
        let content = self
            .chat_json(&self.digest_model, DIGEST_PROMPT, &request.render())
            .await?;
        parse_digest(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url() {
        let settings = ApiSettings {
            base_url: "https://api.example.com/v1/".to_string(),
            ..ApiSettings::default()
        };
        let client = OpenAiClient::new(&settings).unwrap();
        assert_eq!(
            client.api_url("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_models_from_settings() {
        let settings = ApiSettings::default();
        let client = OpenAiClient::new(&settings).unwrap();
        assert_eq!(Transcriber::model(&client), settings.transcription_model);
        assert_eq!(Extractor::model(&client), settings.extraction_model);
    }
}
