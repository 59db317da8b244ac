//! OpenAI-compatible provider client
//!
//! One HTTP client backs three collaborators:
//! - [`Transcriber`] via `POST /audio/transcriptions` (verbose_json with segments)
//! - [`Embedder`] via `POST /embeddings`
//! - [`LineTimingEstimator`] via `POST /chat/completions` (JSON object answer)
//!
//! **Failure classification:**
//! - HTTP 429, HTTP 5xx, timeouts and connection failures → `TransientProvider`
//! - any other non-success status or an unparseable body → `Provider`

use async_trait::async_trait;
use lyra_common::config::ProvidersConfig;
use lyra_common::{Error, Result};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::TimedText;
use crate::services::providers::{Embedder, LineTimingEstimator, Transcriber, Transcript};

const USER_AGENT: &str = concat!("lyra-enrich/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<TranscriptionSegment>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionSegment {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatAnswer,
}

#[derive(Debug, Deserialize)]
struct ChatAnswer {
    #[serde(default)]
    content: Option<String>,
}

/// Shape the estimator prompt asks the model to answer with
#[derive(Debug, Deserialize)]
struct LineTimingAnswer {
    lines: Vec<LineTiming>,
}

#[derive(Debug, Deserialize)]
struct LineTiming {
    start: f64,
    end: f64,
}

pub struct OpenAiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    transcription_model: String,
    embedding_model: String,
    chat_model: String,
}

impl OpenAiClient {
    pub fn new(config: &ProvidersConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            transcription_model: config.transcription_model.clone(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, classifying failures
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| classify_send_error(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(operation, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::Provider(format!("{}: invalid response body: {}", operation, e)))
    }
}

fn classify_send_error(operation: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::TransientProvider(format!("{}: {}", operation, err))
    } else {
        Error::Provider(format!("{}: {}", operation, err))
    }
}

fn classify_status(operation: &str, status: reqwest::StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(200).collect();
    let message = format!("{}: HTTP {} {}", operation, status.as_u16(), snippet);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::TransientProvider(message)
    } else {
        Error::Provider(message)
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcript> {
        let size = audio.len();
        let file = multipart::Part::bytes(audio).file_name("audio.mp3");
        let form = multipart::Form::new()
            .part("file", file)
            .text("model", self.transcription_model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        tracing::debug!(bytes = size, model = %self.transcription_model, "Requesting transcription");

        let response: TranscriptionResponse = self
            .send_json(
                "transcription",
                self.http_client
                    .post(self.endpoint("audio/transcriptions"))
                    .multipart(form),
            )
            .await?;

        Ok(Transcript {
            text: response.text,
            segments: response
                .segments
                .into_iter()
                .map(|s| TimedText {
                    text: s.text,
                    start_time: s.start,
                    end_time: s.end,
                })
                .collect(),
            language: response.language,
            duration_seconds: response.duration,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response: EmbeddingResponse = self
            .send_json(
                "embedding",
                self.http_client
                    .post(self.endpoint("embeddings"))
                    .json(&EmbeddingRequest {
                        model: &self.embedding_model,
                        input: text,
                    }),
            )
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Provider("embedding: response contained no vector".into()))
    }
}

#[async_trait]
impl LineTimingEstimator for OpenAiClient {
    async fn estimate(&self, lines: &[String], duration_seconds: f64) -> Result<Vec<TimedText>> {
        let numbered: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}. {}", i + 1, line))
            .collect();

        let messages = vec![
            ChatMessage {
                role: "system",
                content: "You estimate when each lyric line is sung. Answer with a JSON object \
                          {\"lines\":[{\"start\":seconds,\"end\":seconds}, ...]} containing exactly \
                          one entry per input line, in input order."
                    .to_string(),
            },
            ChatMessage {
                role: "user",
                content: format!(
                    "Track duration: {:.1} seconds.\nLyrics ({} lines):\n{}",
                    duration_seconds,
                    lines.len(),
                    numbered.join("\n")
                ),
            },
        ];

        let body = serde_json::json!({
            "model": self.chat_model,
            "response_format": { "type": "json_object" },
            "temperature": 0,
            "messages": messages,
        });

        let response: ChatResponse = self
            .send_json(
                "line timing",
                self.http_client
                    .post(self.endpoint("chat/completions"))
                    .json(&body),
            )
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Provider("line timing: empty answer".into()))?;

        let answer: LineTimingAnswer = serde_json::from_str(&content)
            .map_err(|e| Error::Provider(format!("line timing: unparseable answer: {}", e)))?;

        Ok(answer
            .lines
            .into_iter()
            .enumerate()
            .map(|(i, timing)| TimedText {
                text: lines.get(i).cloned().unwrap_or_default(),
                start_time: timing.start,
                end_time: timing.end,
            })
            .collect())
    }
}
