/// OpenAI-compatible Model Gateway implementation.
///
/// Calls the Chat Completions API (structured output via `json_object`
/// response format), the Embeddings API, and the audio transcription API.
/// Requires an API key — validate on construction, not at call time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::{reformat_prompt, validate_against_schema, ModelError, ModelGateway};
use crate::backoff::BackoffPolicy;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbedRequest {
    input: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI-backed ModelGateway.
pub struct OpenAIModelGateway {
    client: reqwest::Client,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    transcription_model: String,
    embedding_dim: usize,
    timeout: Duration,
    max_retries: u8,
    backoff: BackoffPolicy,
}

impl OpenAIModelGateway {
    /// # Errors
    /// Returns `ModelError::NotConfigured` if `api_key` is empty.
    pub fn new(
        api_key: String,
        embedding_dim: usize,
        timeout_ms: u64,
        max_retries: u8,
        backoff: BackoffPolicy,
    ) -> Result<Self, ModelError> {
        if api_key.trim().is_empty() {
            return Err(ModelError::NotConfigured(
                "an OpenAI-compatible API key is required for the model gateway".to_string(),
            ));
        }

        Ok(OpenAIModelGateway {
            client: reqwest::Client::new(),
            api_key,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            transcription_model: "whisper-1".to_string(),
            embedding_dim,
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            backoff,
        })
    }

    async fn call_chat(&self, prompt: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Transient(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(ModelError::Transient(format!("status {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Transient(format!("failed to parse response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::Transient("empty choices list".to_string()))
    }
}

#[async_trait]
impl ModelGateway for OpenAIModelGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let request = EmbedRequest {
            input: text.to_string(),
            model: self.embedding_model.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            let result = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .timeout(self.timeout)
                .json(&request)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let embed_response: EmbedResponse = response
                        .json()
                        .await
                        .map_err(|e| ModelError::Transient(format!("failed to parse embedding response: {}", e)))?;
                    return embed_response
                        .data
                        .into_iter()
                        .next()
                        .map(|d| d.embedding)
                        .ok_or_else(|| ModelError::Transient("empty embedding list".to_string()));
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (attempt as u8) >= self.max_retries {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ModelError::Transient(format!("status {}: {}", status, body)));
                    }
                }
                Err(e) => {
                    if (attempt as u8) >= self.max_retries {
                        return Err(ModelError::Transient(format!("request failed: {}", e)));
                    }
                }
            }
            tokio::time::sleep(self.backoff.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    async fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, ModelError> {
        let mut current_prompt = prompt.to_string();
        let mut last_schema_error: Option<String> = None;

        for attempt in 0..=self.max_retries {
            let raw = match self.call_chat(&current_prompt).await {
                Ok(text) => text,
                Err(ModelError::Transient(msg)) => {
                    if attempt >= self.max_retries {
                        return Err(ModelError::Transient(msg));
                    }
                    tokio::time::sleep(self.backoff.delay_for(attempt as u32)).await;
                    continue;
                }
                Err(other) => return Err(other),
            };

            let parsed: Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(e) => {
                    last_schema_error = Some(format!("not valid JSON: {}", e));
                    if attempt >= self.max_retries {
                        return Err(ModelError::Schema(last_schema_error.unwrap()));
                    }
                    current_prompt = reformat_prompt(prompt, &raw, last_schema_error.as_deref().unwrap_or(""));
                    continue;
                }
            };

            match validate_against_schema(schema, &parsed) {
                Ok(()) => return Ok(parsed),
                Err(validation_error) => {
                    last_schema_error = Some(validation_error.clone());
                    if attempt >= self.max_retries {
                        return Err(ModelError::Schema(validation_error));
                    }
                    current_prompt = reformat_prompt(prompt, &raw, &validation_error);
                }
            }
        }

        Err(ModelError::Schema(
            last_schema_error.unwrap_or_else(|| "exhausted retries".to_string()),
        ))
    }

    async fn transcribe(&self, audio_bytes: &[u8], mime: &str) -> Result<String, ModelError> {
        let mut attempt: u32 = 0;
        loop {
            let part = reqwest::multipart::Part::bytes(audio_bytes.to_vec())
                .mime_str(mime)
                .map_err(|e| ModelError::Transient(format!("invalid mime type: {}", e)))?
                .file_name("audio");
            let form = reqwest::multipart::Form::new()
                .text("model", self.transcription_model.clone())
                .part("file", part);

            let result = self
                .client
                .post("https://api.openai.com/v1/audio/transcriptions")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .timeout(self.timeout)
                .multipart(form)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let parsed: TranscriptionResponse = response
                        .json()
                        .await
                        .map_err(|e| ModelError::Transient(format!("failed to parse transcription response: {}", e)))?;
                    return Ok(parsed.text);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    if (attempt as u8) >= self.max_retries {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ModelError::Transient(format!("status {}: {}", status, body)));
                    }
                }
                Err(e) => {
                    if (attempt as u8) >= self.max_retries {
                        return Err(ModelError::Transient(format!("request failed: {}", e)));
                    }
                }
            }
            tokio::time::sleep(self.backoff.delay_for(attempt)).await;
            attempt += 1;
        }
    }

    fn embedding_dimension(&self) -> usize {
        self.embedding_dim
    }
}
