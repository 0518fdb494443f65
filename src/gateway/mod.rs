/// Model Gateway: a structured-output wrapper around an external LLM and
/// an embedding model, plus speech-to-text delegation.
///
/// Provides the `ModelGateway` trait and associated types. The trait
/// abstraction enables multiple providers — currently OpenAI-compatible
/// chat/embeddings/transcription endpoints.

pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during a model call.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Structured output failed schema validation after all retries.
    #[error("Model schema error: {0}")]
    Schema(String),

    /// Transport/5xx error from the provider. Recovered internally up to
    /// the configured retry budget; surfaced only when retries are exhausted.
    #[error("Model transient error: {0}")]
    Transient(String),

    /// Provider not configured (e.g. missing API key).
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Core abstraction for structured LLM calls, embeddings, and transcription.
///
/// Implementations must be Send + Sync for use behind `Arc<dyn ModelGateway>`
/// shared across concurrently running pipelines.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Embed `text` into a fixed-dimension vector. Pure modulo the external model.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    /// Issue a structured request whose response is validated against `schema`
    /// (a JSON Schema over a closed set of fields).
    ///
    /// Invalid outputs trigger up to the configured number of bounded retries
    /// with deterministic reformatting prompts; a transport error retries with
    /// exponential backoff and full jitter, capped. Never returns partial text
    /// from a failed call.
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, ModelError>;

    /// Delegate to the external speech-to-text capability. Same retry/timeout
    /// discipline as `generate`.
    async fn transcribe(&self, audio_bytes: &[u8], mime: &str) -> Result<String, ModelError>;

    /// The embedding dimension produced by this gateway. Constant for the
    /// lifetime of the process.
    fn embedding_dimension(&self) -> usize;
}

/// Validate a generated JSON value against a JSON Schema.
///
/// Returns `Ok(())` when the value is valid, or `Err` with a human-readable
/// description of the first validation failure otherwise.
pub fn validate_against_schema(schema: &Value, instance: &Value) -> Result<(), String> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| format!("invalid schema: {}", e))?;
    let result = compiled.validate(instance);
    if let Err(errors) = result {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(messages.join("; "));
    }
    Ok(())
}

/// Build a deterministic reformatting prompt appended after a schema
/// validation failure, so the next attempt is a strict superset of context
/// rather than a fresh, non-deterministic re-ask.
pub fn reformat_prompt(original_prompt: &str, bad_output: &str, validation_error: &str) -> String {
    format!(
        "{original}\n\n\
         Your previous response did not match the required schema.\n\
         Previous response:\n{bad}\n\n\
         Validation error:\n{err}\n\n\
         Respond again with ONLY valid JSON matching the schema above, correcting this error.",
        original = original_prompt,
        bad = bad_output,
        err = validation_error,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_required_fields() {
        let schema = json!({
            "type": "object",
            "required": ["body", "difficulty"],
            "properties": {
                "body": {"type": "string"},
                "difficulty": {"type": "string", "enum": ["BASIC", "DEEP"]}
            }
        });
        let good = json!({"body": "tell me about yourself", "difficulty": "BASIC"});
        assert!(validate_against_schema(&schema, &good).is_ok());

        let bad = json!({"body": "tell me about yourself"});
        assert!(validate_against_schema(&schema, &bad).is_err());
    }

    #[test]
    fn reformat_prompt_includes_error_context() {
        let p = reformat_prompt("original", "{}", "missing field difficulty");
        assert!(p.contains("missing field difficulty"));
        assert!(p.contains("original"));
    }
}
