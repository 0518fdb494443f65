/// OCR + categorization: stage 3 of the ingestion pipeline.
///
/// A fixed-format prompt-builder function producing one prompt per batch,
/// paired with the Model Gateway's schema validation. The extraction
/// contract is *verbatim*: the model may not summarize or paraphrase,
/// only copy source text byte-for-byte.

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use crate::errors::CoreError;
use crate::gateway::{ModelError, ModelGateway};
use crate::store::Category;

/// Literal token substituted for illegible regions.
pub const ILLEGIBLE_TOKEN: &str = "[일부 텍스트 누락]";

#[derive(Debug, Clone, Deserialize)]
pub struct RawChunk {
    pub category: String,
    pub chunk_text: String,
}

/// JSON Schema for one OCR+categorization batch response: a list of
/// `{category, chunk_text}` objects, category restricted to the closed set.
pub fn ocr_batch_schema() -> Value {
    json!({
        "type": "object",
        "required": ["chunks"],
        "properties": {
            "chunks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["category", "chunk_text"],
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": Category::ALL.iter().map(|c| c.label()).collect::<Vec<_>>()
                        },
                        "chunk_text": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// Build the fixed-format prompt for one batch of page images.
///
/// The verbatim-extraction contract: copy source text byte-for-byte
/// (whitespace, punctuation, line breaks preserved); never summarize,
/// paraphrase, or infer; illegible regions become the literal
/// `ILLEGIBLE_TOKEN`; PII fields (name, school name, student id, resident
/// id) are elided.
pub fn build_ocr_prompt(batch_start_page: usize, page_count: usize) -> String {
    format!(
        "You are transcribing pages {}-{} of a Korean student life record (생기부).\n\
         For each distinct passage, copy the source text BYTE-FOR-BYTE: preserve \
         whitespace, punctuation, and line breaks exactly as printed. Do NOT \
         summarize, paraphrase, or infer content that is not literally present.\n\
         If a region is illegible, output the literal token {token} in its place \
         instead of guessing.\n\
         Elide personally identifying fields — student name, school name, student \
         id, resident registration number — replacing them with their field label \
         in brackets (e.g. [학생명]).\n\
         Assign each passage exactly one category from this closed set: 성적, 세특, \
         창체, 행특, 출결, 독서, 수상, 진로, 기타.\n\
         Respond as JSON: {{\"chunks\": [{{\"category\": ..., \"chunk_text\": ...}}]}}.",
        batch_start_page,
        batch_start_page + page_count - 1,
        token = ILLEGIBLE_TOKEN,
    )
}

/// Call the gateway's structured `generate` with the page images embedded
/// as base64 in the prompt (the gateway's `generate` takes a text prompt;
/// image bytes are inlined as a data URL so this stays provider-agnostic
/// at the call site — the OpenAI-backed gateway is free to parse these out
/// and issue a true multimodal request).
pub async fn ocr_batch(
    gateway: &dyn ModelGateway,
    batch_start_page: usize,
    page_images: &[Vec<u8>],
) -> Result<Vec<RawChunk>, ModelError> {
    let mut prompt = build_ocr_prompt(batch_start_page, page_images.len());
    for (i, png) in page_images.iter().enumerate() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        prompt.push_str(&format!(
            "\n\n[page {} image, data:image/png;base64]\n{}",
            batch_start_page + i,
            encoded
        ));
    }

    let schema = ocr_batch_schema();
    let value = gateway.generate(&prompt, &schema).await?;

    let chunks: Vec<RawChunk> = serde_json::from_value(
        value
            .get("chunks")
            .cloned()
            .unwrap_or(Value::Array(vec![])),
    )
    .map_err(|e| ModelError::Schema(format!("malformed chunks array: {}", e)))?;

    // Schema validation already constrains `category` to the closed set via
    // the enum, but guard the invariant explicitly at the call site too —
    // a provider that ignores enum constraints should not silently corrupt
    // a record's categorization.
    for chunk in &chunks {
        Category::from_str(&chunk.category)
            .map_err(|e| ModelError::Schema(format!("invalid category in OCR output: {}", e)))?;
    }

    Ok(chunks)
}
