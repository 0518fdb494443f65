/// Text-to-speech: the external interface used only by the audio variant
/// of the interview turn (`chat_turn_audio`). Rendering quality, voice
/// selection, and streaming playback are all external concerns beyond
/// this narrow interface.

use async_trait::async_trait;

use crate::errors::CoreError;

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Render `text` to speech and store it at `blob_key`
    /// (`tts/{thread_id}/{turn}.mp3`), returning an addressable URL for
    /// the rendered audio.
    async fn synthesize(&self, text: &str, blob_key: &str) -> Result<String, CoreError>;
}
