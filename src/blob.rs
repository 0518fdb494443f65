/// Object storage: the external interface to the blob store holding
/// uploaded records and rendered question audio.
///
/// Out of scope: presigning, multipart uploads, lifecycle policies — the
/// core only needs `get`/`put` by key.

use async_trait::async_trait;

use crate::errors::CoreError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn get_blob(&self, key: &str) -> Result<Vec<u8>, CoreError>;
    async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> Result<(), CoreError>;
}

/// `users/{user_id}/records/{uuid}_{filename}.pdf`
pub fn record_blob_key(user_id: &str, record_uuid: &str, filename: &str) -> String {
    format!("users/{}/records/{}_{}", user_id, record_uuid, filename)
}

/// `tts/{thread_id}/{turn}.mp3`
pub fn tts_blob_key(thread_id: &str, turn: u32) -> String {
    format!("tts/{}/{}.mp3", thread_id, turn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_blob_key_matches_layout() {
        let key = record_blob_key("u1", "abc-123", "life_record.pdf");
        assert_eq!(key, "users/u1/records/abc-123_life_record.pdf");
    }

    #[test]
    fn tts_blob_key_matches_layout() {
        let key = tts_blob_key("thread-9", 2);
        assert_eq!(key, "tts/thread-9/2.mp3");
    }
}
