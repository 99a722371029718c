//! Handle to a running channel: what the relay needs from the chat platform.

use async_trait::async_trait;

/// Attachment bytes plus the platform path they were served from (the extension drives MIME guessing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub file_path: String,
    pub data: Vec<u8>,
}

impl RemoteFile {
    /// Lowercased extension of `file_path`, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_path.rsplit('/').next().unwrap_or(&self.file_path);
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Handle to a running channel (stop, send message, fetch attachments).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a conversation (e.g. Telegram chat_id).
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String>;
    /// Download an attachment by platform file id.
    async fn fetch_file(&self, file_id: &str) -> Result<RemoteFile, String>;
}
