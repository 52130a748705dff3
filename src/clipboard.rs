//! System clipboard access used as the fallback code source.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("Clipboard access failed: {0}")]
    AccessFailed(String),
}

#[async_trait]
pub trait ClipboardSource: Send + Sync {
    /// Current clipboard text. A clipboard holding no text reads as "".
    async fn read_text(&self) -> Result<String, ClipboardError>;
}

/// arboard-backed clipboard. A fresh handle is opened per read on the
/// blocking pool since some platforms tie it to the opening thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

#[async_trait]
impl ClipboardSource for SystemClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        tokio::task::spawn_blocking(|| {
            let mut clipboard =
                arboard::Clipboard::new().map_err(|e| ClipboardError::AccessFailed(e.to_string()))?;
            match clipboard.get_text() {
                Ok(text) => Ok(text),
                Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
                Err(e) => Err(ClipboardError::AccessFailed(e.to_string())),
            }
        })
        .await
        .map_err(|e| ClipboardError::AccessFailed(e.to_string()))?
    }
}
