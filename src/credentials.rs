use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const KEYRING_SERVICE: &str = "com.complexitylens.app";
pub const API_KEY_NAME: &str = "geminiApiKey";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Please enter an API Key")]
    Empty,
    #[error("credential storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyStatus {
    pub gemini: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Option<String>;
    async fn save(&self, key: &str) -> Result<(), CredentialError>;
}

/// OS keyring, with the environment taking precedence.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    fn read_secure() -> Option<String> {
        if let Ok(value) = std::env::var(API_KEY_ENV) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }

        let entry = keyring::Entry::new(KEYRING_SERVICE, API_KEY_NAME).ok()?;
        let key = entry.get_password().ok()?;
        if key.trim().is_empty() {
            return None;
        }
        Some(key.trim().to_string())
    }

    fn write_secure(key: &str) -> Result<(), CredentialError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, API_KEY_NAME)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;
        entry
            .set_password(key)
            .map_err(|e| CredentialError::Storage(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn load(&self) -> Option<String> {
        // keyring backends block on dbus / the keychain
        tokio::task::spawn_blocking(Self::read_secure).await.ok().flatten()
    }

    async fn save(&self, key: &str) -> Result<(), CredentialError> {
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::write_secure(&key))
            .await
            .map_err(|e| CredentialError::Storage(e.to_string()))?
    }
}

/// Settings-window save. Stores the trimmed key.
pub async fn save_api_key<S>(store: &S, raw: &str) -> Result<(), CredentialError>
where
    S: CredentialStore + ?Sized,
{
    let key = raw.trim();
    if key.is_empty() {
        debug!("rejected blank api key");
        return Err(CredentialError::Empty);
    }
    store.save(key).await?;
    info!("api key saved");
    Ok(())
}

pub async fn api_key_status<S>(store: &S) -> ApiKeyStatus
where
    S: CredentialStore + ?Sized,
{
    ApiKeyStatus {
        gemini: store.load().await.is_some(),
    }
}
