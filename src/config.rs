use std::path::PathBuf;

use thiserror::Error;

use crate::analysis::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::popup::ReopenPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid POPUP_REOPEN_POLICY {0:?}, expected \"focus\" or \"toggle\"")]
    InvalidPolicy(String),
    #[error("{name} must not be blank")]
    Blank { name: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub reopen_policy: ReopenPolicy,
    /// Explicit DevTools endpoint, skipping discovery.
    pub chrome_debug_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            gemini_model: DEFAULT_MODEL.to_string(),
            reopen_policy: ReopenPolicy::default(),
            chrome_debug_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("GEMINI_API_BASE") {
            let base = base.trim();
            if base.is_empty() {
                return Err(ConfigError::Blank { name: "GEMINI_API_BASE" });
            }
            config.gemini_base_url = base.trim_end_matches('/').to_string();
        }

        if let Some(model) = lookup("GEMINI_MODEL") {
            let model = model.trim();
            if model.is_empty() {
                return Err(ConfigError::Blank { name: "GEMINI_MODEL" });
            }
            config.gemini_model = model.to_string();
        }

        if let Some(policy) = lookup("POPUP_REOPEN_POLICY") {
            config.reopen_policy = parse_policy(&policy)?;
        }

        config.chrome_debug_url = lookup("CHROME_DEBUG_URL")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(config)
    }
}

fn parse_policy(raw: &str) -> Result<ReopenPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "focus" => Ok(ReopenPolicy::FocusExisting),
        "toggle" => Ok(ReopenPolicy::ToggleClose),
        _ => Err(ConfigError::InvalidPolicy(raw.to_string())),
    }
}

/// `.env` in the working directory, else one level up (dev runs from
/// the crate dir).
pub fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename("../.env");
    }
}

pub fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::data_local_dir();

    base.unwrap_or_else(|| PathBuf::from(".")).join("complexity-lens")
}

pub fn log_dir() -> PathBuf {
    app_data_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.gemini_model, "gemini-1.5-flash-latest");
        assert_eq!(config.reopen_policy, ReopenPolicy::FocusExisting);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GEMINI_API_BASE", "http://localhost:8080/v1beta/"),
            ("GEMINI_MODEL", " gemini-2.0-flash "),
            ("POPUP_REOPEN_POLICY", "Toggle"),
            ("CHROME_DEBUG_URL", "http://127.0.0.1:9333"),
        ]))
        .unwrap();
        assert_eq!(config.gemini_base_url, "http://localhost:8080/v1beta");
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.reopen_policy, ReopenPolicy::ToggleClose);
        assert_eq!(config.chrome_debug_url.as_deref(), Some("http://127.0.0.1:9333"));
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            AppConfig::from_lookup(lookup(&[("POPUP_REOPEN_POLICY", "minimize")])).unwrap_err(),
            ConfigError::InvalidPolicy("minimize".into())
        );
        assert_eq!(
            AppConfig::from_lookup(lookup(&[("GEMINI_MODEL", "  ")])).unwrap_err(),
            ConfigError::Blank { name: "GEMINI_MODEL" }
        );
    }

    #[test]
    fn test_blank_debug_url_ignored() {
        let config = AppConfig::from_lookup(lookup(&[("CHROME_DEBUG_URL", " ")])).unwrap();
        assert!(config.chrome_debug_url.is_none());
    }
}
