// carecheck/src/api_keys.rs
//!
//! Gemini API key resolution.
//!
//! Environment variables win so that CI and one-off runs need no keychain;
//! otherwise the key saved with `carecheck api-key set` is used.

use crate::keychain;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;

pub const ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

const KEYCHAIN_ID: &str = "api_key_google";

/// Where the active key came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Environment,
    Keychain,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyStatus {
    pub is_configured: bool,
    pub source: Option<KeySource>,
    pub example_format: String,
}

/// Store the Gemini API key in the keychain.
pub fn store_api_key(api_key: &str) -> Result<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }
    keychain::store_secret(KEYCHAIN_ID, api_key).context("Failed to store Gemini API key")
}

/// Load the Gemini API key from the environment or the keychain.
pub fn load_api_key() -> Result<String> {
    resolve_api_key(|name| std::env::var(name).ok()).map(|(key, _)| key)
}

pub fn delete_api_key() -> Result<()> {
    keychain::delete_secret(KEYCHAIN_ID).context("Failed to delete Gemini API key")
}

pub fn api_key_status() -> ApiKeyStatus {
    let source = resolve_api_key(|name| std::env::var(name).ok())
        .ok()
        .map(|(_, source)| source);
    ApiKeyStatus {
        is_configured: source.is_some(),
        source,
        example_format: "AIza...".to_string(),
    }
}

fn resolve_api_key(lookup: impl Fn(&str) -> Option<String>) -> Result<(String, KeySource)> {
    let from_env = ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty());
    if let Some(key) = from_env {
        return Ok((key, KeySource::Environment));
    }

    keychain::load_secret(KEYCHAIN_ID)
        .map(|key| (key, KeySource::Keychain))
        .context(
            "Gemini API key not configured. Set GEMINI_API_KEY or run `carecheck api-key set <KEY>`",
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_takes_precedence() -> Result<()> {
        keychain::force_in_memory_keyring();
        let (key, source) = resolve_api_key(|name| match name {
            "GOOGLE_API_KEY" => Some("  AIza-env  ".to_string()),
            _ => None,
        })?;
        assert_eq!(key, "AIza-env");
        assert_eq!(source, KeySource::Environment);
        Ok(())
    }

    #[test]
    fn test_keychain_fallback_and_delete() -> Result<()> {
        keychain::force_in_memory_keyring();
        store_api_key("AIza-stored")?;

        let (key, source) = resolve_api_key(|_| None)?;
        assert_eq!(key, "AIza-stored");
        assert_eq!(source, KeySource::Keychain);

        delete_api_key()?;
        assert!(resolve_api_key(|_| None).is_err());
        Ok(())
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(store_api_key("   ").is_err());
    }
}
