use std::sync::Arc;

use anyhow::{Context, Result};
use oo7::Keyring;

use crate::config::{APP_ID, APP_NAME, ENV_API_KEY};

const KEYRING_ATTR_APP: &str = "application";
const KEYRING_ATTR_REF: &str = "key-ref";
pub const API_KEY_REF: &str = "openrouter";

#[derive(Debug, Clone)]
pub struct KeyringService {
    keyring: Arc<Keyring>,
}

impl KeyringService {
    pub async fn new() -> Result<Self> {
        let keyring = Keyring::new()
            .await
            .context("Failed to initialize keyring")?;
        Ok(Self {
            keyring: Arc::new(keyring),
        })
    }

    pub async fn store(&self, key_ref: &str, secret: &str) -> Result<()> {
        let attributes = Self::attributes(key_ref);
        let attr_refs: Vec<(&str, &str)> =
            attributes.iter().map(|(k, v)| (*k, v.as_str())).collect();

        self.keyring
            .create_item(
                &format!("{} API Key - {}", APP_NAME, key_ref),
                &attr_refs,
                secret,
                true,
            )
            .await
            .context("Failed to store secret in keyring")?;

        Ok(())
    }

    pub async fn retrieve(&self, key_ref: &str) -> Result<Option<String>> {
        let attributes = Self::attributes(key_ref);
        let attr_refs: Vec<(&str, &str)> =
            attributes.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let items = self
            .keyring
            .search_items(&attr_refs)
            .await
            .context("Failed to search keyring")?;

        match items.first() {
            Some(item) => {
                let secret = item.secret().await.context("Failed to read secret")?;
                let secret_str =
                    String::from_utf8(secret.to_vec()).context("Secret is not valid UTF-8")?;
                Ok(Some(secret_str))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key_ref: &str) -> Result<()> {
        let attributes = Self::attributes(key_ref);
        let attr_refs: Vec<(&str, &str)> =
            attributes.iter().map(|(k, v)| (*k, v.as_str())).collect();

        self.keyring
            .delete(&attr_refs)
            .await
            .context("Failed to delete secret from keyring")?;

        Ok(())
    }

    fn attributes(key_ref: &str) -> Vec<(&'static str, String)> {
        vec![
            (KEYRING_ATTR_APP, APP_ID.to_string()),
            (KEYRING_ATTR_REF, key_ref.to_string()),
        ]
    }
}

/// The key from `OPENROUTER_API_KEY`, if set and non-blank.
pub fn env_api_key() -> Option<String> {
    std::env::var(ENV_API_KEY)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

/// Resolves the API key: the environment wins over the keyring. A missing
/// or unreachable keyring yields `None` rather than an error.
pub async fn resolve_api_key(keyring: Option<&KeyringService>) -> Option<String> {
    if let Some(key) = env_api_key() {
        return Some(key);
    }
    let keyring = keyring?;
    match keyring.retrieve(API_KEY_REF).await {
        Ok(key) => key.filter(|k| !k.trim().is_empty()),
        Err(e) => {
            tracing::error!("Failed to read API key from keyring: {}", e);
            None
        }
    }
}
