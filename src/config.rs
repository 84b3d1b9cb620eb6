use std::path::PathBuf;

use anyhow::{Context, Result};

pub const APP_ID: &str = "com.bhima.Bhima";
pub const APP_NAME: &str = "Bhima";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_API_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "microsoft/mai-ds-r1:free";
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a highly knowledgeable and precise assistant. \
Always provide factually correct, up-to-date, and clearly explained answers. \
When answering, prioritize clarity, conciseness, and logical flow. \
If a question requires context, ask for it before answering. \
Do not guess or fabricate information; if unsure or if information is unavailable, clearly state that. \
When possible, cite trusted sources, and always double-check facts.";

/// Sent as `HTTP-Referer` so OpenRouter can attribute traffic.
pub const REFERER: &str = "https://github.com/bhima-chat/bhima";
/// Sent as `X-Title`.
pub const X_TITLE: &str = "Bhima AI Chat";

pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_API_BASE_URL: &str = "BHIMA_API_BASE_URL";

/// Base URL for the chat-completions endpoint, honoring `BHIMA_API_BASE_URL`.
/// An override that does not parse as a URL is ignored.
pub fn api_base_url() -> String {
    match std::env::var(ENV_API_BASE_URL) {
        Ok(raw) if !raw.trim().is_empty() => match url::Url::parse(raw.trim()) {
            Ok(parsed) => parsed.as_str().trim_end_matches('/').to_string(),
            Err(e) => {
                tracing::warn!("Ignoring invalid {ENV_API_BASE_URL} '{raw}': {e}");
                DEFAULT_API_BASE_URL.to_string()
            }
        },
        _ => DEFAULT_API_BASE_URL.to_string(),
    }
}

/// Per-user data directory: `$XDG_DATA_HOME/bhima`, or
/// `~/.local/share/bhima` when XDG_DATA_HOME is unset.
pub fn data_dir() -> Result<PathBuf> {
    data_dir_from(std::env::var("XDG_DATA_HOME").ok(), std::env::var("HOME").ok())
}

fn data_dir_from(xdg_data_home: Option<String>, home: Option<String>) -> Result<PathBuf> {
    let base = match xdg_data_home {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = home.context("Neither XDG_DATA_HOME nor HOME is set")?;
            PathBuf::from(home).join(".local/share")
        }
    };
    Ok(base.join("bhima"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_prefers_xdg_data_home() {
        let dir = data_dir_from(Some("/xdg".into()), Some("/home/u".into())).unwrap();
        assert_eq!(dir, PathBuf::from("/xdg/bhima"));
    }

    #[test]
    fn test_data_dir_falls_back_to_home() {
        let dir = data_dir_from(Some(String::new()), Some("/home/u".into())).unwrap();
        assert_eq!(dir, PathBuf::from("/home/u/.local/share/bhima"));
        assert!(data_dir_from(None, None).is_err());
    }
}
