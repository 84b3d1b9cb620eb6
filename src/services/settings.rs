use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;
use crate::config::DEFAULT_MODEL;

const SETTINGS_KEY: &str = "app_settings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub theme: Theme,
    pub font_size: FontSize,
    pub animations: bool,
    pub auto_scroll: bool,
    pub stream_responses: bool,
    pub send_with_enter: bool,
    pub temperature: f32,
    pub default_model: String,
    /// Seeded as the system message of new conversations. `None` uses the
    /// built-in prompt; an empty string disables it.
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontSize {
    Small,
    Medium,
    Large,
}

impl FontSize {
    pub fn points(self) -> u32 {
        match self {
            FontSize::Small => 13,
            FontSize::Medium => 15,
            FontSize::Large => 17,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            font_size: FontSize::Medium,
            animations: true,
            auto_scroll: true,
            stream_responses: true,
            send_with_enter: true,
            temperature: 1.0,
            default_model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
        }
    }
}

/// One edit made on a preferences page.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    Theme(Theme),
    FontSize(FontSize),
    Animations(bool),
    AutoScroll(bool),
    StreamResponses(bool),
    SendWithEnter(bool),
    Temperature(f32),
    DefaultModel(String),
    SystemPrompt(String),
}

impl AppSettings {
    pub fn apply(&mut self, change: SettingChange) {
        match change {
            SettingChange::Theme(theme) => self.theme = theme,
            SettingChange::FontSize(size) => self.font_size = size,
            SettingChange::Animations(on) => self.animations = on,
            SettingChange::AutoScroll(on) => self.auto_scroll = on,
            SettingChange::StreamResponses(on) => self.stream_responses = on,
            SettingChange::SendWithEnter(on) => self.send_with_enter = on,
            SettingChange::Temperature(t) => self.temperature = t.clamp(0.0, 2.0),
            SettingChange::DefaultModel(model) => self.default_model = model,
            SettingChange::SystemPrompt(prompt) => self.system_prompt = Some(prompt),
        }
    }

    /// Flips between light and dark. From `System`, switches to the opposite
    /// of what the desktop currently resolves to.
    pub fn toggle_theme(&mut self, system_is_dark: bool) {
        self.theme = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
            Theme::System if system_is_dark => Theme::Light,
            Theme::System => Theme::Dark,
        };
    }

    pub fn effective_system_prompt(&self) -> Option<&str> {
        match self.system_prompt.as_deref() {
            None => Some(crate::config::DEFAULT_SYSTEM_PROMPT),
            Some(p) if p.trim().is_empty() => None,
            Some(p) => Some(p),
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        match db.get_setting(SETTINGS_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Stored settings are unreadable, using defaults: {}", e);
                AppSettings::default()
            }),
            Ok(None) => AppSettings::default(),
            Err(e) => {
                tracing::error!("Failed to load settings: {}", e);
                AppSettings::default()
            }
        }
    }

    pub async fn save(db: &Database, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting(SETTINGS_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = AppSettings::default();
        assert_eq!(s.theme, Theme::Dark);
        assert_eq!(s.font_size, FontSize::Medium);
        assert!(s.animations);
        assert_eq!(s.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_toggle_theme() {
        let mut s = AppSettings::default();
        s.toggle_theme(false);
        assert_eq!(s.theme, Theme::Light);
        s.toggle_theme(false);
        assert_eq!(s.theme, Theme::Dark);

        s.theme = Theme::System;
        s.toggle_theme(true);
        assert_eq!(s.theme, Theme::Light);
        s.theme = Theme::System;
        s.toggle_theme(false);
        assert_eq!(s.theme, Theme::Dark);
    }

    #[test]
    fn test_effective_system_prompt() {
        let mut s = AppSettings::default();
        assert_eq!(
            s.effective_system_prompt(),
            Some(crate::config::DEFAULT_SYSTEM_PROMPT)
        );
        s.system_prompt = Some(String::new());
        assert_eq!(s.effective_system_prompt(), None);
        s.system_prompt = Some("Be terse".into());
        assert_eq!(s.effective_system_prompt(), Some("Be terse"));
    }

    #[test]
    fn test_apply_changes_one_field() {
        let mut s = AppSettings::default();
        s.apply(SettingChange::SendWithEnter(false));
        s.apply(SettingChange::Temperature(5.0));
        s.apply(SettingChange::SystemPrompt(String::new()));
        assert!(!s.send_with_enter);
        assert_eq!(s.temperature, 2.0);
        assert_eq!(s.effective_system_prompt(), None);
        assert_eq!(s.theme, Theme::Dark);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s: AppSettings = serde_json::from_str(r#"{"theme":"Light"}"#).unwrap();
        assert_eq!(s.theme, Theme::Light);
        assert!(s.auto_scroll);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let db = Database::new_in_memory().unwrap();
        assert_eq!(SettingsService::load(&db).await, AppSettings::default());

        let mut s = AppSettings::default();
        s.font_size = FontSize::Large;
        s.animations = false;
        SettingsService::save(&db, &s).await.unwrap();
        assert_eq!(SettingsService::load(&db).await, s);
    }

    #[tokio::test]
    async fn test_corrupt_settings_fall_back() {
        let db = Database::new_in_memory().unwrap();
        db.set_setting(SETTINGS_KEY, "not json").await.unwrap();
        assert_eq!(SettingsService::load(&db).await, AppSettings::default());
    }
}
