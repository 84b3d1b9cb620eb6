use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use crate::config::DEFAULT_CONVERSATION_TITLE;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub model: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(model: impl Into<String>, system_prompt: Option<&str>) -> Self {
        let now = Utc::now();
        let messages = system_prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                let mut msg = Message::new(Role::System, p, None);
                msg.timestamp = now;
                vec![msg]
            })
            .unwrap_or_default();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            messages,
            model: model.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_CONVERSATION_TITLE
    }

    /// Messages shown in the transcript. System messages are never rendered.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn preview(&self) -> Option<String> {
        let last = self.visible_messages().last()?;
        let line = last.content.lines().find(|l| !l.trim().is_empty())?.trim();
        let mut preview: String = line.chars().take(PREVIEW_CHARS).collect();
        if line.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        Some(preview)
    }
}
