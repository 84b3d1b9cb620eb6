use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use crate::models::{catalog, Conversation, Role};

pub fn export_to_markdown(conversation: &Conversation) -> String {
    let mut output = format!("# {}\n\n", conversation.title);
    output.push_str(&format!(
        "> Model: {} | Date: {}\n\n",
        catalog::display_name(&conversation.model),
        conversation.created_at.format("%Y-%m-%d %H:%M")
    ));
    output.push_str("---\n\n");

    for msg in conversation.visible_messages() {
        let role_label = match msg.role {
            Role::User => "You".to_string(),
            _ => msg
                .model
                .as_deref()
                .map(catalog::display_name)
                .unwrap_or_else(|| "Assistant".to_string()),
        };
        output.push_str(&format!("### {}\n\n{}\n\n", role_label, msg.content));
    }

    output
}

pub fn export_to_json(conversation: &Conversation) -> Result<String> {
    serde_json::to_string_pretty(conversation).context("Failed to serialize conversation")
}

/// `<root>/history/response/YYYY-MM-DD/user-agent-chat-<id>.json`
pub fn history_export_path(root: &Path, conversation: &Conversation, date: NaiveDate) -> PathBuf {
    root.join("history")
        .join("response")
        .join(date.format("%Y-%m-%d").to_string())
        .join(format!("user-agent-chat-{}.json", conversation.id))
}

/// Writes the conversation as JSON into today's folder of the archive under
/// `root` (the app data directory). Returns the written path.
pub fn archive_conversation(root: &Path, conversation: &Conversation) -> Result<PathBuf> {
    let date = Utc::now().date_naive();
    let path = history_export_path(root, conversation, date);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, export_to_json(conversation)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn sample() -> Conversation {
        let mut conv = Conversation::new("qwen/qwq-32b:free", Some("hidden system prompt"));
        conv.title = "Greetings".into();
        conv.messages.push(Message::new(Role::User, "Hello", None));
        conv.messages.push(Message::new(
            Role::Assistant,
            "Hi! How can I help?",
            Some("qwen/qwq-32b:free".into()),
        ));
        conv
    }

    #[test]
    fn test_markdown_lists_visible_messages() {
        let md = export_to_markdown(&sample());
        assert!(md.starts_with("# Greetings\n"));
        assert!(md.contains("> Model: QWQ 32B"));
        assert!(md.contains("### You\n\nHello"));
        assert!(md.contains("### QWQ 32B\n\nHi! How can I help?"));
        assert!(!md.contains("hidden system prompt"));
    }

    #[test]
    fn test_history_path_layout() {
        let conv = sample();
        let date = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
        let path = history_export_path(Path::new("/data"), &conv, date);
        assert_eq!(
            path,
            PathBuf::from(format!(
                "/data/history/response/2025-04-09/user-agent-chat-{}.json",
                conv.id
            ))
        );
    }

    #[test]
    fn test_archive_writes_json_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut conv = sample();
        conv.updated_at -= chrono::Duration::days(3);
        let data_dir = dir.path().join("bhima");
        let path = archive_conversation(&data_dir, &conv).unwrap();
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(
            path,
            data_dir
                .join("history")
                .join("response")
                .join(today)
                .join(format!("user-agent-chat-{}.json", conv.id))
        );
        let written = std::fs::read_to_string(&path).unwrap();
        let back: Conversation = serde_json::from_str(&written).unwrap();
        assert_eq!(back.id, conv.id);
        assert_eq!(back.messages.len(), 3);
        assert!(written.contains("\"createdAt\""));
    }
}
