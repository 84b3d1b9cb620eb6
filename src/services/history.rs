use anyhow::{Context, Result};

use crate::models::Conversation;
use crate::services::database::Database;

const TITLE_MAX_CHARS: usize = 30;

pub fn create_new_conversation(model: &str, system_prompt: Option<&str>) -> Conversation {
    Conversation::new(model, system_prompt)
}

pub async fn save_conversation(db: &Database, conversation: &Conversation) -> Result<()> {
    db.put_conversation(conversation)
        .await
        .with_context(|| format!("Failed to save conversation {}", conversation.id))
}

pub async fn load_conversations(db: &Database) -> Result<Vec<Conversation>> {
    db.list_conversations()
        .await
        .context("Failed to load conversation history")
}

pub async fn get_conversation_by_id(db: &Database, id: &str) -> Result<Option<Conversation>> {
    db.get_conversation(id).await
}

pub async fn delete_conversation(db: &Database, id: &str) -> Result<()> {
    db.delete_conversation(id)
        .await
        .with_context(|| format!("Failed to delete conversation {}", id))
}

pub async fn clear_history(db: &Database) -> Result<()> {
    db.clear_conversations()
        .await
        .context("Failed to clear conversation history")
}

/// Title for a conversation derived from its first user message: the first
/// non-empty line, cut to 30 characters with `...` appended when longer.
pub fn derive_title(content: &str) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first_line.chars().count() > TITLE_MAX_CHARS {
        let cut: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

pub fn most_recent(conversations: &[Conversation]) -> Option<&Conversation> {
    conversations.iter().max_by_key(|c| c.updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_derive_title_short() {
        assert_eq!(derive_title("Hello there"), "Hello there");
    }

    #[test]
    fn test_derive_title_truncates_at_thirty_chars() {
        let title = derive_title("Explain quantum computing in simple terms please");
        assert_eq!(title, "Explain quantum computing in s...");
        assert_eq!(title.chars().count(), 33);
    }

    #[test]
    fn test_derive_title_exactly_thirty_is_kept() {
        let text = "a".repeat(30);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn test_derive_title_multibyte_and_multiline() {
        let title = derive_title("\n  héllo wörld ünïcode çharacters everywhere\nsecond");
        assert_eq!(title.chars().count(), 33);
        assert!(title.starts_with("héllo wörld"));
    }

    #[test]
    fn test_most_recent() {
        let mut a = Conversation::new("m", None);
        let b = Conversation::new("m", None);
        a.updated_at += Duration::minutes(5);
        let list = vec![b, a.clone()];
        assert_eq!(most_recent(&list).unwrap().id, a.id);
        assert!(most_recent(&[]).is_none());
    }

    #[tokio::test]
    async fn test_save_load_delete() {
        let db = Database::new_in_memory().unwrap();
        let conv = create_new_conversation("m", None);
        save_conversation(&db, &conv).await.unwrap();
        assert_eq!(load_conversations(&db).await.unwrap().len(), 1);
        assert!(get_conversation_by_id(&db, &conv.id).await.unwrap().is_some());

        delete_conversation(&db, &conv.id).await.unwrap();
        assert!(load_conversations(&db).await.unwrap().is_empty());

        save_conversation(&db, &conv).await.unwrap();
        clear_history(&db).await.unwrap();
        assert!(load_conversations(&db).await.unwrap().is_empty());
    }
}
