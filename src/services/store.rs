use crate::models::{Conversation, Message, Role};
use crate::services::history::{derive_title, most_recent};

pub const EMPTY_RESPONSE_TEXT: &str = "Sorry, I couldn't generate a response.";
pub const ERROR_RESPONSE_TEXT: &str =
    "Sorry, there was an error processing your request. Please try again.";

/// The assistant reply currently being streamed.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingState {
    pub conversation_id: String,
    pub message_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    NotFound,
    Removed,
    /// The last conversation was removed and a fresh one took its place.
    Replaced(Conversation),
}

/// In-memory conversation state shared by the UI. Every mutating call that
/// changes a conversation leaves it ready to be persisted by the caller.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active_id: Option<String>,
    is_loading: bool,
    /// Conversation the in-flight reply belongs to, streamed or not.
    request_conversation_id: Option<String>,
    streaming: Option<StreamingState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the store contents with persisted history and selects the
    /// most recently updated conversation. When history is empty a new
    /// conversation is created and returned so the caller can persist it.
    pub fn load(
        &mut self,
        conversations: Vec<Conversation>,
        model: &str,
        system_prompt: Option<&str>,
    ) -> Option<Conversation> {
        self.conversations = conversations;
        self.end_request();

        match most_recent(&self.conversations).map(|c| c.id.clone()) {
            Some(id) => {
                self.active_id = Some(id);
                None
            }
            None => Some(self.create_new_conversation(model, system_prompt).clone()),
        }
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Conversations ordered for the sidebar, most recently updated first.
    pub fn sorted_for_sidebar(&self) -> Vec<&Conversation> {
        let mut sorted: Vec<&Conversation> = self.conversations.iter().collect();
        sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sorted
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.active_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn request_conversation_id(&self) -> Option<&str> {
        self.request_conversation_id.as_deref()
    }

    pub fn streaming(&self) -> Option<&StreamingState> {
        self.streaming.as_ref()
    }

    pub fn streaming_message_id(&self) -> Option<&str> {
        self.streaming.as_ref().map(|s| s.message_id.as_str())
    }

    pub fn streaming_content(&self) -> &str {
        self.streaming.as_ref().map(|s| s.content.as_str()).unwrap_or("")
    }

    pub fn create_new_conversation(
        &mut self,
        model: &str,
        system_prompt: Option<&str>,
    ) -> &Conversation {
        let conversation = Conversation::new(model, system_prompt);
        self.active_id = Some(conversation.id.clone());
        self.conversations.insert(0, conversation);
        &self.conversations[0]
    }

    /// Selects a conversation. Unknown ids leave the selection unchanged.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.get(id).is_some() {
            self.active_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Appends a message and returns its id. A user message sent while the
    /// conversation still has the default title also names the conversation.
    pub fn add_message(
        &mut self,
        conversation_id: &str,
        role: Role,
        content: &str,
        model: Option<String>,
    ) -> Option<String> {
        let conversation = self.get_mut(conversation_id)?;
        let message = Message::new(role, content, model);
        let id = message.id.clone();
        if role == Role::User && conversation.has_default_title() {
            let title = derive_title(content);
            if !title.is_empty() {
                conversation.title = title;
            }
        }
        conversation.messages.push(message);
        conversation.touch();
        Some(id)
    }

    /// Replaces the content of the last message, but only when its role
    /// matches `role`.
    pub fn update_last_message(&mut self, conversation_id: &str, role: Role, content: &str) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };
        match conversation.messages.last_mut() {
            Some(last) if last.role == role => {
                last.content = content.to_string();
                conversation.touch();
                true
            }
            _ => false,
        }
    }

    pub fn update_title(&mut self, conversation_id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };
        conversation.title = title.to_string();
        conversation.touch();
        true
    }

    pub fn update_model(&mut self, conversation_id: &str, model: &str) -> bool {
        let Some(conversation) = self.get_mut(conversation_id) else {
            return false;
        };
        if conversation.model == model {
            return false;
        }
        conversation.model = model.to_string();
        conversation.touch();
        true
    }

    /// Removes a conversation and abandons any reply in flight for it. If it
    /// was active, the first remaining conversation in list order becomes
    /// active; if none remain, a fresh one is created so
    /// there is always something to type into.
    pub fn delete_conversation(
        &mut self,
        id: &str,
        model: &str,
        system_prompt: Option<&str>,
    ) -> DeleteOutcome {
        let Some(index) = self.conversations.iter().position(|c| c.id == id) else {
            return DeleteOutcome::NotFound;
        };
        self.conversations.remove(index);

        if self.request_conversation_id.as_deref() == Some(id) {
            self.end_request();
        }

        if self.active_id.as_deref() != Some(id) {
            return DeleteOutcome::Removed;
        }

        let next = self.conversations.first().map(|c| c.id.clone());
        match next {
            Some(first) => {
                self.active_id = Some(first);
                DeleteOutcome::Removed
            }
            None => {
                let fresh = self.create_new_conversation(model, system_prompt).clone();
                DeleteOutcome::Replaced(fresh)
            }
        }
    }

    /// Drops every conversation and starts over with a fresh one.
    pub fn clear(&mut self, model: &str, system_prompt: Option<&str>) -> Conversation {
        self.conversations.clear();
        self.end_request();
        self.create_new_conversation(model, system_prompt).clone()
    }

    // --- Streaming ---

    /// Inserts an empty assistant message that will receive streamed text and
    /// marks the store as loading. Returns the placeholder's id.
    pub fn begin_stream(&mut self, conversation_id: &str, model: &str) -> Option<String> {
        let message_id =
            self.add_message(conversation_id, Role::Assistant, "", Some(model.to_string()))?;
        self.is_loading = true;
        self.request_conversation_id = Some(conversation_id.to_string());
        self.streaming = Some(StreamingState {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.clone(),
            content: String::new(),
        });
        Some(message_id)
    }

    /// Marks a non-streaming request for `conversation_id` as in flight.
    pub fn begin_request(&mut self, conversation_id: &str) {
        self.is_loading = true;
        self.request_conversation_id = Some(conversation_id.to_string());
    }

    fn end_request(&mut self) {
        self.is_loading = false;
        self.request_conversation_id = None;
        self.streaming = None;
    }

    /// Appends a streamed increment to the placeholder message.
    pub fn append_chunk(&mut self, chunk: &str) -> bool {
        let Some(state) = self.streaming.as_mut() else {
            return false;
        };
        state.content.push_str(chunk);
        let (conv_id, msg_id, content) = (
            state.conversation_id.clone(),
            state.message_id.clone(),
            state.content.clone(),
        );
        self.set_message_content(&conv_id, &msg_id, content)
    }

    /// Finalizes the streamed reply. An empty reply is replaced with a
    /// fallback so the transcript never shows a blank bubble. Returns the
    /// conversation to persist.
    pub fn finish_stream(&mut self, full_content: Option<&str>) -> Option<Conversation> {
        self.is_loading = false;
        self.request_conversation_id = None;
        let state = self.streaming.take()?;
        let content = full_content.unwrap_or(&state.content);
        let content = if content.trim().is_empty() {
            EMPTY_RESPONSE_TEXT.to_string()
        } else {
            content.to_string()
        };
        self.set_message_content(&state.conversation_id, &state.message_id, content);
        let conversation = self.get_mut(&state.conversation_id)?;
        conversation.touch();
        Some(conversation.clone())
    }

    /// Ends a failed stream. Partial text is kept; otherwise the placeholder
    /// becomes an apology. Returns the conversation to persist.
    pub fn fail_stream(&mut self) -> Option<Conversation> {
        self.is_loading = false;
        self.request_conversation_id = None;
        let state = self.streaming.take()?;
        if state.content.trim().is_empty() {
            self.set_message_content(
                &state.conversation_id,
                &state.message_id,
                ERROR_RESPONSE_TEXT.to_string(),
            );
        }
        let conversation = self.get_mut(&state.conversation_id)?;
        conversation.touch();
        Some(conversation.clone())
    }

    /// Records the reply of a non-streaming request.
    pub fn complete_request(
        &mut self,
        conversation_id: &str,
        content: &str,
        model: &str,
    ) -> Option<Conversation> {
        self.is_loading = false;
        self.request_conversation_id = None;
        let content = if content.trim().is_empty() {
            EMPTY_RESPONSE_TEXT
        } else {
            content
        };
        self.add_message(conversation_id, Role::Assistant, content, Some(model.to_string()))?;
        self.get(conversation_id).cloned()
    }

    pub fn fail_request(&mut self, conversation_id: &str) -> Option<Conversation> {
        self.is_loading = false;
        self.request_conversation_id = None;
        self.add_message(conversation_id, Role::Assistant, ERROR_RESPONSE_TEXT, None)?;
        self.get(conversation_id).cloned()
    }

    fn set_message_content(&mut self, conversation_id: &str, message_id: &str, content: String) -> bool {
        let Some(message) = self
            .get_mut(conversation_id)
            .and_then(|c| c.messages.iter_mut().find(|m| m.id == message_id))
        else {
            return false;
        };
        message.content = content;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONVERSATION_TITLE;
    use chrono::Duration;

    const MODEL: &str = "qwen/qwq-32b:free";

    fn store_with_one() -> (ConversationStore, String) {
        let mut store = ConversationStore::new();
        let created = store.load(Vec::new(), MODEL, Some("sys")).unwrap();
        (store, created.id)
    }

    #[test]
    fn load_empty_creates_and_selects() {
        let (store, id) = store_with_one();
        assert_eq!(store.active_id(), Some(id.as_str()));
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.active().unwrap().title, DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn load_selects_most_recently_updated() {
        let mut old = Conversation::new(MODEL, None);
        old.updated_at -= Duration::days(1);
        let recent = Conversation::new(MODEL, None);
        let mut store = ConversationStore::new();
        assert!(store.load(vec![old, recent.clone()], MODEL, None).is_none());
        assert_eq!(store.active_id(), Some(recent.id.as_str()));
    }

    #[test]
    fn first_user_message_names_conversation() {
        let (mut store, id) = store_with_one();
        store.add_message(&id, Role::User, "What is the capital of France and why?", None);
        assert_eq!(store.get(&id).unwrap().title, "What is the capital of France ...");

        store.add_message(&id, Role::User, "second question", None);
        assert_eq!(store.get(&id).unwrap().title, "What is the capital of France ...");
    }

    #[test]
    fn update_last_message_requires_matching_role() {
        let (mut store, id) = store_with_one();
        store.add_message(&id, Role::User, "hi", None);
        assert!(!store.update_last_message(&id, Role::Assistant, "nope"));
        assert_eq!(store.get(&id).unwrap().messages.last().unwrap().content, "hi");

        let msg_id = store.add_message(&id, Role::Assistant, "draft", None).unwrap();
        assert!(store.update_last_message(&id, Role::Assistant, "final"));
        let last = store.get(&id).unwrap().messages.last().unwrap();
        assert_eq!(last.content, "final");
        assert_eq!(last.id, msg_id);
    }

    #[test]
    fn update_title_rejects_blank() {
        let (mut store, id) = store_with_one();
        assert!(!store.update_title(&id, "   "));
        assert!(store.update_title(&id, "  Trip plan "));
        assert_eq!(store.get(&id).unwrap().title, "Trip plan");
        assert!(!store.update_title("missing", "x"));
    }

    #[test]
    fn update_model_changes_conversation_model() {
        let (mut store, id) = store_with_one();
        assert!(store.update_model(&id, "deepseek/deepseek-r1:free"));
        assert!(!store.update_model(&id, "deepseek/deepseek-r1:free"));
        assert_eq!(store.get(&id).unwrap().model, "deepseek/deepseek-r1:free");
    }

    #[test]
    fn set_active_ignores_unknown_ids() {
        let (mut store, id) = store_with_one();
        assert!(!store.set_active("nope"));
        assert_eq!(store.active_id(), Some(id.as_str()));
    }

    #[test]
    fn deleting_active_selects_first_remaining() {
        let (mut store, first) = store_with_one();
        let second = store.create_new_conversation(MODEL, None).id.clone();
        assert_eq!(store.active_id(), Some(second.as_str()));

        assert_eq!(store.delete_conversation(&second, MODEL, None), DeleteOutcome::Removed);
        assert_eq!(store.active_id(), Some(first.as_str()));
    }

    #[test]
    fn deleting_inactive_keeps_selection() {
        let (mut store, first) = store_with_one();
        let second = store.create_new_conversation(MODEL, None).id.clone();
        assert_eq!(store.delete_conversation(&first, MODEL, None), DeleteOutcome::Removed);
        assert_eq!(store.active_id(), Some(second.as_str()));
        assert_eq!(store.delete_conversation("missing", MODEL, None), DeleteOutcome::NotFound);
    }

    #[test]
    fn deleting_last_creates_fresh_conversation() {
        let (mut store, id) = store_with_one();
        match store.delete_conversation(&id, MODEL, Some("sys")) {
            DeleteOutcome::Replaced(fresh) => {
                assert_ne!(fresh.id, id);
                assert_eq!(store.active_id(), Some(fresh.id.as_str()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.conversations().len(), 1);
    }

    #[test]
    fn streaming_accumulates_into_placeholder() {
        let (mut store, id) = store_with_one();
        store.add_message(&id, Role::User, "hi", None);
        let msg_id = store.begin_stream(&id, MODEL).unwrap();
        assert!(store.is_loading());
        assert_eq!(store.streaming_message_id(), Some(msg_id.as_str()));

        assert!(store.append_chunk("Hel"));
        assert!(store.append_chunk("lo"));
        assert_eq!(store.streaming_content(), "Hello");
        let placeholder = store.get(&id).unwrap().messages.last().unwrap();
        assert_eq!(placeholder.content, "Hello");
        assert_eq!(placeholder.model.as_deref(), Some(MODEL));

        let saved = store.finish_stream(None).unwrap();
        assert_eq!(saved.messages.last().unwrap().content, "Hello");
        assert!(!store.is_loading());
        assert!(store.streaming().is_none());
        assert!(!store.append_chunk("late"));
    }

    #[test]
    fn empty_stream_gets_fallback_text() {
        let (mut store, id) = store_with_one();
        store.begin_stream(&id, MODEL).unwrap();
        let saved = store.finish_stream(Some("")).unwrap();
        assert_eq!(saved.messages.last().unwrap().content, EMPTY_RESPONSE_TEXT);
    }

    #[test]
    fn failed_stream_keeps_partial_or_apologizes() {
        let (mut store, id) = store_with_one();
        store.begin_stream(&id, MODEL).unwrap();
        store.append_chunk("partial");
        let saved = store.fail_stream().unwrap();
        assert_eq!(saved.messages.last().unwrap().content, "partial");

        store.begin_stream(&id, MODEL).unwrap();
        let saved = store.fail_stream().unwrap();
        assert_eq!(saved.messages.last().unwrap().content, ERROR_RESPONSE_TEXT);
    }

    #[test]
    fn deleting_streaming_conversation_ends_stream() {
        let (mut store, id) = store_with_one();
        store.create_new_conversation(MODEL, None);
        store.begin_stream(&id, MODEL).unwrap();
        store.delete_conversation(&id, MODEL, None);
        assert!(store.streaming().is_none());
        assert!(!store.is_loading());
        assert!(store.finish_stream(None).is_none());
    }

    #[test]
    fn non_streaming_request_lifecycle() {
        let (mut store, id) = store_with_one();
        store.begin_request(&id);
        assert!(store.is_loading());
        assert_eq!(store.request_conversation_id(), Some(id.as_str()));
        let saved = store.complete_request(&id, "  ", MODEL).unwrap();
        assert_eq!(saved.messages.last().unwrap().content, EMPTY_RESPONSE_TEXT);
        assert!(!store.is_loading());
        assert!(store.request_conversation_id().is_none());

        let saved = store.fail_request(&id).unwrap();
        assert_eq!(saved.messages.last().unwrap().content, ERROR_RESPONSE_TEXT);
    }

    #[test]
    fn deleting_conversation_with_pending_request_stops_loading() {
        let (mut store, first) = store_with_one();
        let second = store.create_new_conversation(MODEL, None).id.clone();
        store.set_active(&first);
        store.add_message(&first, Role::User, "hi", None);
        store.begin_request(&first);

        assert_eq!(store.delete_conversation(&first, MODEL, None), DeleteOutcome::Removed);
        assert!(!store.is_loading());
        assert!(store.request_conversation_id().is_none());
        assert_eq!(store.active_id(), Some(second.as_str()));

        // A new request started afterwards is not mistaken for the old one
        store.begin_request(&second);
        assert_eq!(store.request_conversation_id(), Some(second.as_str()));
        assert_ne!(store.request_conversation_id(), Some(first.as_str()));
    }

    #[test]
    fn deleting_other_conversation_keeps_pending_request() {
        let (mut store, first) = store_with_one();
        let second = store.create_new_conversation(MODEL, None).id.clone();
        store.begin_request(&second);
        store.delete_conversation(&first, MODEL, None);
        assert!(store.is_loading());
        assert_eq!(store.request_conversation_id(), Some(second.as_str()));
    }

    #[test]
    fn clearing_with_pending_request_stops_loading() {
        let (mut store, id) = store_with_one();
        store.begin_request(&id);
        store.clear(MODEL, None);
        assert!(!store.is_loading());
        assert!(store.request_conversation_id().is_none());
        assert!(store.fail_request(&id).is_none());
    }

    #[test]
    fn deleting_active_follows_list_order_not_recency() {
        let (mut store, oldest) = store_with_one();
        let middle = store.create_new_conversation(MODEL, None).id.clone();
        let newest = store.create_new_conversation(MODEL, None).id.clone();
        // The oldest-listed conversation was updated most recently
        store.get_mut(&oldest).unwrap().updated_at += Duration::minutes(5);

        store.delete_conversation(&newest, MODEL, None);
        assert_eq!(store.active_id(), Some(middle.as_str()));
    }

    #[test]
    fn clear_leaves_single_fresh_conversation() {
        let (mut store, _) = store_with_one();
        store.create_new_conversation(MODEL, None);
        let fresh = store.clear(MODEL, None);
        assert_eq!(store.conversations().len(), 1);
        assert_eq!(store.active_id(), Some(fresh.id.as_str()));
    }

    #[test]
    fn sidebar_order_is_recent_first() {
        let (mut store, first) = store_with_one();
        let second = store.create_new_conversation(MODEL, None).id.clone();
        store.get_mut(&first).unwrap().updated_at += Duration::minutes(1);
        let order: Vec<_> = store.sorted_for_sidebar().iter().map(|c| c.id.clone()).collect();
        assert_eq!(order, vec![first, second]);
    }
}
