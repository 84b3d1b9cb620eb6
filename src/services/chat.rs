use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::models::Message;
use crate::providers::{ChatMessage, ChatProvider, ChatRequest, StreamEvent};
use crate::services::settings::AppSettings;

/// Result from a non-streaming AI call, ready to be turned into an AppCmd.
#[derive(Debug)]
pub struct ChatResult {
    pub conversation_id: String,
    pub content: String,
    pub model: String,
}

/// Result from streaming: either a token update, completion, or error.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamResult {
    Token {
        conversation_id: String,
        message_id: String,
        delta: String,
    },
    Done {
        conversation_id: String,
        message_id: String,
        full_content: String,
        tokens_in: Option<i64>,
        tokens_out: Option<i64>,
    },
    Error {
        conversation_id: String,
        message_id: String,
        error: String,
    },
}

/// Build a `ChatRequest` from the conversation history and user settings.
pub fn build_request(
    api_key: String,
    base_url: String,
    model: &str,
    chat_messages: Vec<ChatMessage>,
    settings: &AppSettings,
) -> ChatRequest {
    let temperature = if (settings.temperature - 1.0).abs() < f32::EPSILON {
        None
    } else {
        Some(settings.temperature)
    };

    ChatRequest {
        api_key,
        model: model.to_string(),
        messages: chat_messages,
        base_url,
        temperature,
        max_tokens: None,
    }
}

/// Convert stored messages to the wire history. System messages are sent;
/// empty assistant placeholders are not.
pub fn messages_to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| !m.content.is_empty())
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect()
}

/// Run a non-streaming AI request. Returns a `ChatResult` on success.
pub async fn send_non_streaming(
    provider: Arc<dyn ChatProvider>,
    conversation_id: String,
    request: ChatRequest,
) -> Result<ChatResult, String> {
    match provider.send_message(request).await {
        Ok(response) => Ok(ChatResult {
            conversation_id,
            content: response.content,
            model: response.model,
        }),
        Err(e) => Err(format!("AI error: {}", e)),
    }
}

/// Run a streaming AI request, reporting progress through `on_event`.
///
/// Exactly one terminal `Done` or `Error` is reported. Stopping through
/// `cancel_token` keeps whatever text already arrived.
pub async fn run_streaming<F>(
    provider: Arc<dyn ChatProvider>,
    request: ChatRequest,
    conversation_id: String,
    message_id: String,
    cancel_token: CancellationToken,
    mut on_event: F,
) where
    F: FnMut(StreamResult) + Send,
{
    let (tx, mut rx) = tokio::sync::mpsc::channel::<StreamEvent>(64);

    let stream_handle = tokio::spawn(async move {
        if let Err(e) = provider.stream_message(request, tx.clone()).await {
            let _ = tx.send(StreamEvent::Error(e.to_string())).await;
        }
    });

    let mut accumulated = String::new();

    let terminal = loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                stream_handle.abort();
                break if accumulated.is_empty() {
                    StreamResult::Error {
                        conversation_id,
                        message_id,
                        error: "Generation stopped".to_string(),
                    }
                } else {
                    StreamResult::Done {
                        conversation_id,
                        message_id,
                        full_content: accumulated,
                        tokens_in: None,
                        tokens_out: None,
                    }
                };
            }
            event = rx.recv() => {
                match event {
                    Some(StreamEvent::Token(delta)) => {
                        accumulated.push_str(&delta);
                        on_event(StreamResult::Token {
                            conversation_id: conversation_id.clone(),
                            message_id: message_id.clone(),
                            delta,
                        });
                    }
                    Some(StreamEvent::Done { tokens_in, tokens_out }) => {
                        break StreamResult::Done {
                            conversation_id,
                            message_id,
                            full_content: accumulated,
                            tokens_in,
                            tokens_out,
                        };
                    }
                    Some(StreamEvent::Error(error)) => {
                        break StreamResult::Error {
                            conversation_id,
                            message_id,
                            error,
                        };
                    }
                    None => {
                        break if accumulated.is_empty() {
                            StreamResult::Error {
                                conversation_id,
                                message_id,
                                error: "Stream ended unexpectedly".to_string(),
                            }
                        } else {
                            StreamResult::Done {
                                conversation_id,
                                message_id,
                                full_content: accumulated,
                                tokens_in: None,
                                tokens_out: None,
                            }
                        };
                    }
                }
            }
        }
    };

    if let StreamResult::Done { tokens_in, tokens_out, .. } = &terminal {
        tracing::debug!(?tokens_in, ?tokens_out, "Stream finished");
    }
    on_event(terminal);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::providers::types::{ChatResponse, ProviderError, RemoteModel};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Replays a fixed script of events, optionally hanging afterwards.
    struct ScriptedProvider {
        events: Vec<StreamEvent>,
        hang: bool,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn list_models(&self, _: &str, _: &str) -> Result<Vec<RemoteModel>, ProviderError> {
            Ok(Vec::new())
        }

        async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            match &self.fail_with {
                Some(msg) => Err(ProviderError::RequestFailed(msg.clone())),
                None => Ok(ChatResponse {
                    content: "pong".into(),
                    model: request.model,
                    tokens_in: None,
                    tokens_out: None,
                }),
            }
        }

        async fn stream_message(
            &self,
            _request: ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<(), ProviderError> {
            if let Some(msg) = &self.fail_with {
                return Err(ProviderError::RequestFailed(msg.clone()));
            }
            for ev in &self.events {
                let _ = tx.send(ev.clone()).await;
            }
            if self.hang {
                tx.closed().await;
            }
            Ok(())
        }
    }

    fn request() -> ChatRequest {
        build_request(
            "key".into(),
            "http://localhost".into(),
            "m",
            vec![],
            &AppSettings::default(),
        )
    }

    async fn run(provider: ScriptedProvider, cancel: CancellationToken) -> Vec<StreamResult> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = results.clone();
        run_streaming(
            Arc::new(provider),
            request(),
            "c".into(),
            "m1".into(),
            cancel,
            move |r| sink.lock().unwrap().push(r),
        )
        .await;
        let out = results.lock().unwrap().clone();
        out
    }

    #[tokio::test]
    async fn test_tokens_then_done_carry_full_content() {
        let provider = ScriptedProvider {
            events: vec![
                StreamEvent::Token("Hel".into()),
                StreamEvent::Token("lo".into()),
                StreamEvent::Done {
                    tokens_in: Some(3),
                    tokens_out: Some(2),
                },
            ],
            hang: false,
            fail_with: None,
        };
        let results = run(provider, CancellationToken::new()).await;
        assert_eq!(results.len(), 3);
        match &results[2] {
            StreamResult::Done { full_content, tokens_out, .. } => {
                assert_eq!(full_content, "Hello");
                assert_eq!(*tokens_out, Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_failure_reports_error() {
        let provider = ScriptedProvider {
            events: vec![],
            hang: false,
            fail_with: Some("HTTP 500".into()),
        };
        let results = run(provider, CancellationToken::new()).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], StreamResult::Error { error, .. } if error.contains("HTTP 500")));
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_content() {
        let cancel = CancellationToken::new();
        let provider = ScriptedProvider {
            events: vec![StreamEvent::Token("partial".into())],
            hang: true,
            fail_with: None,
        };
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let results = run(provider, cancel).await;
        assert!(matches!(
            results.last(),
            Some(StreamResult::Done { full_content, .. }) if full_content == "partial"
        ));
    }

    #[tokio::test]
    async fn test_cancel_without_content_is_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provider = ScriptedProvider {
            events: vec![],
            hang: true,
            fail_with: None,
        };
        let results = run(provider, cancel).await;
        assert!(matches!(
            results.as_slice(),
            [StreamResult::Error { error, .. }] if error == "Generation stopped"
        ));
    }

    #[tokio::test]
    async fn test_closed_channel_without_terminal_event() {
        let provider = ScriptedProvider {
            events: vec![],
            hang: false,
            fail_with: None,
        };
        let results = run(provider, CancellationToken::new()).await;
        assert!(matches!(
            results.as_slice(),
            [StreamResult::Error { error, .. }] if error == "Stream ended unexpectedly"
        ));
    }

    #[tokio::test]
    async fn test_send_non_streaming() {
        let provider = ScriptedProvider {
            events: vec![],
            hang: false,
            fail_with: None,
        };
        let result = send_non_streaming(Arc::new(provider), "c".into(), request())
            .await
            .unwrap();
        assert_eq!(result.content, "pong");
        assert_eq!(result.conversation_id, "c");
    }

    #[test]
    fn test_messages_to_chat_messages_skips_placeholder() {
        let messages = vec![
            Message::new(Role::System, "sys", None),
            Message::new(Role::User, "hi", None),
            Message::new(Role::Assistant, "", None),
        ];
        let wire = messages_to_chat_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, Role::System);
    }

    #[test]
    fn test_default_temperature_is_omitted() {
        assert_eq!(request().temperature, None);
        let mut settings = AppSettings::default();
        settings.temperature = 0.4;
        let req = build_request("k".into(), "u".into(), "m", vec![], &settings);
        assert_eq!(req.temperature, Some(0.4));
    }
}
