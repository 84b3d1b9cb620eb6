use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::mpsc;

use super::models::*;
use crate::config::{REFERER, X_TITLE};
use crate::providers::traits::ChatProvider;
use crate::providers::types::{
    ChatMessage, ChatRequest, ChatResponse, ProviderError, RemoteModel, StreamEvent,
};

/// Client for OpenRouter's OpenAI-compatible chat-completions API.
pub struct OpenRouterProvider {
    client: Client,
}

impl OpenRouterProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn build_messages(messages: &[ChatMessage]) -> Vec<WireMessage<'_>> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect()
    }

    fn endpoint(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }

    fn with_headers(req: RequestBuilder, api_key: &str) -> RequestBuilder {
        req.header("Authorization", format!("Bearer {}", api_key))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", X_TITLE)
    }

    fn parse_error_message(status: StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
            return format!("HTTP {}: {}", status.as_u16(), parsed.error.message);
        }
        let body = body.trim();
        if body.is_empty() {
            format!("HTTP {}: Request failed", status.as_u16())
        } else {
            format!("HTTP {}: {}", status.as_u16(), body)
        }
    }

    /// Maps non-success statuses onto provider errors, passing successful
    /// responses through untouched.
    async fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthError(Self::parse_error_message(
                status, &body,
            )));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::RequestFailed(Self::parse_error_message(
            status, &body,
        )))
    }

    async fn post_completion(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<Response, ProviderError> {
        if request.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let body = CompletionRequest {
            model: &request.model,
            messages: Self::build_messages(&request.messages),
            stream,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = Self::endpoint(&request.base_url, "chat/completions");
        tracing::debug!(model = %request.model, stream, "POST {}", url);

        let response = Self::with_headers(self.client.post(&url), &request.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Self::check_status(response).await
    }
}

impl Default for OpenRouterProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    async fn list_models(
        &self,
        api_key: &str,
        base_url: &str,
    ) -> Result<Vec<RemoteModel>, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }

        let url = Self::endpoint(base_url, "models");
        let response = Self::with_headers(self.client.get(&url), api_key)
            .send()
            .await
            .map_err(|e| {
                ProviderError::NetworkError(format!("Failed to connect to {}: {}", base_url, e))
            })?;
        let response = Self::check_status(response).await?;

        let model_list: ModelList = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse model list: {}", e))
        })?;

        Ok(model_list
            .data
            .into_iter()
            .map(|m| RemoteModel {
                name: m.name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                context_length: m.context_length,
            })
            .collect())
    }

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response = self.post_completion(&request, false).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        let (tokens_in, tokens_out) = completion
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(ChatResponse {
            content,
            model: completion.model.unwrap_or(request.model),
            tokens_in,
            tokens_out,
        })
    }

    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        use super::stream::forward_sse_stream;

        let response = self.post_completion(&request, true).await?;
        forward_sse_stream(Box::pin(response.bytes_stream()), tx).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(base_url: &str) -> ChatRequest {
        ChatRequest {
            api_key: "sk-test".into(),
            model: "qwen/qwq-32b:free".into(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: "be brief".into(),
                },
                ChatMessage {
                    role: Role::User,
                    content: "hi".into(),
                },
            ],
            base_url: base_url.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn streams_tokens_from_endpoint() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                    : OPENROUTER PROCESSING\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                    data: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("x-title", X_TITLE))
            .and(body_partial_json(json!({
                "model": "qwen/qwq-32b:free",
                "stream": true,
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new();
        let (tx, mut rx) = mpsc::channel(16);
        provider
            .stream_message(request(&server.uri()), tx)
            .await
            .unwrap();

        let mut text = String::new();
        let mut done = false;
        while let Some(ev) = rx.recv().await {
            match ev {
                StreamEvent::Token(t) => text.push_str(&t),
                StreamEvent::Done { .. } => done = true,
                StreamEvent::Error(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(text, "Hello");
        assert!(done);
    }

    #[tokio::test]
    async fn non_success_status_includes_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "model not found", "code": 400}
            })))
            .mount(&server)
            .await;

        let (tx, _rx) = mpsc::channel(4);
        let err = OpenRouterProvider::new()
            .stream_message(request(&server.uri()), tx)
            .await
            .unwrap_err();
        match err {
            ProviderError::RequestFailed(msg) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("model not found"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("no"))
            .mount(&server)
            .await;

        let err = OpenRouterProvider::new()
            .send_message(request(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthError(_)));
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = OpenRouterProvider::new()
            .send_message(request(&server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let mut req = request("http://127.0.0.1:9");
        req.api_key = String::new();
        let err = OpenRouterProvider::new().send_message(req).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }

    #[tokio::test]
    async fn send_message_returns_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "qwen/qwq-32b:free",
                "choices": [{"message": {"role": "assistant", "content": "Hi there"}}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2}
            })))
            .mount(&server)
            .await;

        let resp = OpenRouterProvider::new()
            .send_message(request(&server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.tokens_in, Some(5));
        assert_eq!(resp.tokens_out, Some(2));
    }

    #[tokio::test]
    async fn lists_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "a/b:free", "name": "A B", "context_length": 8192},
                    {"id": "c/d"}
                ]
            })))
            .mount(&server)
            .await;

        let models = OpenRouterProvider::new()
            .list_models("sk-test", &server.uri())
            .await
            .unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "A B");
        assert_eq!(models[0].context_length, Some(8192));
        assert_eq!(models[1].name, "c/d");
    }
}
