use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{ChatRequest, ChatResponse, ProviderError, RemoteModel, StreamEvent};

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn list_models(
        &self,
        api_key: &str,
        base_url: &str,
    ) -> Result<Vec<RemoteModel>, ProviderError>;

    async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Streams the reply into `tx`. Once the response has been accepted the
    /// provider ends the channel with exactly one `Done` or `Error`; a failure
    /// before that point is returned as `Err` instead.
    async fn stream_message(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError>;
}
