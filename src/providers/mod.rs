pub mod openrouter;
pub mod traits;
pub mod types;

pub use openrouter::OpenRouterProvider;
pub use traits::ChatProvider;
pub use types::{ChatMessage, ChatRequest, ProviderError, StreamEvent};
