pub mod catalog;
pub mod conversation;
pub mod message;

pub use catalog::ModelInfo;
pub use conversation::Conversation;
pub use message::{Message, Role};
