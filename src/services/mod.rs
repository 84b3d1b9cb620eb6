pub mod chat;
pub mod database;
pub mod export;
pub mod history;
pub mod keyring;
pub mod markdown;
pub mod placeholder;
pub mod settings;
pub mod store;

pub use database::Database;
pub use keyring::KeyringService;
pub use settings::SettingsService;
pub use store::ConversationStore;
