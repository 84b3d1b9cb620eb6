pub mod api_page;
pub mod appearance_page;
pub mod chat_page;
