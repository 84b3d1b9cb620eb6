pub mod chat_view;
pub mod input_area;
pub mod message_widget;
pub mod model_selector;
pub mod preferences;
pub mod sidebar;
pub mod window;
