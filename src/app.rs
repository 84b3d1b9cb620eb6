use std::sync::Arc;

use adw::prelude::*;
use relm4::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::models::catalog::{default_models, display_name, merge_remote};
use crate::models::{Conversation, ModelInfo, Role};
use crate::providers::{ChatProvider, OpenRouterProvider};
use crate::services::chat::{self, ChatResult, StreamResult};
use crate::services::keyring::{self, API_KEY_REF};
use crate::services::settings::{AppSettings, SettingChange};
use crate::services::store::DeleteOutcome;
use crate::services::{export, history};
use crate::services::{ConversationStore, Database, KeyringService, SettingsService};
use crate::ui::chat_view::{ChatView, ChatViewInit, ChatViewMsg, ChatViewOutput};
use crate::ui::model_selector::{ModelSelector, ModelSelectorMsg, ModelSelectorOutput};
use crate::ui::preferences::api_page::{ApiPageInit, ApiPageMsg};
use crate::ui::preferences::appearance_page::{apply_color_scheme, apply_font_size};
use crate::ui::sidebar::{Sidebar, SidebarEntry, SidebarMsg, SidebarOutput};
use crate::ui::window::PreferencesHandles;

pub struct App {
    db: Option<Database>,
    keyring: Option<KeyringService>,
    provider: Arc<dyn ChatProvider>,
    base_url: String,
    api_key: Option<String>,
    key_stored: bool,
    store: ConversationStore,
    settings: AppSettings,
    sidebar: Controller<Sidebar>,
    chat_view: Controller<ChatView>,
    model_selector: Controller<ModelSelector>,
    toast_overlay: adw::ToastOverlay,
    window_title: adw::WindowTitle,
    initialized: bool,
    preferences: Option<PreferencesHandles>,
    stream_cancel_token: Option<CancellationToken>,
}

#[derive(Debug)]
pub enum AppMsg {
    NewChat,
    ConversationSelected(String),
    DeleteConversation(String),
    RenameConversation(String, String),
    ExportConversation(String),
    ExportActive,
    ArchiveActive,
    ClearHistory,
    ConfirmClearHistory,
    SendMessage(String),
    StopGeneration,
    ModelSelected(String),
    ToggleTheme,
    SettingChanged(SettingChange),
    SaveApiKey(String),
    RemoveApiKey,
    ShowPreferences,
    ShowShortcuts,
    ShowAbout,
}

/// Everything read from disk and the keyring before the window is usable.
#[derive(Debug)]
pub struct InitState {
    db: Option<Database>,
    persistent: bool,
    keyring: Option<KeyringService>,
    key_stored: bool,
    api_key: Option<String>,
    settings: AppSettings,
    conversations: Vec<Conversation>,
}

#[derive(Debug)]
pub enum AppCmd {
    Initialized(Box<InitState>),
    RemoteModels(Vec<ModelInfo>),
    Stream(StreamResult),
    ChatFinished {
        conversation_id: String,
        result: Result<ChatResult, String>,
    },
    ApiKeySaved(Result<String, String>),
    ApiKeyRemoved(Result<(), String>),
    Archived(Result<std::path::PathBuf, String>),
}

#[relm4::component(pub, async)]
impl AsyncComponent for App {
    type Init = ();
    type Input = AppMsg;
    type Output = ();
    type CommandOutput = AppCmd;

    view! {
        adw::ApplicationWindow {
            set_title: Some(config::APP_NAME),
            set_default_width: 1100,
            set_default_height: 760,
            set_width_request: 360,
            set_height_request: 480,

            #[local_ref]
            toast_overlay -> adw::ToastOverlay {},
        }
    }

    async fn init(
        _init: Self::Init,
        root: Self::Root,
        sender: AsyncComponentSender<Self>,
    ) -> AsyncComponentParts<Self> {
        let defaults = AppSettings::default();

        let sidebar = Sidebar::builder()
            .launch(())
            .forward(sender.input_sender(), |output| match output {
                SidebarOutput::NewChat => AppMsg::NewChat,
                SidebarOutput::ConversationSelected(id) => AppMsg::ConversationSelected(id),
                SidebarOutput::DeleteConversation(id) => AppMsg::DeleteConversation(id),
                SidebarOutput::RenameConversation(id, title) => {
                    AppMsg::RenameConversation(id, title)
                }
                SidebarOutput::ExportConversation(id) => AppMsg::ExportConversation(id),
            });

        let chat_view = ChatView::builder()
            .launch(ChatViewInit {
                send_with_enter: defaults.send_with_enter,
                animations: defaults.animations,
                auto_scroll: defaults.auto_scroll,
            })
            .forward(sender.input_sender(), |output| match output {
                ChatViewOutput::SendMessage(text) => AppMsg::SendMessage(text),
                ChatViewOutput::StopGeneration => AppMsg::StopGeneration,
            });

        let model_selector = ModelSelector::builder()
            .launch(default_models())
            .forward(sender.input_sender(), |output| match output {
                ModelSelectorOutput::ModelSelected(id) => AppMsg::ModelSelected(id),
            });

        let toast_overlay = adw::ToastOverlay::new();
        toast_overlay.set_hexpand(true);
        toast_overlay.set_vexpand(true);

        let window_title = adw::WindowTitle::new(config::DEFAULT_CONVERSATION_TITLE, "");

        let content_header = adw::HeaderBar::new();
        content_header.set_show_start_title_buttons(false);
        content_header.set_title_widget(Some(&window_title));
        content_header.pack_start(model_selector.widget());

        let menu = gio::Menu::new();
        let conversation_section = gio::Menu::new();
        conversation_section.append(Some("Export as Markdown…"), Some("app.export"));
        conversation_section.append(Some("Save to History Folder"), Some("app.archive"));
        conversation_section.append(Some("Clear All History…"), Some("app.clear-history"));
        menu.append_section(None, &conversation_section);
        let app_section = gio::Menu::new();
        app_section.append(Some("Preferences"), Some("app.preferences"));
        app_section.append(Some("Keyboard Shortcuts"), Some("app.show-shortcuts"));
        app_section.append(Some("About Bhima"), Some("app.about"));
        menu.append_section(None, &app_section);

        let menu_button = gtk::MenuButton::builder()
            .icon_name("open-menu-symbolic")
            .menu_model(&menu)
            .tooltip_text("Main Menu")
            .build();
        content_header.pack_end(&menu_button);

        let theme_button = gtk::Button::builder()
            .tooltip_text("Toggle theme")
            .build();
        let sender_theme = sender.input_sender().clone();
        theme_button.connect_clicked(move |_| {
            sender_theme.emit(AppMsg::ToggleTheme);
        });
        content_header.pack_end(&theme_button);

        let style_manager = adw::StyleManager::default();
        theme_button.set_icon_name(theme_icon(style_manager.is_dark()));
        let theme_button_dark = theme_button.clone();
        style_manager.connect_dark_notify(move |manager| {
            theme_button_dark.set_icon_name(theme_icon(manager.is_dark()));
        });

        let content_toolbar = adw::ToolbarView::new();
        content_toolbar.add_top_bar(&content_header);
        content_toolbar.set_content(Some(chat_view.widget()));

        let content_page = adw::NavigationPage::builder()
            .title("Chat")
            .tag("content")
            .child(&content_toolbar)
            .build();

        let sidebar_page = adw::NavigationPage::builder()
            .title("Conversations")
            .tag("sidebar")
            .child(sidebar.widget())
            .build();

        let split_view = adw::NavigationSplitView::new();
        split_view.set_hexpand(true);
        split_view.set_vexpand(true);
        split_view.set_min_sidebar_width(220.0);
        split_view.set_max_sidebar_width(320.0);
        split_view.set_sidebar(Some(&sidebar_page));
        split_view.set_content(Some(&content_page));

        match adw::BreakpointCondition::parse("max-width: 600px") {
            Ok(condition) => {
                let breakpoint = adw::Breakpoint::new(condition);
                breakpoint.add_setter(&split_view, "collapsed", Some(&true.to_value()));
                breakpoint.add_setter(
                    &content_header,
                    "show-start-title-buttons",
                    Some(&true.to_value()),
                );
                root.add_breakpoint(breakpoint);
            }
            Err(e) => tracing::warn!("Invalid breakpoint condition: {}", e),
        }

        toast_overlay.set_child(Some(&split_view));

        let model = App {
            db: None,
            keyring: None,
            provider: Arc::new(OpenRouterProvider::new()),
            base_url: config::api_base_url(),
            api_key: None,
            key_stored: false,
            store: ConversationStore::new(),
            settings: defaults,
            sidebar,
            chat_view,
            model_selector,
            toast_overlay: toast_overlay.clone(),
            window_title,
            initialized: false,
            preferences: None,
            stream_cancel_token: None,
        };

        let widgets = view_output!();

        let app = relm4::main_adw_application();
        let actions: [(&str, &[&str], fn() -> AppMsg); 9] = [
            ("new-chat", &["<Control>n"], || AppMsg::NewChat),
            ("preferences", &["<Control>comma"], || AppMsg::ShowPreferences),
            ("show-shortcuts", &["<Control>slash"], || AppMsg::ShowShortcuts),
            ("toggle-theme", &["<Control><Shift>l"], || AppMsg::ToggleTheme),
            ("stop-generation", &["Escape"], || AppMsg::StopGeneration),
            ("export", &[], || AppMsg::ExportActive),
            ("archive", &[], || AppMsg::ArchiveActive),
            ("clear-history", &[], || AppMsg::ClearHistory),
            ("about", &[], || AppMsg::ShowAbout),
        ];
        for (name, accels, msg) in actions {
            let action = gio::SimpleAction::new(name, None);
            let action_sender = sender.input_sender().clone();
            action.connect_activate(move |_, _| {
                action_sender.emit(msg());
            });
            app.add_action(&action);
            if !accels.is_empty() {
                app.set_accels_for_action(&format!("app.{name}"), accels);
            }
        }

        sender.command(|out, _| {
            Box::pin(async move {
                let state = Self::load_state().await;
                let _ = out.send(AppCmd::Initialized(Box::new(state)));
            })
        });

        AsyncComponentParts { model, widgets }
    }

    async fn update(
        &mut self,
        msg: Self::Input,
        sender: AsyncComponentSender<Self>,
        root: &Self::Root,
    ) {
        if !self.initialized {
            match &msg {
                AppMsg::ShowShortcuts | AppMsg::ShowAbout => {}
                _ => {
                    tracing::debug!("Ignoring {:?} before startup finished", msg);
                    return;
                }
            }
        }

        match msg {
            AppMsg::NewChat => {
                let conversation = self
                    .store
                    .create_new_conversation(
                        &self.settings.default_model,
                        self.settings.effective_system_prompt(),
                    )
                    .clone();
                tracing::info!("Created conversation {}", conversation.id);
                self.persist(&conversation).await;
                self.show_active();
                self.refresh_sidebar();
            }
            AppMsg::ConversationSelected(id) => {
                if self.store.set_active(&id) {
                    self.show_active();
                }
            }
            AppMsg::DeleteConversation(id) => {
                self.handle_delete(id).await;
            }
            AppMsg::RenameConversation(id, title) => {
                if self.store.update_title(&id, &title) {
                    if let Some(conversation) = self.store.get(&id).cloned() {
                        self.persist(&conversation).await;
                    }
                    self.sync_header();
                    self.refresh_sidebar();
                }
            }
            AppMsg::ExportConversation(id) => {
                self.handle_export(&id, root);
            }
            AppMsg::ExportActive => {
                if let Some(id) = self.store.active_id().map(str::to_string) {
                    self.handle_export(&id, root);
                }
            }
            AppMsg::ArchiveActive => {
                let Some(conversation) = self.store.active().cloned() else {
                    return;
                };
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let result = tokio::task::spawn_blocking(move || {
                            export::archive_conversation(&config::data_dir()?, &conversation)
                        })
                        .await
                        .map_err(anyhow::Error::from)
                        .and_then(|r| r)
                        .map_err(|e| format!("{:#}", e));
                        let _ = out.send(AppCmd::Archived(result));
                    })
                });
            }
            AppMsg::ClearHistory => {
                present_clear_dialog(root, sender.input_sender().clone());
            }
            AppMsg::ConfirmClearHistory => {
                self.cancel_generation();
                self.chat_view.emit(ChatViewMsg::SetLoading(false));
                let fresh = self.store.clear(
                    &self.settings.default_model,
                    self.settings.effective_system_prompt(),
                );
                if let Some(db) = &self.db {
                    if let Err(e) = history::clear_history(db).await {
                        tracing::error!("Failed to clear history: {:#}", e);
                        self.show_toast("Failed to clear history");
                    }
                }
                self.persist(&fresh).await;
                self.show_active();
                self.refresh_sidebar();
                self.show_toast("History cleared");
            }
            AppMsg::SendMessage(text) => {
                self.handle_send_message(text, sender).await;
            }
            AppMsg::StopGeneration => {
                if let Some(token) = &self.stream_cancel_token {
                    tracing::info!("Stopping generation");
                    token.cancel();
                }
            }
            AppMsg::ModelSelected(model) => {
                let Some(id) = self.store.active_id().map(str::to_string) else {
                    return;
                };
                if self.store.update_model(&id, &model) {
                    tracing::info!("Conversation {} now uses {}", id, model);
                    if let Some(conversation) = self.store.get(&id).cloned() {
                        self.persist(&conversation).await;
                    }
                    self.sidebar.emit(SidebarMsg::SetActiveModel(model));
                    self.sync_header();
                }
            }
            AppMsg::ToggleTheme => {
                let system_is_dark = adw::StyleManager::default().is_dark();
                self.settings.toggle_theme(system_is_dark);
                apply_color_scheme(self.settings.theme);
                self.save_settings().await;
            }
            AppMsg::SettingChanged(change) => {
                self.apply_setting(change);
                self.save_settings().await;
            }
            AppMsg::SaveApiKey(key) => {
                let Some(keyring) = self.keyring.clone() else {
                    // Without a keyring the key still works for this session
                    self.use_api_key(Some(key), &sender);
                    self.show_toast("No keyring available; the key will not be remembered");
                    return;
                };
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let result = keyring
                            .store(API_KEY_REF, &key)
                            .await
                            .map(|()| key)
                            .map_err(|e| format!("{:#}", e));
                        let _ = out.send(AppCmd::ApiKeySaved(result));
                    })
                });
            }
            AppMsg::RemoveApiKey => {
                let Some(keyring) = self.keyring.clone() else {
                    return;
                };
                sender.command(move |out, _| {
                    Box::pin(async move {
                        let result = keyring
                            .delete(API_KEY_REF)
                            .await
                            .map_err(|e| format!("{:#}", e));
                        let _ = out.send(AppCmd::ApiKeyRemoved(result));
                    })
                });
            }
            AppMsg::ShowPreferences => {
                let api_status = ApiPageInit {
                    key_stored: self.key_stored,
                    from_env: keyring::env_api_key().is_some(),
                };
                self.preferences = Some(crate::ui::window::create_preferences_window(
                    root,
                    sender.input_sender(),
                    &self.settings,
                    api_status,
                ));
            }
            AppMsg::ShowShortcuts => {
                crate::ui::window::create_shortcuts_window(root);
            }
            AppMsg::ShowAbout => {
                crate::ui::window::create_about_dialog(root);
            }
        }
    }

    async fn update_cmd(
        &mut self,
        msg: Self::CommandOutput,
        sender: AsyncComponentSender<Self>,
        _root: &Self::Root,
    ) {
        match msg {
            AppCmd::Initialized(state) => {
                self.finish_init(*state, &sender).await;
            }
            AppCmd::RemoteModels(models) => {
                tracing::info!("Model list now has {} entries", models.len());
                self.model_selector.emit(ModelSelectorMsg::SetModels(models));
                if let Some(active) = self.store.active() {
                    self.model_selector
                        .emit(ModelSelectorMsg::SyncToModel(active.model.clone()));
                }
            }
            AppCmd::Stream(StreamResult::Token {
                conversation_id,
                message_id,
                delta,
            }) => {
                if self.store.streaming_message_id() != Some(message_id.as_str()) {
                    return;
                }
                self.store.append_chunk(&delta);
                if self.store.active_id() == Some(conversation_id.as_str()) {
                    self.chat_view.emit(ChatViewMsg::UpdateStreamingMessage(
                        message_id,
                        self.store.streaming_content().to_string(),
                    ));
                }
            }
            AppCmd::Stream(StreamResult::Done {
                conversation_id,
                message_id,
                full_content,
                tokens_in,
                tokens_out,
            }) => {
                if self.store.streaming_message_id() != Some(message_id.as_str()) {
                    return;
                }
                tracing::debug!(?tokens_in, ?tokens_out, "Reply finished");
                let conversation = self.store.finish_stream(Some(&full_content));
                self.complete_stream(&conversation_id, message_id, conversation)
                    .await;
            }
            AppCmd::Stream(StreamResult::Error {
                conversation_id,
                message_id,
                error,
            }) => {
                if self.store.streaming_message_id() != Some(message_id.as_str()) {
                    return;
                }
                tracing::error!("Streaming failed: {}", error);
                self.show_toast(&error);
                let conversation = self.store.fail_stream();
                self.complete_stream(&conversation_id, message_id, conversation)
                    .await;
            }
            AppCmd::ChatFinished {
                conversation_id,
                result,
            } => {
                if !reply_is_current(&self.store, &conversation_id) {
                    tracing::debug!("Dropping reply for abandoned conversation {}", conversation_id);
                    return;
                }
                self.stream_cancel_token = None;
                self.chat_view.emit(ChatViewMsg::SetLoading(false));

                let conversation = match result {
                    Ok(reply) => {
                        self.store
                            .complete_request(&reply.conversation_id, &reply.content, &reply.model)
                    }
                    Err(e) => {
                        tracing::error!("Chat request failed: {}", e);
                        self.show_toast(&e);
                        self.store.fail_request(&conversation_id)
                    }
                };

                if let Some(conversation) = conversation {
                    if self.store.active_id() == Some(conversation.id.as_str()) {
                        if let Some(reply) = conversation.messages.last() {
                            self.chat_view.emit(ChatViewMsg::AddMessage(reply.clone()));
                        }
                    }
                    self.persist(&conversation).await;
                    self.refresh_sidebar();
                }
            }
            AppCmd::ApiKeySaved(Ok(key)) => {
                tracing::info!("API key saved to keyring");
                self.key_stored = true;
                self.notify_api_page();
                if keyring::env_api_key().is_none() {
                    self.use_api_key(Some(key), &sender);
                }
                self.show_toast("API key saved");
            }
            AppCmd::ApiKeySaved(Err(e)) => {
                tracing::error!("Failed to save API key: {}", e);
                self.show_toast("Failed to save API key");
            }
            AppCmd::ApiKeyRemoved(Ok(())) => {
                tracing::info!("API key removed from keyring");
                self.key_stored = false;
                self.notify_api_page();
                self.use_api_key(keyring::env_api_key(), &sender);
                self.show_toast("API key removed");
            }
            AppCmd::ApiKeyRemoved(Err(e)) => {
                tracing::error!("Failed to remove API key: {}", e);
                self.show_toast("Failed to remove API key");
            }
            AppCmd::Archived(Ok(path)) => {
                tracing::info!("Archived conversation to {}", path.display());
                self.show_toast(&format!("Saved to {}", path.display()));
            }
            AppCmd::Archived(Err(e)) => {
                tracing::error!("Failed to archive conversation: {}", e);
                self.show_toast(&format!("Save failed: {}", e));
            }
        }
    }
}

impl App {
    async fn load_state() -> InitState {
        let (db, persistent) = match Database::new().await {
            Ok(db) => (Some(db), true),
            Err(e) => {
                tracing::error!("Failed to open conversation store: {:#}", e);
                (Database::new_in_memory().ok(), false)
            }
        };

        let keyring = match KeyringService::new().await {
            Ok(keyring) => Some(keyring),
            Err(e) => {
                tracing::warn!("Keyring unavailable: {:#}", e);
                None
            }
        };
        let key_stored = match &keyring {
            Some(keyring) => matches!(keyring.retrieve(API_KEY_REF).await, Ok(Some(_))),
            None => false,
        };
        let api_key = keyring::resolve_api_key(keyring.as_ref()).await;

        let (settings, conversations) = match &db {
            Some(db) => {
                let settings = SettingsService::load(db).await;
                let conversations = history::load_conversations(db).await.unwrap_or_else(|e| {
                    tracing::error!("Failed to load conversations: {:#}", e);
                    Vec::new()
                });
                (settings, conversations)
            }
            None => (AppSettings::default(), Vec::new()),
        };

        InitState {
            db,
            persistent,
            keyring,
            key_stored,
            api_key,
            settings,
            conversations,
        }
    }

    async fn finish_init(&mut self, state: InitState, sender: &AsyncComponentSender<Self>) {
        tracing::info!("Loaded {} conversations", state.conversations.len());

        self.db = state.db;
        self.keyring = state.keyring;
        self.key_stored = state.key_stored;
        self.settings = state.settings;
        self.initialized = true;

        apply_color_scheme(self.settings.theme);
        apply_font_size(self.settings.font_size);
        self.chat_view
            .emit(ChatViewMsg::SetSendWithEnter(self.settings.send_with_enter));
        self.chat_view
            .emit(ChatViewMsg::SetAnimations(self.settings.animations));
        self.chat_view
            .emit(ChatViewMsg::SetAutoScroll(self.settings.auto_scroll));

        let created = self.store.load(
            state.conversations,
            &self.settings.default_model,
            self.settings.effective_system_prompt(),
        );
        if let Some(conversation) = created {
            self.persist(&conversation).await;
        }
        self.show_active();
        self.refresh_sidebar();

        if !state.persistent {
            self.show_toast("Could not open the history database; chats will not be saved");
        }

        self.use_api_key(state.api_key, sender);
        if self.api_key.is_none() {
            self.show_toast("Add an OpenRouter API key in Preferences to start chatting");
        }
    }

    /// Switches the key used for requests and refreshes the model list
    /// from the provider when one is available.
    fn use_api_key(&mut self, api_key: Option<String>, sender: &AsyncComponentSender<Self>) {
        self.api_key = api_key;
        let Some(api_key) = self.api_key.clone() else {
            return;
        };

        let provider = self.provider.clone();
        let base_url = self.base_url.clone();
        sender.command(move |out, _| {
            Box::pin(async move {
                match provider.list_models(&api_key, &base_url).await {
                    Ok(remote) => {
                        let remote = remote.into_iter().map(ModelInfo::from).collect();
                        let _ = out.send(AppCmd::RemoteModels(merge_remote(default_models(), remote)));
                    }
                    Err(e) => tracing::warn!("Could not fetch model list: {}", e),
                }
            })
        });
    }

    async fn handle_send_message(&mut self, text: String, sender: AsyncComponentSender<Self>) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.store.is_loading() {
            self.show_toast("Wait for the current reply to finish");
            return;
        }
        let Some(api_key) = self.api_key.clone() else {
            self.show_toast("Add an OpenRouter API key in Preferences to start chatting");
            return;
        };
        let Some(conversation_id) = self.store.active_id().map(str::to_string) else {
            return;
        };

        if self
            .store
            .add_message(&conversation_id, Role::User, &text, None)
            .is_none()
        {
            return;
        }
        let Some(conversation) = self.store.get(&conversation_id).cloned() else {
            return;
        };
        if let Some(user_message) = conversation.messages.last() {
            self.chat_view
                .emit(ChatViewMsg::AddMessage(user_message.clone()));
        }
        self.persist(&conversation).await;
        self.sync_header();
        self.refresh_sidebar();

        let model = conversation.model.clone();
        let request = chat::build_request(
            api_key,
            self.base_url.clone(),
            &model,
            chat::messages_to_chat_messages(&conversation.messages),
            &self.settings,
        );
        tracing::info!(
            "Sending {} messages to {} (stream: {})",
            request.messages.len(),
            model,
            self.settings.stream_responses
        );

        let cancel_token = CancellationToken::new();
        self.stream_cancel_token = Some(cancel_token.clone());
        self.chat_view.emit(ChatViewMsg::SetLoading(true));
        let provider = self.provider.clone();

        if self.settings.stream_responses {
            let Some(message_id) = self.store.begin_stream(&conversation_id, &model) else {
                return;
            };
            let placeholder = self
                .store
                .get(&conversation_id)
                .and_then(|c| c.messages.iter().find(|m| m.id == message_id).cloned());
            if let Some(placeholder) = placeholder {
                self.chat_view
                    .emit(ChatViewMsg::AddStreamingMessage(placeholder));
            }

            sender.command(move |out, _| {
                Box::pin(async move {
                    chat::run_streaming(
                        provider,
                        request,
                        conversation_id,
                        message_id,
                        cancel_token,
                        move |event| {
                            let _ = out.send(AppCmd::Stream(event));
                        },
                    )
                    .await;
                })
            });
        } else {
            self.store.begin_request(&conversation_id);
            sender.command(move |out, _| {
                Box::pin(async move {
                    let result = tokio::select! {
                        result = chat::send_non_streaming(provider, conversation_id.clone(), request) => result,
                        _ = cancel_token.cancelled() => Err("Generation stopped".to_string()),
                    };
                    let _ = out.send(AppCmd::ChatFinished {
                        conversation_id,
                        result,
                    });
                })
            });
        }
    }

    async fn complete_stream(
        &mut self,
        conversation_id: &str,
        message_id: String,
        conversation: Option<Conversation>,
    ) {
        self.stream_cancel_token = None;
        self.chat_view.emit(ChatViewMsg::SetLoading(false));
        let Some(conversation) = conversation else {
            return;
        };

        if self.store.active_id() == Some(conversation_id) {
            let final_text = conversation
                .messages
                .iter()
                .find(|m| m.id == message_id)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.chat_view
                .emit(ChatViewMsg::StreamingComplete(message_id, final_text));
        }
        self.persist(&conversation).await;
        self.refresh_sidebar();
    }

    async fn handle_delete(&mut self, id: String) {
        let interrupts_reply = reply_is_current(&self.store, &id);
        let was_active = self.store.active_id() == Some(id.as_str());

        let outcome = self.store.delete_conversation(
            &id,
            &self.settings.default_model,
            self.settings.effective_system_prompt(),
        );
        if outcome == DeleteOutcome::NotFound {
            return;
        }
        if interrupts_reply {
            self.cancel_generation();
            self.chat_view.emit(ChatViewMsg::SetLoading(false));
        }

        if let Some(db) = &self.db {
            if let Err(e) = history::delete_conversation(db, &id).await {
                tracing::error!("Failed to delete conversation {}: {:#}", id, e);
                self.show_toast("Failed to delete conversation");
            }
        }
        if let DeleteOutcome::Replaced(fresh) = outcome {
            self.persist(&fresh).await;
        }

        if was_active {
            self.show_active();
        }
        self.refresh_sidebar();
        self.show_toast("Conversation deleted");
    }

    fn handle_export(&self, id: &str, root: &adw::ApplicationWindow) {
        let Some(conversation) = self.store.get(id) else {
            self.show_toast("Conversation not found");
            return;
        };

        let markdown = export::export_to_markdown(conversation);
        let filename = format!("{}.md", conversation.title.replace(['/', '\\'], "_"));

        let dialog = gtk::FileDialog::builder()
            .title("Export Conversation")
            .initial_name(filename.as_str())
            .build();

        let toast_overlay = self.toast_overlay.clone();
        dialog.save(Some(root), None::<&gio::Cancellable>, move |result| {
            // An Err here means the user dismissed the dialog
            let Ok(file) = result else {
                return;
            };
            let Some(path) = file.path() else {
                return;
            };
            let message = match std::fs::write(&path, &markdown) {
                Ok(()) => "Conversation exported".to_string(),
                Err(e) => {
                    tracing::error!("Export to {} failed: {}", path.display(), e);
                    format!("Export failed: {}", e)
                }
            };
            let toast = adw::Toast::new(&message);
            toast.set_timeout(3);
            toast_overlay.add_toast(toast);
        });
    }

    fn apply_setting(&mut self, change: SettingChange) {
        match &change {
            SettingChange::Theme(theme) => {
                apply_color_scheme(*theme);
            }
            SettingChange::FontSize(size) => apply_font_size(*size),
            SettingChange::Animations(on) => {
                self.chat_view.emit(ChatViewMsg::SetAnimations(*on));
            }
            SettingChange::AutoScroll(on) => {
                self.chat_view.emit(ChatViewMsg::SetAutoScroll(*on));
            }
            SettingChange::SendWithEnter(on) => {
                self.chat_view.emit(ChatViewMsg::SetSendWithEnter(*on));
            }
            SettingChange::StreamResponses(_)
            | SettingChange::Temperature(_)
            | SettingChange::DefaultModel(_)
            | SettingChange::SystemPrompt(_) => {}
        }
        self.settings.apply(change);
    }

    fn cancel_generation(&mut self) {
        if let Some(token) = self.stream_cancel_token.take() {
            token.cancel();
        }
    }

    async fn persist(&self, conversation: &Conversation) {
        let Some(db) = &self.db else {
            return;
        };
        if let Err(e) = history::save_conversation(db, conversation).await {
            tracing::error!("Failed to save conversation {}: {:#}", conversation.id, e);
            self.show_toast("Failed to save conversation");
        }
    }

    async fn save_settings(&self) {
        let Some(db) = &self.db else {
            return;
        };
        if let Err(e) = SettingsService::save(db, &self.settings).await {
            tracing::error!("Failed to save settings: {:#}", e);
            self.show_toast("Failed to save settings");
        }
    }

    fn show_active(&self) {
        let Some(conversation) = self.store.active() else {
            return;
        };
        self.chat_view
            .emit(ChatViewMsg::LoadMessages(conversation.messages.clone()));
        self.model_selector
            .emit(ModelSelectorMsg::SyncToModel(conversation.model.clone()));
        self.sidebar
            .emit(SidebarMsg::SetActiveModel(conversation.model.clone()));
        self.sync_header();
    }

    fn refresh_sidebar(&self) {
        let entries = self
            .store
            .sorted_for_sidebar()
            .into_iter()
            .map(SidebarEntry::from)
            .collect();
        self.sidebar.emit(SidebarMsg::SetConversations {
            entries,
            active_id: self.store.active_id().map(str::to_string),
        });
    }

    fn sync_header(&self) {
        if let Some(conversation) = self.store.active() {
            self.window_title.set_title(&conversation.title);
            self.window_title
                .set_subtitle(&display_name(&conversation.model));
        }
    }

    fn notify_api_page(&self) {
        if let Some(prefs) = &self.preferences {
            prefs.api_page.emit(ApiPageMsg::KeyStored(self.key_stored));
        }
    }

    fn show_toast(&self, message: &str) {
        let toast = adw::Toast::new(message);
        toast.set_timeout(3);
        self.toast_overlay.add_toast(toast);
    }
}

/// Whether the reply in flight belongs to `conversation_id`. Replies for
/// conversations deleted or cleared since the request started are dropped.
fn reply_is_current(store: &ConversationStore, conversation_id: &str) -> bool {
    store.request_conversation_id() == Some(conversation_id)
}

/// The button shows the scheme a click switches to.
fn theme_icon(is_dark: bool) -> &'static str {
    if is_dark {
        "weather-clear-symbolic"
    } else {
        "weather-clear-night-symbolic"
    }
}

fn present_clear_dialog(root: &adw::ApplicationWindow, sender: relm4::Sender<AppMsg>) {
    let dialog = adw::AlertDialog::builder()
        .heading("Clear All History?")
        .body("Every conversation will be deleted. This action cannot be undone.")
        .build();
    dialog.add_response("cancel", "Cancel");
    dialog.add_response("clear", "Clear History");
    dialog.set_response_appearance("clear", adw::ResponseAppearance::Destructive);
    dialog.set_default_response(Some("cancel"));
    dialog.set_close_response("cancel");

    dialog.connect_response(None, move |_, response| {
        if response == "clear" {
            sender.emit(AppMsg::ConfirmClearHistory);
        }
    });

    dialog.present(Some(root));
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = "qwen/qwq-32b:free";

    #[test]
    fn test_reply_for_deleted_conversation_is_dropped() {
        let mut store = ConversationStore::new();
        let first = store.load(Vec::new(), MODEL, None).unwrap().id;
        let second = store.create_new_conversation(MODEL, None).id.clone();

        store.begin_request(&first);
        assert!(reply_is_current(&store, &first));
        assert!(!reply_is_current(&store, &second));

        store.delete_conversation(&first, MODEL, None);
        assert!(!store.is_loading());
        assert!(!reply_is_current(&store, &first));

        // The next send is accepted and its reply is not confused with the old one
        store.begin_request(&second);
        assert!(!reply_is_current(&store, &first));
        assert!(reply_is_current(&store, &second));
    }

    #[test]
    fn test_theme_icon_points_at_the_other_scheme() {
        assert_eq!(theme_icon(true), "weather-clear-symbolic");
        assert_eq!(theme_icon(false), "weather-clear-night-symbolic");
    }
}
