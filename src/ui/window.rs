use adw::prelude::*;
use relm4::prelude::*;

use crate::app::AppMsg;
use crate::config;
use crate::services::settings::AppSettings;
use crate::ui::preferences::api_page::{ApiPage, ApiPageInit, ApiPageOutput};
use crate::ui::preferences::appearance_page::{AppearancePage, AppearancePageOutput};
use crate::ui::preferences::chat_page::{ChatPage, ChatPageOutput};

/// Returned handles from `create_preferences_window` so the caller can store them.
pub struct PreferencesHandles {
    pub window: adw::PreferencesWindow,
    pub chat_page: Controller<ChatPage>,
    pub appearance_page: Controller<AppearancePage>,
    pub api_page: Controller<ApiPage>,
}

pub fn create_preferences_window(
    parent: &adw::ApplicationWindow,
    sender: &relm4::Sender<AppMsg>,
    settings: &AppSettings,
    api_status: ApiPageInit,
) -> PreferencesHandles {
    let chat_page = ChatPage::builder()
        .launch(settings.clone())
        .forward(sender, |output| match output {
            ChatPageOutput::Changed(change) => AppMsg::SettingChanged(change),
        });

    let appearance_page = AppearancePage::builder()
        .launch(settings.clone())
        .forward(sender, |output| match output {
            AppearancePageOutput::Changed(change) => AppMsg::SettingChanged(change),
        });

    let api_page = ApiPage::builder()
        .launch(api_status)
        .forward(sender, |output| match output {
            ApiPageOutput::SaveApiKey(key) => AppMsg::SaveApiKey(key),
            ApiPageOutput::RemoveApiKey => AppMsg::RemoveApiKey,
        });

    let prefs_window = adw::PreferencesWindow::new();
    prefs_window.set_title(Some("Preferences"));
    prefs_window.set_transient_for(Some(parent));
    prefs_window.set_modal(true);
    prefs_window.add(appearance_page.widget());
    prefs_window.add(chat_page.widget());
    prefs_window.add(api_page.widget());

    prefs_window.present();

    PreferencesHandles {
        window: prefs_window,
        chat_page,
        appearance_page,
        api_page,
    }
}

pub fn create_shortcuts_window(parent: &adw::ApplicationWindow) {
    let window = gtk::ShortcutsWindow::builder()
        .transient_for(parent)
        .modal(true)
        .build();

    let general_group = gtk::ShortcutsGroup::builder().title("General").build();
    for (title, accel) in [
        ("New chat", "<Control>n"),
        ("Preferences", "<Control>comma"),
        ("Keyboard shortcuts", "<Control>slash"),
        ("Toggle light/dark theme", "<Control><Shift>l"),
    ] {
        general_group.add_shortcut(
            &gtk::ShortcutsShortcut::builder()
                .title(title)
                .accelerator(accel)
                .build(),
        );
    }

    let chat_group = gtk::ShortcutsGroup::builder().title("Chat").build();
    for (title, accel) in [
        ("Send message", "Return"),
        ("New line", "<Shift>Return"),
        ("Send when Enter is set to new line", "<Control>Return"),
        ("Stop generation", "Escape"),
    ] {
        chat_group.add_shortcut(
            &gtk::ShortcutsShortcut::builder()
                .title(title)
                .accelerator(accel)
                .build(),
        );
    }

    let section = gtk::ShortcutsSection::builder()
        .title(config::APP_NAME)
        .build();
    section.add_group(&general_group);
    section.add_group(&chat_group);

    window.add_section(&section);
    window.present();
}

pub fn create_about_dialog(parent: &adw::ApplicationWindow) {
    let about = adw::AboutWindow::builder()
        .application_name(config::APP_NAME)
        .version(config::VERSION)
        .developer_name("Bhima Contributors")
        .license_type(gtk::License::Gpl30)
        .comments("Chat with hosted language models from the desktop")
        .website(config::REFERER)
        .application_icon(config::APP_ID)
        .build();
    about.set_transient_for(Some(parent));
    about.present();
}
