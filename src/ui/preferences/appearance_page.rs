use std::cell::RefCell;

use adw::prelude::*;
use relm4::prelude::*;

use crate::services::settings::{AppSettings, FontSize, SettingChange, Theme};

pub struct AppearancePage {
    settings: AppSettings,
}

#[derive(Debug)]
pub enum AppearancePageMsg {
    ThemeChanged(u32),
    FontSizeChanged(u32),
    AnimationsToggled(bool),
}

#[derive(Debug)]
pub enum AppearancePageOutput {
    Changed(SettingChange),
}

#[relm4::component(pub)]
impl Component for AppearancePage {
    type Init = AppSettings;
    type Input = AppearancePageMsg;
    type Output = AppearancePageOutput;
    type CommandOutput = ();

    view! {
        adw::PreferencesPage {
            set_title: "Appearance",
            set_icon_name: Some("applications-graphics-symbolic"),

            adw::PreferencesGroup {
                set_title: "Theme",

                adw::ComboRow {
                    set_title: "Color scheme",
                    set_subtitle: "Choose light, dark, or follow system",
                    set_model: Some(&gtk::StringList::new(&["System", "Light", "Dark"])),
                    set_selected: match model.settings.theme {
                        Theme::System => 0,
                        Theme::Light => 1,
                        Theme::Dark => 2,
                    },
                    connect_selected_notify[sender] => move |row| {
                        sender.input(AppearancePageMsg::ThemeChanged(row.selected()));
                    },
                },
            },

            adw::PreferencesGroup {
                set_title: "Text",

                adw::ComboRow {
                    set_title: "Font size",
                    set_subtitle: "Size of message text",
                    set_model: Some(&gtk::StringList::new(&["Small", "Medium", "Large"])),
                    set_selected: match model.settings.font_size {
                        FontSize::Small => 0,
                        FontSize::Medium => 1,
                        FontSize::Large => 2,
                    },
                    connect_selected_notify[sender] => move |row| {
                        sender.input(AppearancePageMsg::FontSizeChanged(row.selected()));
                    },
                },

                adw::SwitchRow {
                    set_title: "Animations",
                    set_subtitle: "Animated placeholder in the message box",
                    set_active: model.settings.animations,
                    connect_active_notify[sender] => move |row| {
                        sender.input(AppearancePageMsg::AnimationsToggled(row.is_active()));
                    },
                },
            },
        }
    }

    fn init(
        settings: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let model = Self { settings };
        let widgets = view_output!();
        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        let change = match msg {
            AppearancePageMsg::ThemeChanged(idx) => {
                let theme = match idx {
                    0 => Theme::System,
                    1 => Theme::Light,
                    _ => Theme::Dark,
                };
                apply_color_scheme(theme);
                SettingChange::Theme(theme)
            }
            AppearancePageMsg::FontSizeChanged(idx) => {
                let size = match idx {
                    0 => FontSize::Small,
                    2 => FontSize::Large,
                    _ => FontSize::Medium,
                };
                apply_font_size(size);
                SettingChange::FontSize(size)
            }
            AppearancePageMsg::AnimationsToggled(on) => SettingChange::Animations(on),
        };
        self.settings.apply(change.clone());
        let _ = sender.output(AppearancePageOutput::Changed(change));
    }
}

pub fn apply_color_scheme(theme: Theme) {
    adw::StyleManager::default().set_color_scheme(match theme {
        Theme::System => adw::ColorScheme::Default,
        Theme::Light => adw::ColorScheme::ForceLight,
        Theme::Dark => adw::ColorScheme::ForceDark,
    });
}

thread_local! {
    static FONT_PROVIDER: RefCell<Option<gtk::CssProvider>> = const { RefCell::new(None) };
}

pub fn apply_font_size(size: FontSize) {
    let Some(display) = gtk::gdk::Display::default() else {
        return;
    };
    FONT_PROVIDER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let provider = slot.get_or_insert_with(|| {
            let provider = gtk::CssProvider::new();
            gtk::style_context_add_provider_for_display(
                &display,
                &provider,
                gtk::STYLE_PROVIDER_PRIORITY_APPLICATION + 1,
            );
            provider
        });
        provider.load_from_string(&font_css(size));
    });
}

fn font_css(size: FontSize) -> String {
    format!(
        ".message-bubble-user label, .message-bubble-assistant label, \
         .input-text-view {{ font-size: {}pt; }}",
        size.points()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_css_uses_point_size() {
        assert!(font_css(FontSize::Large).contains("font-size: 17pt"));
        assert!(font_css(FontSize::Small).contains("font-size: 13pt"));
    }
}
