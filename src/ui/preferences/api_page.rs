use adw::prelude::*;
use relm4::prelude::*;

use crate::config::ENV_API_KEY;

pub struct ApiPage {
    key_stored: bool,
    from_env: bool,
    key_row: adw::PasswordEntryRow,
}

pub struct ApiPageInit {
    pub key_stored: bool,
    pub from_env: bool,
}

#[derive(Debug)]
pub enum ApiPageMsg {
    Save,
    Remove,
    /// Sent back by the app once the keyring write finished.
    KeyStored(bool),
}

#[derive(Debug)]
pub enum ApiPageOutput {
    SaveApiKey(String),
    RemoveApiKey,
}

#[relm4::component(pub)]
impl Component for ApiPage {
    type Init = ApiPageInit;
    type Input = ApiPageMsg;
    type Output = ApiPageOutput;
    type CommandOutput = ();

    view! {
        adw::PreferencesPage {
            set_title: "API",
            set_icon_name: Some("dialog-password-symbolic"),

            adw::PreferencesGroup {
                set_title: "OpenRouter",
                set_description: Some("The key is kept in the system keyring."),

                #[local_ref]
                key_row -> adw::PasswordEntryRow {
                    set_title: "API key",
                    set_show_apply_button: true,
                    connect_apply => ApiPageMsg::Save,
                },

                adw::ActionRow {
                    set_title: "Status",
                    #[watch]
                    set_subtitle: &status_text(model.key_stored, model.from_env),

                    add_suffix = &gtk::Button {
                        set_icon_name: "user-trash-symbolic",
                        set_tooltip_text: Some("Remove stored key"),
                        set_valign: gtk::Align::Center,
                        add_css_class: "flat",
                        add_css_class: "error",
                        #[watch]
                        set_sensitive: model.key_stored,
                        connect_clicked => ApiPageMsg::Remove,
                    },
                },
            },
        }
    }

    fn init(
        init: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let key_row = adw::PasswordEntryRow::new();

        let model = Self {
            key_stored: init.key_stored,
            from_env: init.from_env,
            key_row: key_row.clone(),
        };

        let widgets = view_output!();

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        match msg {
            ApiPageMsg::Save => {
                let key = self.key_row.text().trim().to_string();
                if !key.is_empty() {
                    let _ = sender.output(ApiPageOutput::SaveApiKey(key));
                    self.key_row.set_text("");
                }
            }
            ApiPageMsg::Remove => {
                let _ = sender.output(ApiPageOutput::RemoveApiKey);
            }
            ApiPageMsg::KeyStored(stored) => {
                self.key_stored = stored;
            }
        }
    }
}

fn status_text(key_stored: bool, from_env: bool) -> String {
    match (from_env, key_stored) {
        (true, _) => format!("Using {} from the environment", ENV_API_KEY),
        (false, true) => "Key saved in keyring".to_string(),
        (false, false) => "No key configured".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_key_takes_precedence_in_status() {
        assert!(status_text(true, true).contains(ENV_API_KEY));
        assert_eq!(status_text(false, true), "Key saved in keyring");
        assert_eq!(status_text(false, false), "No key configured");
    }
}
