use adw::prelude::*;
use relm4::prelude::*;

use crate::config::DEFAULT_SYSTEM_PROMPT;
use crate::models::catalog::default_models;
use crate::models::ModelInfo;
use crate::providers::types::RemoteModel;
use crate::services::settings::{AppSettings, SettingChange};

pub struct ChatPage {
    models: Vec<ModelInfo>,
    temp_scale: gtk::Scale,
    system_prompt_buffer: gtk::TextBuffer,
}

#[derive(Debug)]
pub enum ChatPageMsg {
    StreamingToggled(bool),
    SendWithEnterToggled(bool),
    AutoScrollToggled(bool),
    DefaultModelChanged(u32),
    TemperatureChanged,
    SystemPromptChanged,
    ResetSystemPrompt,
}

#[derive(Debug)]
pub enum ChatPageOutput {
    Changed(SettingChange),
}

#[relm4::component(pub)]
impl Component for ChatPage {
    type Init = AppSettings;
    type Input = ChatPageMsg;
    type Output = ChatPageOutput;
    type CommandOutput = ();

    view! {
        adw::PreferencesPage {
            set_title: "Chat",
            set_icon_name: Some("chat-symbolic"),

            adw::PreferencesGroup {
                set_title: "Behavior",

                adw::SwitchRow {
                    set_title: "Stream responses",
                    set_subtitle: "Show the reply as it is generated",
                    set_active: settings.stream_responses,
                    connect_active_notify[sender] => move |row| {
                        sender.input(ChatPageMsg::StreamingToggled(row.is_active()));
                    },
                },

                adw::SwitchRow {
                    set_title: "Send with Enter",
                    set_subtitle: "When off, use Ctrl+Enter to send",
                    set_active: settings.send_with_enter,
                    connect_active_notify[sender] => move |row| {
                        sender.input(ChatPageMsg::SendWithEnterToggled(row.is_active()));
                    },
                },

                adw::SwitchRow {
                    set_title: "Auto-scroll",
                    set_subtitle: "Follow new messages while they arrive",
                    set_active: settings.auto_scroll,
                    connect_active_notify[sender] => move |row| {
                        sender.input(ChatPageMsg::AutoScrollToggled(row.is_active()));
                    },
                },
            },

            adw::PreferencesGroup {
                set_title: "Defaults",

                adw::ComboRow {
                    set_title: "Default model",
                    set_subtitle: "Used for new conversations",
                    set_model: Some(&gtk::StringList::new(&model_names)),
                    set_selected: default_index,
                    connect_selected_notify[sender] => move |row| {
                        sender.input(ChatPageMsg::DefaultModelChanged(row.selected()));
                    },
                },

                #[local_ref]
                temp_row -> adw::ActionRow {
                    set_title: "Temperature",
                    set_subtitle: "Controls response randomness (0.0 = focused, 2.0 = creative)",
                },
            },

            #[local_ref]
            system_prompt_group -> adw::PreferencesGroup {
                set_title: "System Prompt",
                set_description: Some("Instructions added to new conversations. Leave empty to send none."),

                #[wrap(Some)]
                set_header_suffix = &gtk::Button {
                    set_label: "Reset",
                    set_valign: gtk::Align::Center,
                    add_css_class: "flat",
                    connect_clicked => ChatPageMsg::ResetSystemPrompt,
                },
            },
        }
    }

    fn init(
        settings: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let mut models = default_models();
        if !models.iter().any(|m| m.id == settings.default_model) {
            models.push(ModelInfo::from(RemoteModel {
                id: settings.default_model.clone(),
                name: settings.default_model.clone(),
                context_length: None,
            }));
        }
        let model_names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        let default_index = models
            .iter()
            .position(|m| m.id == settings.default_model)
            .unwrap_or(0) as u32;

        let temp_scale = gtk::Scale::with_range(gtk::Orientation::Horizontal, 0.0, 2.0, 0.1);
        temp_scale.set_value(settings.temperature as f64);
        temp_scale.set_width_request(200);
        temp_scale.set_valign(gtk::Align::Center);
        temp_scale.set_draw_value(true);
        temp_scale.set_digits(1);
        temp_scale.set_value_pos(gtk::PositionType::Left);

        let sender_temp = sender.input_sender().clone();
        temp_scale.connect_value_changed(move |_| {
            sender_temp.emit(ChatPageMsg::TemperatureChanged);
        });

        let temp_row = adw::ActionRow::new();

        let system_prompt_buffer = gtk::TextBuffer::new(None::<&gtk::TextTagTable>);
        system_prompt_buffer.set_text(settings.effective_system_prompt().unwrap_or(""));

        let system_prompt_view = gtk::TextView::builder()
            .buffer(&system_prompt_buffer)
            .wrap_mode(gtk::WrapMode::WordChar)
            .top_margin(8)
            .bottom_margin(8)
            .left_margin(8)
            .right_margin(8)
            .height_request(100)
            .build();
        system_prompt_view.add_css_class("card");

        let system_prompt_group = adw::PreferencesGroup::new();

        let model = Self {
            models: models.clone(),
            temp_scale: temp_scale.clone(),
            system_prompt_buffer: system_prompt_buffer.clone(),
        };

        let widgets = view_output!();

        widgets.temp_row.add_suffix(&temp_scale);
        widgets.system_prompt_group.add(&system_prompt_view);

        // Connected after the initial text so opening the page is not an edit
        let sender_sp = sender.input_sender().clone();
        system_prompt_buffer.connect_changed(move |_| {
            sender_sp.emit(ChatPageMsg::SystemPromptChanged);
        });

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        let change = match msg {
            ChatPageMsg::StreamingToggled(on) => SettingChange::StreamResponses(on),
            ChatPageMsg::SendWithEnterToggled(on) => SettingChange::SendWithEnter(on),
            ChatPageMsg::AutoScrollToggled(on) => SettingChange::AutoScroll(on),
            ChatPageMsg::DefaultModelChanged(idx) => match self.models.get(idx as usize) {
                Some(info) => SettingChange::DefaultModel(info.id.clone()),
                None => return,
            },
            ChatPageMsg::TemperatureChanged => {
                SettingChange::Temperature(self.temp_scale.value() as f32)
            }
            ChatPageMsg::SystemPromptChanged => {
                let start = self.system_prompt_buffer.start_iter();
                let end = self.system_prompt_buffer.end_iter();
                let text = self.system_prompt_buffer.text(&start, &end, false);
                SettingChange::SystemPrompt(text.to_string())
            }
            ChatPageMsg::ResetSystemPrompt => {
                // The buffer's changed handler reports the new text
                self.system_prompt_buffer.set_text(DEFAULT_SYSTEM_PROMPT);
                return;
            }
        };
        let _ = sender.output(ChatPageOutput::Changed(change));
    }
}
