use std::cell::{Cell, RefCell};
use std::rc::Rc;

use gtk::prelude::*;
use relm4::prelude::*;

use crate::services::placeholder::TypingPlaceholder;

const STATIC_PLACEHOLDER: &str = "Message Bhima\u{2026}";

pub struct InputArea {
    buffer: gtk::TextBuffer,
    sending: bool,
    char_count: i32,
    send_with_enter: Rc<Cell<bool>>,
    animations: bool,
    placeholder: Rc<RefCell<TypingPlaceholder>>,
    placeholder_text: String,
    /// Bumped whenever the animation is restarted so stale timers stop.
    animation_generation: Rc<RefCell<u64>>,
}

#[derive(Debug)]
pub enum InputAreaMsg {
    SendClicked,
    SetSending(bool),
    SetSendWithEnter(bool),
    SetAnimations(bool),
    // Internal
    TextChanged,
    PlaceholderTick(String),
}

#[derive(Debug)]
pub enum InputAreaOutput {
    SendMessage(String),
}

pub struct InputAreaInit {
    pub send_with_enter: bool,
    pub animations: bool,
}

#[relm4::component(pub)]
impl Component for InputArea {
    type Init = InputAreaInit;
    type Input = InputAreaMsg;
    type Output = InputAreaOutput;
    type CommandOutput = ();

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_spacing: 0,

            gtk::Box {
                set_orientation: gtk::Orientation::Vertical,
                set_margin_top: 8,
                set_margin_bottom: 8,
                set_margin_start: 12,
                set_margin_end: 12,
                add_css_class: "input-card",

                gtk::Overlay {
                    set_hexpand: true,

                    gtk::ScrolledWindow {
                        set_hexpand: true,
                        set_max_content_height: 150,
                        set_propagate_natural_height: true,
                        set_min_content_height: 40,

                        #[name = "text_view"]
                        gtk::TextView {
                            set_wrap_mode: gtk::WrapMode::WordChar,
                            set_accepts_tab: false,
                            set_top_margin: 8,
                            set_bottom_margin: 8,
                            set_left_margin: 8,
                            set_right_margin: 8,
                            add_css_class: "input-text-view",
                            set_buffer: Some(&model.buffer),
                            #[watch]
                            set_editable: !model.sending,
                        },
                    },

                    add_overlay = &gtk::Label {
                        set_halign: gtk::Align::Start,
                        set_valign: gtk::Align::Start,
                        set_margin_start: 12,
                        set_margin_top: 8,
                        set_can_target: false,
                        add_css_class: "input-placeholder",
                        #[watch]
                        set_label: &model.placeholder_text,
                        #[watch]
                        set_visible: model.char_count == 0 && !model.sending,
                    },
                },

                gtk::Box {
                    set_orientation: gtk::Orientation::Horizontal,
                    set_spacing: 4,
                    set_margin_start: 8,
                    set_margin_end: 4,
                    set_margin_bottom: 4,
                    add_css_class: "input-toolbar",

                    gtk::Label {
                        set_halign: gtk::Align::Start,
                        set_hexpand: true,
                        add_css_class: "dim-label",
                        add_css_class: "caption",
                        #[watch]
                        set_label: if model.send_with_enter.get() {
                            "Enter to send, Shift+Enter for a new line"
                        } else {
                            "Ctrl+Enter to send"
                        },
                    },

                    gtk::Button {
                        set_icon_name: "go-up-symbolic",
                        set_tooltip_text: Some("Send message"),
                        set_halign: gtk::Align::End,
                        add_css_class: "suggested-action",
                        add_css_class: "circular",
                        #[watch]
                        set_sensitive: !model.sending && model.char_count > 0,
                        connect_clicked => InputAreaMsg::SendClicked,
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
        let buffer = gtk::TextBuffer::new(None::<&gtk::TextTagTable>);

        let mut model = Self {
            buffer: buffer.clone(),
            sending: false,
            char_count: 0,
            send_with_enter: Rc::new(Cell::new(init.send_with_enter)),
            animations: init.animations,
            placeholder: Rc::new(RefCell::new(TypingPlaceholder::default())),
            placeholder_text: STATIC_PLACEHOLDER.to_string(),
            animation_generation: Rc::new(RefCell::new(0)),
        };

        let widgets = view_output!();

        let sender_key = sender.clone();
        let send_with_enter = model.send_with_enter.clone();
        let key_controller = gtk::EventControllerKey::new();
        key_controller.connect_key_pressed(move |_, key, _code, modifier| {
            let is_enter = key == gtk::gdk::Key::Return || key == gtk::gdk::Key::KP_Enter;
            if is_enter && should_send(send_with_enter.get(), modifier) {
                sender_key.input(InputAreaMsg::SendClicked);
                gtk::glib::Propagation::Stop
            } else {
                gtk::glib::Propagation::Proceed
            }
        });
        widgets.text_view.add_controller(key_controller);

        let sender_buf = sender.clone();
        buffer.connect_changed(move |_| {
            sender_buf.input(InputAreaMsg::TextChanged);
        });

        if model.animations {
            model.start_animation(&sender);
        }

        ComponentParts { model, widgets }
    }

    fn update_with_view(
        &mut self,
        widgets: &mut Self::Widgets,
        msg: Self::Input,
        sender: ComponentSender<Self>,
        _root: &Self::Root,
    ) {
        match msg {
            InputAreaMsg::SendClicked => {
                let text = self.get_text();
                let trimmed = text.trim();
                if !trimmed.is_empty() && !self.sending {
                    let _ = sender.output(InputAreaOutput::SendMessage(trimmed.to_string()));
                    self.buffer.set_text("");
                }
            }
            InputAreaMsg::SetSending(sending) => {
                self.sending = sending;
                if !sending {
                    widgets.text_view.grab_focus();
                }
            }
            InputAreaMsg::SetSendWithEnter(enabled) => {
                self.send_with_enter.set(enabled);
            }
            InputAreaMsg::SetAnimations(enabled) => {
                if enabled != self.animations {
                    self.animations = enabled;
                    if enabled {
                        self.start_animation(&sender);
                    } else {
                        self.stop_animation();
                    }
                }
            }
            InputAreaMsg::TextChanged => {
                self.char_count = self.buffer.char_count();
            }
            InputAreaMsg::PlaceholderTick(text) => {
                if self.animations {
                    self.placeholder_text = text;
                }
            }
        }
        self.update_view(widgets, sender);
    }
}

/// Whether an Enter press with `modifier` sends the message.
fn should_send(send_with_enter: bool, modifier: gtk::gdk::ModifierType) -> bool {
    use gtk::gdk::ModifierType;
    if send_with_enter {
        !modifier.contains(ModifierType::SHIFT_MASK)
    } else {
        modifier.contains(ModifierType::CONTROL_MASK)
    }
}

impl InputArea {
    fn get_text(&self) -> String {
        let start = self.buffer.start_iter();
        let end = self.buffer.end_iter();
        self.buffer.text(&start, &end, false).to_string()
    }

    fn start_animation(&mut self, sender: &ComponentSender<Self>) {
        let generation = {
            let mut g = self.animation_generation.borrow_mut();
            *g += 1;
            *g
        };
        *self.placeholder.borrow_mut() = TypingPlaceholder::default();
        schedule_tick(
            self.placeholder.clone(),
            self.animation_generation.clone(),
            generation,
            std::time::Duration::ZERO,
            sender.input_sender().clone(),
        );
    }

    fn stop_animation(&mut self) {
        *self.animation_generation.borrow_mut() += 1;
        self.placeholder_text = STATIC_PLACEHOLDER.to_string();
    }
}

/// Chains one-shot timeouts since each step of the typing effect has its own
/// delay.
fn schedule_tick(
    placeholder: Rc<RefCell<TypingPlaceholder>>,
    current: Rc<RefCell<u64>>,
    generation: u64,
    delay: std::time::Duration,
    input: relm4::Sender<InputAreaMsg>,
) {
    glib::timeout_add_local_once(delay, move || {
        if *current.borrow() != generation {
            return;
        }
        let next_delay = placeholder.borrow_mut().tick();
        let text = placeholder.borrow().text();
        input.emit(InputAreaMsg::PlaceholderTick(text));
        schedule_tick(placeholder, current, generation, next_delay, input);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtk::gdk::ModifierType;

    #[test]
    fn test_enter_sends_unless_shift_held() {
        assert!(should_send(true, ModifierType::empty()));
        assert!(should_send(true, ModifierType::CONTROL_MASK));
        assert!(!should_send(true, ModifierType::SHIFT_MASK));
    }

    #[test]
    fn test_ctrl_enter_required_when_enter_does_not_send() {
        assert!(!should_send(false, ModifierType::empty()));
        assert!(!should_send(false, ModifierType::SHIFT_MASK));
        assert!(should_send(false, ModifierType::CONTROL_MASK));
    }
}
