use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use gtk::prelude::*;
use relm4::factory::FactoryVecDeque;
use relm4::prelude::*;

use crate::models::{Message, Role};
use crate::ui::input_area::{InputArea, InputAreaInit, InputAreaMsg, InputAreaOutput};
use crate::ui::message_widget::{MessageWidget, MessageWidgetMsg, MessageWidgetOutput};

/// Streaming text is repainted at most this often.
const RENDER_INTERVAL: Duration = Duration::from_millis(80);

/// Shown on an empty conversation: (button title, prompt that gets sent).
pub const EXAMPLE_PROMPTS: [(&str, &str); 4] = [
    (
        "Explain quantum computing in simple terms",
        "Can you explain quantum computing in simple terms that a beginner would understand?",
    ),
    (
        "Write a poem about a moonlit forest",
        "Write a beautiful and atmospheric poem about a forest bathed in moonlight.",
    ),
    (
        "Create a JavaScript function to sort an array",
        "Help me create an efficient JavaScript function to sort an array of numbers.",
    ),
    (
        "Design a 1-week itinerary for Japan",
        "Can you help me create a detailed 1-week travel itinerary for visiting Japan?",
    ),
];

pub struct ChatView {
    messages: FactoryVecDeque<MessageWidget>,
    input_area: Controller<InputArea>,
    loading: bool,
    scrolled_window: gtk::ScrolledWindow,
    streaming_buffer: Rc<RefCell<Option<StreamBuffer>>>,
    render_timer_active: Rc<Cell<bool>>,
    user_scrolled_up: bool,
    auto_scroll: bool,
}

struct StreamBuffer {
    message_id: String,
    text: String,
    needs_render: bool,
}

pub struct ChatViewInit {
    pub send_with_enter: bool,
    pub animations: bool,
    pub auto_scroll: bool,
}

#[derive(Debug)]
pub enum ChatViewMsg {
    LoadMessages(Vec<Message>),
    AddMessage(Message),
    SetLoading(bool),
    SetAutoScroll(bool),
    SetSendWithEnter(bool),
    SetAnimations(bool),
    ScrollToBottom,
    // Streaming
    AddStreamingMessage(Message),
    UpdateStreamingMessage(String, String), // (message_id, full_text)
    StreamingComplete(String, String),      // (message_id, final_text)
    StopGeneration,
    // Internal
    UserSendMessage(String),
    ExamplePrompt(usize),
    RenderBuffered,
    ScrollPositionChanged,
    CopyToClipboard(String),
}

#[derive(Debug)]
pub enum ChatViewOutput {
    SendMessage(String),
    StopGeneration,
}

#[relm4::component(pub)]
impl Component for ChatView {
    type Init = ChatViewInit;
    type Input = ChatViewMsg;
    type Output = ChatViewOutput;
    type CommandOutput = ();

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_vexpand: true,

            #[local_ref]
            empty_state -> gtk::Box {
                set_orientation: gtk::Orientation::Vertical,
                set_vexpand: true,
                set_valign: gtk::Align::Center,
                set_halign: gtk::Align::Center,
                set_spacing: 24,
                #[watch]
                set_visible: model.messages.is_empty(),
            },

            gtk::Overlay {
                set_vexpand: true,
                #[watch]
                set_visible: !model.messages.is_empty(),

                #[local_ref]
                scrolled_window -> gtk::ScrolledWindow {
                    set_vexpand: true,
                    set_hscrollbar_policy: gtk::PolicyType::Never,

                    #[local_ref]
                    message_list -> gtk::Box {
                        set_orientation: gtk::Orientation::Vertical,
                        set_spacing: 0,
                        set_margin_top: 8,
                        set_margin_bottom: 8,
                        set_margin_start: 16,
                        set_margin_end: 16,
                    },
                },

                add_overlay = &gtk::Button {
                    set_icon_name: "go-down-symbolic",
                    set_tooltip_text: Some("Scroll to bottom"),
                    set_halign: gtk::Align::Center,
                    set_valign: gtk::Align::End,
                    set_margin_bottom: 8,
                    add_css_class: "circular",
                    add_css_class: "osd",
                    #[watch]
                    set_visible: model.user_scrolled_up,
                    connect_clicked => ChatViewMsg::ScrollToBottom,
                },
            },

            gtk::Box {
                set_orientation: gtk::Orientation::Horizontal,
                set_halign: gtk::Align::Start,
                set_margin_start: 20,
                set_margin_bottom: 8,
                set_spacing: 8,
                #[watch]
                set_visible: model.loading,

                gtk::Spinner {
                    #[watch]
                    set_spinning: model.loading,
                },

                gtk::Label {
                    set_label: "Generating\u{2026}",
                    add_css_class: "dim-label",
                },

                gtk::Button {
                    set_label: "Stop",
                    set_tooltip_text: Some("Stop generating (Esc)"),
                    add_css_class: "destructive-action",
                    add_css_class: "pill",
                    connect_clicked => ChatViewMsg::StopGeneration,
                },
            },

            gtk::Separator {
                set_orientation: gtk::Orientation::Horizontal,
            },

            model.input_area.widget().clone(),
        }
    }

    fn init(
        init: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let messages = FactoryVecDeque::builder()
            .launch(gtk::Box::default())
            .forward(sender.input_sender(), |output| match output {
                MessageWidgetOutput::CopyFullContent(content) => {
                    ChatViewMsg::CopyToClipboard(content)
                }
            });

        let input_area = InputArea::builder()
            .launch(InputAreaInit {
                send_with_enter: init.send_with_enter,
                animations: init.animations,
            })
            .forward(sender.input_sender(), |output| match output {
                InputAreaOutput::SendMessage(text) => ChatViewMsg::UserSendMessage(text),
            });

        let scrolled_window = gtk::ScrolledWindow::new();
        let empty_state = build_empty_state(&sender);

        let model = Self {
            messages,
            input_area,
            loading: false,
            scrolled_window: scrolled_window.clone(),
            streaming_buffer: Rc::new(RefCell::new(None)),
            render_timer_active: Rc::new(Cell::new(false)),
            user_scrolled_up: false,
            auto_scroll: init.auto_scroll,
        };

        let message_list = model.messages.widget();
        let widgets = view_output!();

        let sender_scroll = sender.input_sender().clone();
        scrolled_window
            .vadjustment()
            .connect_value_changed(move |_| {
                sender_scroll.emit(ChatViewMsg::ScrollPositionChanged);
            });

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        match msg {
            ChatViewMsg::LoadMessages(messages) => {
                self.stop_render_timer();
                let mut guard = self.messages.guard();
                guard.clear();
                for message in messages.into_iter().filter(|m| m.role != Role::System) {
                    guard.push_back(message);
                }
                drop(guard);
                sender.input(ChatViewMsg::ScrollToBottom);
            }
            ChatViewMsg::AddMessage(message) | ChatViewMsg::AddStreamingMessage(message) => {
                if message.role == Role::System {
                    return;
                }
                self.messages.guard().push_back(message);
                self.auto_scroll_to_bottom(&sender);
            }
            ChatViewMsg::SetLoading(loading) => {
                self.loading = loading;
                self.input_area.emit(InputAreaMsg::SetSending(loading));
            }
            ChatViewMsg::SetAutoScroll(enabled) => {
                self.auto_scroll = enabled;
            }
            ChatViewMsg::SetSendWithEnter(enabled) => {
                self.input_area.emit(InputAreaMsg::SetSendWithEnter(enabled));
            }
            ChatViewMsg::SetAnimations(enabled) => {
                self.input_area.emit(InputAreaMsg::SetAnimations(enabled));
            }
            ChatViewMsg::ScrollToBottom => {
                self.user_scrolled_up = false;
                let adj = self.scrolled_window.vadjustment();
                glib::idle_add_local_once(move || {
                    adj.set_value(adj.upper());
                });
            }
            ChatViewMsg::ScrollPositionChanged => {
                self.user_scrolled_up = !self.at_bottom();
            }
            ChatViewMsg::UpdateStreamingMessage(message_id, text) => {
                *self.streaming_buffer.borrow_mut() = Some(StreamBuffer {
                    message_id,
                    text,
                    needs_render: true,
                });

                if !self.render_timer_active.get() {
                    self.render_timer_active.set(true);
                    let sender_timer = sender.input_sender().clone();
                    let timer_active = self.render_timer_active.clone();
                    glib::timeout_add_local(RENDER_INTERVAL, move || {
                        if !timer_active.get() {
                            return glib::ControlFlow::Break;
                        }
                        sender_timer.emit(ChatViewMsg::RenderBuffered);
                        glib::ControlFlow::Continue
                    });
                }
            }
            ChatViewMsg::RenderBuffered => {
                let pending = {
                    let mut buf = self.streaming_buffer.borrow_mut();
                    buf.as_mut().filter(|b| b.needs_render).map(|b| {
                        b.needs_render = false;
                        (b.message_id.clone(), b.text.clone())
                    })
                };
                if let Some((message_id, text)) = pending {
                    self.update_message_content(&message_id, text);
                    self.auto_scroll_to_bottom(&sender);
                }
            }
            ChatViewMsg::StreamingComplete(message_id, final_text) => {
                self.stop_render_timer();
                self.update_message_content(&message_id, final_text);
                self.auto_scroll_to_bottom(&sender);
            }
            ChatViewMsg::StopGeneration => {
                let _ = sender.output(ChatViewOutput::StopGeneration);
            }
            ChatViewMsg::UserSendMessage(text) => {
                let _ = sender.output(ChatViewOutput::SendMessage(text));
            }
            ChatViewMsg::ExamplePrompt(index) => {
                if let Some((_, prompt)) = EXAMPLE_PROMPTS.get(index) {
                    if !self.loading {
                        let _ = sender.output(ChatViewOutput::SendMessage(prompt.to_string()));
                    }
                }
            }
            ChatViewMsg::CopyToClipboard(content) => {
                if let Some(display) = gtk::gdk::Display::default() {
                    display.clipboard().set_text(&content);
                }
            }
        }
    }
}

impl ChatView {
    fn at_bottom(&self) -> bool {
        let adj = self.scrolled_window.vadjustment();
        adj.value() >= adj.upper() - adj.page_size() - 50.0
    }

    fn auto_scroll_to_bottom(&mut self, sender: &ComponentSender<Self>) {
        self.user_scrolled_up = !self.at_bottom();
        if self.auto_scroll && !self.user_scrolled_up {
            sender.input(ChatViewMsg::ScrollToBottom);
        }
    }

    fn stop_render_timer(&mut self) {
        self.render_timer_active.set(false);
        *self.streaming_buffer.borrow_mut() = None;
    }

    fn update_message_content(&mut self, message_id: &str, text: String) {
        let guard = self.messages.guard();
        if let Some(idx) = guard.iter().position(|m| m.message.id == message_id) {
            guard.send(idx, MessageWidgetMsg::UpdateContent(text));
        };
    }
}

fn build_empty_state(sender: &ComponentSender<ChatView>) -> gtk::Box {
    let empty_state = gtk::Box::new(gtk::Orientation::Vertical, 24);

    let title = gtk::Label::builder()
        .label("How can I help you today?")
        .justify(gtk::Justification::Center)
        .build();
    title.add_css_class("title-1");
    empty_state.append(&title);

    let grid = gtk::Grid::builder()
        .row_spacing(12)
        .column_spacing(12)
        .column_homogeneous(true)
        .halign(gtk::Align::Center)
        .build();

    for (i, (label, _)) in EXAMPLE_PROMPTS.iter().enumerate() {
        let text = gtk::Label::builder()
            .label(*label)
            .wrap(true)
            .max_width_chars(28)
            .xalign(0.0)
            .build();
        let button = gtk::Button::builder().child(&text).build();
        button.add_css_class("example-prompt");
        button.add_css_class("card");
        let input = sender.input_sender().clone();
        button.connect_clicked(move |_| {
            input.emit(ChatViewMsg::ExamplePrompt(i));
        });
        grid.attach(&button, (i % 2) as i32, (i / 2) as i32, 1, 1);
    }
    empty_state.append(&grid);

    empty_state
}
