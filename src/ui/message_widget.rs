use gtk::prelude::*;
use relm4::prelude::*;

use crate::models::catalog::display_name;
use crate::models::{Message, Role};
use crate::services::markdown::{parse_markdown, spans_to_pango_markup, Block, ListItem, Span};

pub struct MessageWidget {
    pub message: Message,
    content_box: gtk::Box,
    bubble: gtk::Box,
    action_bar: gtk::Box,
    is_user: bool,
}

#[derive(Debug)]
pub enum MessageWidgetMsg {
    UpdateContent(String),
    RequestCopy,
}

#[derive(Debug)]
pub enum MessageWidgetOutput {
    CopyFullContent(String),
}

#[relm4::factory(pub)]
impl FactoryComponent for MessageWidget {
    type Init = Message;
    type Input = MessageWidgetMsg;
    type Output = MessageWidgetOutput;
    type CommandOutput = ();
    type ParentWidget = gtk::Box;

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_spacing: 0,
        }
    }

    fn init_model(message: Self::Init, _index: &DynamicIndex, _sender: FactorySender<Self>) -> Self {
        let content_box = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(6)
            .margin_start(10)
            .margin_end(10)
            .margin_top(6)
            .margin_bottom(10)
            .build();

        let bubble = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(2)
            .build();

        let action_bar = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(4)
            .halign(gtk::Align::End)
            .valign(gtk::Align::Start)
            .margin_top(2)
            .margin_end(4)
            .visible(false)
            .build();
        action_bar.add_css_class("message-actions");

        let is_user = message.role == Role::User;
        Self {
            message,
            content_box,
            bubble,
            action_bar,
            is_user,
        }
    }

    fn init_widgets(
        &mut self,
        _index: &DynamicIndex,
        root: Self::Root,
        _returned_widget: &<Self::ParentWidget as relm4::factory::FactoryView>::ReturnedWidget,
        sender: FactorySender<Self>,
    ) -> Self::Widgets {
        self.bubble.add_css_class(if self.is_user {
            "message-bubble-user"
        } else {
            "message-bubble-assistant"
        });
        self.bubble.add_css_class("card");

        let header = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(8)
            .margin_start(10)
            .margin_end(10)
            .margin_top(6)
            .build();

        let role_label = gtk::Label::builder()
            .label(role_caption(&self.message))
            .halign(gtk::Align::Start)
            .hexpand(true)
            .build();
        role_label.add_css_class("caption");
        role_label.add_css_class("dim-label");
        header.append(&role_label);

        let time_label = gtk::Label::builder()
            .label(
                self.message
                    .timestamp
                    .with_timezone(&chrono::Local)
                    .format("%H:%M")
                    .to_string(),
            )
            .halign(gtk::Align::End)
            .build();
        time_label.add_css_class("caption");
        time_label.add_css_class("dim-label");
        time_label.add_css_class("message-timestamp");
        header.append(&time_label);

        self.bubble.append(&header);

        if self.is_user {
            let label = gtk::Label::builder()
                .label(&self.message.content)
                .halign(gtk::Align::Start)
                .xalign(0.0)
                .wrap(true)
                .wrap_mode(gtk::pango::WrapMode::WordChar)
                .selectable(true)
                .build();
            self.content_box.append(&label);
        } else {
            render_markdown_blocks(&self.content_box, &self.message.content);
        }
        self.bubble.append(&self.content_box);

        let overlay = gtk::Overlay::new();
        overlay.set_child(Some(&self.bubble));

        let copy_btn = gtk::Button::builder()
            .icon_name("edit-copy-symbolic")
            .tooltip_text("Copy message")
            .build();
        copy_btn.add_css_class("flat");
        copy_btn.add_css_class("circular");
        let sender_copy = sender.input_sender().clone();
        copy_btn.connect_clicked(move |_| {
            sender_copy.emit(MessageWidgetMsg::RequestCopy);
        });
        self.action_bar.append(&copy_btn);
        overlay.add_overlay(&self.action_bar);

        // Actions only show while hovered
        let motion = gtk::EventControllerMotion::new();
        let bar_enter = self.action_bar.clone();
        motion.connect_enter(move |_, _, _| bar_enter.set_visible(true));
        let bar_leave = self.action_bar.clone();
        motion.connect_leave(move |_| bar_leave.set_visible(false));
        overlay.add_controller(motion);

        let message_row = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .margin_top(4)
            .margin_bottom(4)
            .margin_start(if self.is_user { 64 } else { 12 })
            .margin_end(if self.is_user { 12 } else { 48 })
            .halign(if self.is_user {
                gtk::Align::End
            } else {
                gtk::Align::Fill
            })
            .build();
        overlay.set_hexpand(!self.is_user);
        message_row.append(&overlay);
        root.append(&message_row);

        let widgets = view_output!();
        widgets
    }

    fn update(&mut self, msg: Self::Input, sender: FactorySender<Self>) {
        match msg {
            MessageWidgetMsg::UpdateContent(text) => {
                self.message.content = text;
                render_markdown_blocks(&self.content_box, &self.message.content);
            }
            MessageWidgetMsg::RequestCopy => {
                let _ = sender.output(MessageWidgetOutput::CopyFullContent(
                    self.message.content.clone(),
                ));
            }
        }
    }
}

fn role_caption(message: &Message) -> String {
    match message.role {
        Role::User => "You".to_string(),
        Role::System => "System".to_string(),
        Role::Assistant => match message.model.as_deref() {
            Some(model) if !model.is_empty() => display_name(model),
            _ => "Assistant".to_string(),
        },
    }
}

fn render_markdown_blocks(content_box: &gtk::Box, text: &str) {
    while let Some(child) = content_box.first_child() {
        content_box.remove(&child);
    }

    if text.is_empty() {
        let dots = gtk::Label::builder()
            .label("\u{2026}")
            .halign(gtk::Align::Start)
            .build();
        dots.add_css_class("dim-label");
        content_box.append(&dots);
        return;
    }

    for block in parse_markdown(text) {
        content_box.append(&block_to_widget(&block));
    }
}

fn markup_label(spans: &[Span]) -> gtk::Label {
    let label = gtk::Label::builder()
        .halign(gtk::Align::Start)
        .xalign(0.0)
        .wrap(true)
        .wrap_mode(gtk::pango::WrapMode::WordChar)
        .selectable(true)
        .use_markup(true)
        .build();
    label.set_markup(&spans_to_pango_markup(spans));
    label
}

fn block_to_widget(block: &Block) -> gtk::Widget {
    match block {
        Block::Paragraph(spans) => markup_label(spans).upcast(),
        Block::Code { language, code } => build_code_block(language, code),
        Block::Heading { level, spans } => {
            let label = markup_label(spans);
            label.add_css_class(match level {
                1 => "heading-1",
                2 => "heading-2",
                3 => "heading-3",
                _ => "heading-4",
            });
            label.upcast()
        }
        Block::Quote(inner) => {
            let quote = gtk::Box::builder()
                .orientation(gtk::Orientation::Vertical)
                .spacing(4)
                .build();
            quote.add_css_class("blockquote");
            for block in inner {
                quote.append(&block_to_widget(block));
            }
            quote.upcast()
        }
        Block::List { start, items } => build_list(*start, items),
        Block::Table { header, rows } => build_table(header, rows),
        Block::Rule => gtk::Separator::builder()
            .orientation(gtk::Orientation::Horizontal)
            .margin_top(4)
            .margin_bottom(4)
            .build()
            .upcast(),
    }
}

fn build_code_block(language: &str, code: &str) -> gtk::Widget {
    let outer = gtk::Box::builder()
        .orientation(gtk::Orientation::Vertical)
        .margin_top(4)
        .margin_bottom(4)
        .build();
    outer.add_css_class("code-block");

    let header = gtk::Box::builder()
        .orientation(gtk::Orientation::Horizontal)
        .spacing(8)
        .build();
    header.add_css_class("code-block-header");

    let lang_label = gtk::Label::builder()
        .label(language)
        .halign(gtk::Align::Start)
        .hexpand(true)
        .build();
    lang_label.add_css_class("code-block-language");
    header.append(&lang_label);

    let copy_button = gtk::Button::builder()
        .icon_name("edit-copy-symbolic")
        .tooltip_text("Copy code")
        .build();
    copy_button.add_css_class("flat");
    copy_button.add_css_class("circular");

    let code_for_copy = code.to_string();
    copy_button.connect_clicked(move |btn| {
        if let Some(display) = gtk::gdk::Display::default() {
            display.clipboard().set_text(&code_for_copy);
            btn.set_icon_name("object-select-symbolic");
            let btn = btn.clone();
            glib::timeout_add_local_once(std::time::Duration::from_millis(1500), move || {
                // Streaming re-renders may have dropped the block already
                if btn.parent().is_some() {
                    btn.set_icon_name("edit-copy-symbolic");
                }
            });
        }
    });
    header.append(&copy_button);
    outer.append(&header);

    let text_view = gtk::TextView::builder()
        .editable(false)
        .cursor_visible(false)
        .wrap_mode(gtk::WrapMode::WordChar)
        .monospace(true)
        .top_margin(8)
        .bottom_margin(8)
        .left_margin(12)
        .right_margin(12)
        .build();
    text_view.buffer().set_text(code.trim_end_matches('\n'));
    text_view.add_css_class("code-block-content");
    outer.append(&text_view);

    outer.upcast()
}

fn build_list(start: Option<u64>, items: &[ListItem]) -> gtk::Widget {
    let list_box = gtk::Box::builder()
        .orientation(gtk::Orientation::Vertical)
        .spacing(2)
        .margin_start(4)
        .build();

    for (i, item) in items.iter().enumerate() {
        let row = gtk::Box::builder()
            .orientation(gtk::Orientation::Horizontal)
            .spacing(6)
            .build();

        let marker: gtk::Widget = match (item.checked, start) {
            (Some(checked), _) => gtk::CheckButton::builder()
                .active(checked)
                .sensitive(false)
                .valign(gtk::Align::Start)
                .build()
                .upcast(),
            (None, Some(first)) => list_bullet(&format!("{}.", first + i as u64)),
            (None, None) => list_bullet("\u{2022}"),
        };
        row.append(&marker);

        let content = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(2)
            .hexpand(true)
            .build();
        for block in &item.blocks {
            content.append(&block_to_widget(block));
        }
        row.append(&content);
        list_box.append(&row);
    }

    list_box.upcast()
}

fn list_bullet(text: &str) -> gtk::Widget {
    let bullet = gtk::Label::builder()
        .label(text)
        .valign(gtk::Align::Start)
        .build();
    bullet.add_css_class("list-bullet");
    bullet.upcast()
}

fn build_table(header: &[Vec<Span>], rows: &[Vec<Vec<Span>>]) -> gtk::Widget {
    let grid = gtk::Grid::builder()
        .column_spacing(16)
        .row_spacing(4)
        .margin_top(4)
        .margin_bottom(4)
        .build();
    grid.add_css_class("markdown-table");

    for (col, cell) in header.iter().enumerate() {
        let label = markup_label(cell);
        label.add_css_class("heading");
        grid.attach(&label, col as i32, 0, 1, 1);
    }
    for (row_idx, row) in rows.iter().enumerate() {
        for (col, cell) in row.iter().enumerate() {
            grid.attach(&markup_label(cell), col as i32, row_idx as i32 + 1, 1, 1);
        }
    }

    let scroller = gtk::ScrolledWindow::builder()
        .hscrollbar_policy(gtk::PolicyType::Automatic)
        .vscrollbar_policy(gtk::PolicyType::Never)
        .propagate_natural_height(true)
        .child(&grid)
        .build();
    scroller.upcast()
}
