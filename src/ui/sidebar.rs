use adw::prelude::*;
use chrono::{DateTime, Datelike, Utc};
use relm4::factory::FactoryVecDeque;
use relm4::prelude::*;

use crate::models::{catalog, Conversation};

/// What the sidebar needs to know about a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SidebarEntry {
    pub id: String,
    pub title: String,
    pub model: String,
    pub preview: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Conversation> for SidebarEntry {
    fn from(conv: &Conversation) -> Self {
        Self {
            id: conv.id.clone(),
            title: conv.title.clone(),
            model: conv.model.clone(),
            preview: conv.preview(),
            updated_at: conv.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SidebarItem {
    Header(&'static str),
    Conversation(SidebarEntry),
}

// --- ConversationRow factory component ---

#[derive(Debug)]
pub struct ConversationRow {
    pub item: SidebarItem,
}

#[relm4::factory(pub)]
impl FactoryComponent for ConversationRow {
    type Init = SidebarItem;
    type Input = ();
    type Output = ();
    type CommandOutput = ();
    type ParentWidget = gtk::ListBox;

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Vertical,
            set_spacing: 2,
            set_margin_all: 6,
        }
    }

    fn init_model(item: Self::Init, _index: &DynamicIndex, _sender: FactorySender<Self>) -> Self {
        Self { item }
    }

    fn init_widgets(
        &mut self,
        _index: &DynamicIndex,
        root: Self::Root,
        returned_widget: &<Self::ParentWidget as relm4::factory::FactoryView>::ReturnedWidget,
        _sender: FactorySender<Self>,
    ) -> Self::Widgets {
        match &self.item {
            SidebarItem::Header(label) => {
                let header_label = gtk::Label::builder()
                    .label(*label)
                    .halign(gtk::Align::Start)
                    .margin_top(8)
                    .margin_bottom(2)
                    .margin_start(4)
                    .build();
                header_label.add_css_class("dim-label");
                header_label.add_css_class("caption");
                header_label.add_css_class("sidebar-date-header");
                root.append(&header_label);

                returned_widget.set_activatable(false);
                returned_widget.set_selectable(false);
            }
            SidebarItem::Conversation(entry) => {
                let title_label = gtk::Label::builder()
                    .label(&entry.title)
                    .halign(gtk::Align::Start)
                    .ellipsize(gtk::pango::EllipsizeMode::End)
                    .max_width_chars(30)
                    .build();
                title_label.add_css_class("heading");
                root.append(&title_label);

                let model_label = gtk::Label::builder()
                    .label(catalog::display_name(&entry.model))
                    .halign(gtk::Align::Start)
                    .ellipsize(gtk::pango::EllipsizeMode::End)
                    .build();
                model_label.add_css_class("dim-label");
                model_label.add_css_class("caption");
                root.append(&model_label);

                if let Some(preview) = entry.preview.as_deref().filter(|p| !p.is_empty()) {
                    let preview_label = gtk::Label::builder()
                        .label(preview)
                        .halign(gtk::Align::Start)
                        .ellipsize(gtk::pango::EllipsizeMode::End)
                        .max_width_chars(35)
                        .build();
                    preview_label.add_css_class("dim-label");
                    preview_label.add_css_class("caption");
                    preview_label.set_opacity(0.7);
                    root.append(&preview_label);
                }
            }
        }

        let widgets = view_output!();
        widgets
    }
}

// --- Sidebar component ---

pub struct Sidebar {
    rows: FactoryVecDeque<ConversationRow>,
    search_term: String,
    active_id: Option<String>,
    active_model: String,
}

#[derive(Debug)]
pub enum SidebarMsg {
    /// Replace the list; entries must already be ordered most recent first.
    SetConversations {
        entries: Vec<SidebarEntry>,
        active_id: Option<String>,
    },
    SetActiveModel(String),
    NewChat,
    RowActivated(usize),
    ShowContextMenu(f64, f64, usize),
    RenameConversation(usize),
    ConfirmDelete(usize),
    ExportConversation(usize),
    SearchChanged(String),
}

#[derive(Debug)]
pub enum SidebarOutput {
    NewChat,
    ConversationSelected(String),
    DeleteConversation(String),
    RenameConversation(String, String),
    ExportConversation(String),
}

#[relm4::component(pub)]
impl Component for Sidebar {
    type Init = ();
    type Input = SidebarMsg;
    type Output = SidebarOutput;
    type CommandOutput = ();

    view! {
        adw::ToolbarView {
            add_top_bar = &adw::HeaderBar {
                set_show_end_title_buttons: false,

                pack_start = &gtk::Button {
                    set_icon_name: "list-add-symbolic",
                    set_tooltip_text: Some("New Chat"),
                    connect_clicked => SidebarMsg::NewChat,
                },

                #[wrap(Some)]
                set_title_widget = &adw::WindowTitle {
                    set_title: "Conversations",
                },
            },

            #[wrap(Some)]
            set_content = &gtk::Box {
                set_orientation: gtk::Orientation::Vertical,
                set_spacing: 0,

                gtk::SearchEntry {
                    set_placeholder_text: Some("Search conversations..."),
                    set_margin_start: 8,
                    set_margin_end: 8,
                    set_margin_top: 4,
                    set_margin_bottom: 4,
                    connect_search_changed[sender] => move |entry| {
                        sender.input(SidebarMsg::SearchChanged(entry.text().to_string()));
                    },
                },

                gtk::ScrolledWindow {
                    set_hscrollbar_policy: gtk::PolicyType::Never,
                    set_vexpand: true,

                    #[local_ref]
                    conversation_list -> gtk::ListBox {
                        set_selection_mode: gtk::SelectionMode::Single,
                        add_css_class: "navigation-sidebar",
                    },
                },

                gtk::Separator {},

                gtk::Box {
                    set_orientation: gtk::Orientation::Horizontal,
                    set_spacing: 6,
                    set_margin_all: 10,

                    gtk::Image {
                        set_icon_name: Some("applications-science-symbolic"),
                        add_css_class: "dim-label",
                    },

                    gtk::Label {
                        set_halign: gtk::Align::Start,
                        set_hexpand: true,
                        set_ellipsize: gtk::pango::EllipsizeMode::End,
                        add_css_class: "caption",
                        #[watch]
                        set_label: &catalog::display_name(&model.active_model),
                        #[watch]
                        set_tooltip_text: Some(&model.active_model),
                    },
                },
            },
        }
    }

    fn init(
        _init: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let rows = FactoryVecDeque::builder()
            .launch(gtk::ListBox::default())
            .detach();

        let model = Self {
            rows,
            search_term: String::new(),
            active_id: None,
            active_model: String::new(),
        };

        let conversation_list = model.rows.widget();
        let widgets = view_output!();

        let activate_sender = sender.clone();
        model.rows.widget().connect_row_activated(move |_, row| {
            activate_sender.input(SidebarMsg::RowActivated(row.index() as usize));
        });

        let gesture = gtk::GestureClick::new();
        gesture.set_button(3);
        let list = model.rows.widget().clone();
        let menu_sender = sender.clone();
        gesture.connect_released(move |_, _, x, y| {
            if let Some(row) = list.row_at_y(y as i32) {
                menu_sender.input(SidebarMsg::ShowContextMenu(x, y, row.index() as usize));
            }
        });
        model.rows.widget().add_controller(gesture);

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, root: &Self::Root) {
        match msg {
            SidebarMsg::SetConversations { entries, active_id } => {
                let mut guard = self.rows.guard();
                guard.clear();
                let now = Utc::now();
                let mut current_group: Option<&'static str> = None;
                for entry in entries {
                    let group = date_group(&entry.updated_at, &now);
                    if current_group != Some(group) {
                        current_group = Some(group);
                        guard.push_back(SidebarItem::Header(group));
                    }
                    guard.push_back(SidebarItem::Conversation(entry));
                }
                drop(guard);

                self.active_id = active_id;
                self.apply_search_filter();
                self.select_active_row();
            }
            SidebarMsg::SetActiveModel(model) => {
                self.active_model = model;
            }
            SidebarMsg::NewChat => {
                let _ = sender.output(SidebarOutput::NewChat);
            }
            SidebarMsg::RowActivated(index) => {
                if let Some(id) = self.entry_at(index).map(|e| e.id.clone()) {
                    let _ = sender.output(SidebarOutput::ConversationSelected(id));
                }
            }
            SidebarMsg::ShowContextMenu(x, y, index) => {
                if self.entry_at(index).is_some() {
                    self.show_context_menu(x, y, index, &sender);
                }
            }
            SidebarMsg::RenameConversation(index) => {
                if let Some(entry) = self.entry_at(index).cloned() {
                    present_rename_dialog(root, entry, sender.clone());
                }
            }
            SidebarMsg::ConfirmDelete(index) => {
                if let Some(entry) = self.entry_at(index).cloned() {
                    present_delete_dialog(root, entry, sender.clone());
                }
            }
            SidebarMsg::ExportConversation(index) => {
                if let Some(id) = self.entry_at(index).map(|e| e.id.clone()) {
                    let _ = sender.output(SidebarOutput::ExportConversation(id));
                }
            }
            SidebarMsg::SearchChanged(term) => {
                self.search_term = term.to_lowercase();
                self.apply_search_filter();
            }
        }
    }
}

impl Sidebar {
    fn entry_at(&self, index: usize) -> Option<&SidebarEntry> {
        match self.rows.get(index).map(|r| &r.item) {
            Some(SidebarItem::Conversation(entry)) => Some(entry),
            _ => None,
        }
    }

    fn select_active_row(&self) {
        let list = self.rows.widget();
        let position = self.active_id.as_deref().and_then(|id| {
            self.rows
                .iter()
                .position(|r| matches!(&r.item, SidebarItem::Conversation(e) if e.id == id))
        });
        match position.and_then(|i| list.row_at_index(i as i32)) {
            Some(row) => list.select_row(Some(&row)),
            None => list.unselect_all(),
        }
    }

    fn show_context_menu(&self, x: f64, y: f64, index: usize, sender: &ComponentSender<Self>) {
        let list_widget = self.rows.widget();

        let menu = gio::Menu::new();
        menu.append(Some("Rename"), Some("sidebar.rename"));
        menu.append(Some("Export"), Some("sidebar.export"));
        menu.append(Some("Delete"), Some("sidebar.delete"));

        let action_group = gio::SimpleActionGroup::new();
        let actions: [(&str, fn(usize) -> SidebarMsg); 3] = [
            ("rename", SidebarMsg::RenameConversation),
            ("export", SidebarMsg::ExportConversation),
            ("delete", SidebarMsg::ConfirmDelete),
        ];
        for (name, make_msg) in actions {
            let action = gio::SimpleAction::new(name, None);
            let action_sender = sender.clone();
            action.connect_activate(move |_, _| {
                action_sender.input(make_msg(index));
            });
            action_group.add_action(&action);
        }
        list_widget.insert_action_group("sidebar", Some(&action_group));

        let popover = gtk::PopoverMenu::from_model(Some(&menu));
        popover.set_parent(list_widget);
        popover.set_pointing_to(Some(&gtk::gdk::Rectangle::new(x as i32, y as i32, 1, 1)));
        popover.set_has_arrow(true);

        // Unparent on idle so the chosen action still fires.
        let parent = list_widget.clone();
        popover.connect_closed(move |p| {
            let popover = p.clone();
            let parent = parent.clone();
            glib::idle_add_local_once(move || {
                popover.unparent();
                parent.insert_action_group("sidebar", None::<&gio::SimpleActionGroup>);
            });
        });

        popover.popup();
    }

    fn apply_search_filter(&self) {
        let list_widget = self.rows.widget();
        let searching = !self.search_term.is_empty();

        for (i, row) in self.rows.iter().enumerate() {
            let visible = match &row.item {
                SidebarItem::Header(_) => !searching,
                SidebarItem::Conversation(entry) => {
                    !searching || entry.title.to_lowercase().contains(&self.search_term)
                }
            };
            if let Some(widget) = list_widget.row_at_index(i as i32) {
                widget.set_visible(visible);
            }
        }
    }
}

fn parent_window(widget: &impl IsA<gtk::Widget>) -> Option<gtk::Window> {
    widget
        .root()
        .and_then(|r| r.downcast::<gtk::Window>().ok())
}

fn present_rename_dialog(
    root: &adw::ToolbarView,
    entry: SidebarEntry,
    sender: ComponentSender<Sidebar>,
) {
    let dialog = adw::AlertDialog::builder()
        .heading("Rename Conversation")
        .body("Enter a new name:")
        .build();

    let text_entry = gtk::Entry::builder()
        .text(&entry.title)
        .activates_default(true)
        .build();

    dialog.set_extra_child(Some(&text_entry));
    dialog.add_response("cancel", "Cancel");
    dialog.add_response("rename", "Rename");
    dialog.set_response_appearance("rename", adw::ResponseAppearance::Suggested);
    dialog.set_default_response(Some("rename"));
    dialog.set_close_response("cancel");

    dialog.connect_response(None, move |_, response| {
        if response == "rename" {
            let new_title = text_entry.text().trim().to_string();
            if !new_title.is_empty() && new_title != entry.title {
                let _ = sender.output(SidebarOutput::RenameConversation(
                    entry.id.clone(),
                    new_title,
                ));
            }
        }
    });

    if let Some(window) = parent_window(root) {
        dialog.present(Some(&window));
    }
}

fn present_delete_dialog(
    root: &adw::ToolbarView,
    entry: SidebarEntry,
    sender: ComponentSender<Sidebar>,
) {
    let dialog = adw::AlertDialog::builder()
        .heading("Delete Conversation?")
        .body("Are you sure you want to delete this conversation? This action cannot be undone.")
        .build();
    dialog.add_response("cancel", "Cancel");
    dialog.add_response("delete", "Delete");
    dialog.set_response_appearance("delete", adw::ResponseAppearance::Destructive);
    dialog.set_default_response(Some("cancel"));
    dialog.set_close_response("cancel");

    dialog.connect_response(None, move |_, response| {
        if response == "delete" {
            let _ = sender.output(SidebarOutput::DeleteConversation(entry.id.clone()));
        }
    });

    if let Some(window) = parent_window(root) {
        dialog.present(Some(&window));
    }
}

/// Classify a timestamp into a date group label relative to `now`.
pub fn date_group(dt: &DateTime<Utc>, now: &DateTime<Utc>) -> &'static str {
    let today = now.date_naive();
    let date = dt.date_naive();

    if date >= today {
        "Today"
    } else if Some(date) == today.pred_opt() {
        "Yesterday"
    } else if date.iso_week() == today.iso_week() {
        "This Week"
    } else {
        "Older"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_date_groups() {
        // A Thursday
        let now = Utc.with_ymd_and_hms(2025, 4, 10, 15, 0, 0).unwrap();
        assert_eq!(date_group(&now, &now), "Today");
        assert_eq!(date_group(&(now - Duration::days(1)), &now), "Yesterday");
        assert_eq!(date_group(&(now - Duration::days(3)), &now), "This Week");
        assert_eq!(date_group(&(now - Duration::days(10)), &now), "Older");
    }

    #[test]
    fn test_entry_from_conversation() {
        let mut conv = Conversation::new("qwen/qwq-32b:free", Some("sys"));
        conv.title = "Trip".into();
        let entry = SidebarEntry::from(&conv);
        assert_eq!(entry.title, "Trip");
        assert!(entry.preview.is_none());
    }
}
