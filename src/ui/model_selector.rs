use std::cell::RefCell;
use std::rc::Rc;

use gtk::prelude::*;
use relm4::prelude::*;

use crate::models::ModelInfo;

pub struct ModelSelector {
    models: Rc<RefCell<Vec<ModelInfo>>>,
    selected_index: Option<usize>,
    dropdown: gtk::DropDown,
    /// Set while the dropdown is repopulated so the resulting
    /// selected-notify signals are not reported as user choices.
    updating: bool,
}

#[derive(Debug)]
pub enum ModelSelectorMsg {
    SetModels(Vec<ModelInfo>),
    SyncToModel(String),
    ModelChanged(u32),
    FinishSync,
}

#[derive(Debug)]
pub enum ModelSelectorOutput {
    ModelSelected(String),
}

#[relm4::component(pub)]
impl Component for ModelSelector {
    type Init = Vec<ModelInfo>;
    type Input = ModelSelectorMsg;
    type Output = ModelSelectorOutput;
    type CommandOutput = ();

    view! {
        gtk::Box {
            set_orientation: gtk::Orientation::Horizontal,

            #[local_ref]
            dropdown -> gtk::DropDown {
                set_tooltip_text: Some("Select model"),
                add_css_class: "flat",
            },
        }
    }

    fn init(
        models: Self::Init,
        root: Self::Root,
        sender: ComponentSender<Self>,
    ) -> ComponentParts<Self> {
        let dropdown = gtk::DropDown::builder().build();
        let models = Rc::new(RefCell::new(models));
        dropdown.set_list_factory(Some(&list_factory(models.clone())));

        let mut model = Self {
            models,
            selected_index: None,
            dropdown: dropdown.clone(),
            updating: true,
        };
        model.sync_dropdown(0);

        let widgets = view_output!();

        let sender_dd = sender.clone();
        dropdown.connect_selected_notify(move |dd| {
            sender_dd.input(ModelSelectorMsg::ModelChanged(dd.selected()));
        });
        sender.input(ModelSelectorMsg::FinishSync);

        ComponentParts { model, widgets }
    }

    fn update(&mut self, msg: Self::Input, sender: ComponentSender<Self>, _root: &Self::Root) {
        match msg {
            ModelSelectorMsg::SetModels(models) => {
                let current = self.selected_id();
                self.updating = true;
                *self.models.borrow_mut() = models;
                let index = current
                    .and_then(|id| self.index_of(&id))
                    .unwrap_or(0);
                self.sync_dropdown(index);
                // set_model fires selected-notify synchronously; clear the
                // guard only after those queued messages have run.
                sender.input(ModelSelectorMsg::FinishSync);
            }
            ModelSelectorMsg::SyncToModel(id) => {
                self.updating = true;
                match self.index_of(&id) {
                    Some(index) => {
                        self.selected_index = Some(index);
                        self.dropdown.set_selected(index as u32);
                    }
                    None => {
                        // Conversations may reference a model no longer listed
                        let mut models = self.models.borrow_mut();
                        models.push(ModelInfo {
                            name: id.clone(),
                            provider: String::new(),
                            description: None,
                            context_length: 0,
                            input_price: 0.0,
                            output_price: 0.0,
                            id,
                        });
                        let last = models.len() - 1;
                        drop(models);
                        self.sync_dropdown(last);
                    }
                }
                sender.input(ModelSelectorMsg::FinishSync);
            }
            ModelSelectorMsg::ModelChanged(index) => {
                if self.updating {
                    return;
                }
                let index = index as usize;
                if self.selected_index == Some(index) {
                    return;
                }
                let id = self.models.borrow().get(index).map(|m| m.id.clone());
                if let Some(id) = id {
                    self.selected_index = Some(index);
                    let _ = sender.output(ModelSelectorOutput::ModelSelected(id));
                }
            }
            ModelSelectorMsg::FinishSync => {
                self.updating = false;
            }
        }
    }
}

impl ModelSelector {
    fn index_of(&self, id: &str) -> Option<usize> {
        self.models.borrow().iter().position(|m| m.id == id)
    }

    fn selected_id(&self) -> Option<String> {
        self.selected_index
            .and_then(|i| self.models.borrow().get(i).map(|m| m.id.clone()))
    }

    fn sync_dropdown(&mut self, selected: usize) {
        let names: Vec<String> = self.models.borrow().iter().map(|m| m.name.clone()).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let list = gtk::StringList::new(&refs);
        self.dropdown.set_model(Some(&list));
        if !names.is_empty() {
            self.dropdown.set_selected(selected as u32);
            self.selected_index = Some(selected);
        } else {
            self.selected_index = None;
        }
    }
}

/// Popup rows show the model name with its description underneath.
fn list_factory(models: Rc<RefCell<Vec<ModelInfo>>>) -> gtk::SignalListItemFactory {
    let factory = gtk::SignalListItemFactory::new();

    factory.connect_setup(|_, item| {
        let Some(item) = item.downcast_ref::<gtk::ListItem>() else {
            return;
        };
        let row = gtk::Box::builder()
            .orientation(gtk::Orientation::Vertical)
            .spacing(2)
            .margin_top(4)
            .margin_bottom(4)
            .build();
        let name = gtk::Label::builder().halign(gtk::Align::Start).build();
        let description = gtk::Label::builder()
            .halign(gtk::Align::Start)
            .wrap(true)
            .max_width_chars(40)
            .xalign(0.0)
            .build();
        description.add_css_class("caption");
        description.add_css_class("dim-label");
        row.append(&name);
        row.append(&description);
        item.set_child(Some(&row));
    });

    factory.connect_bind(move |_, item| {
        let Some(item) = item.downcast_ref::<gtk::ListItem>() else {
            return;
        };
        let Some(row) = item.child().and_downcast::<gtk::Box>() else {
            return;
        };
        let name = row.first_child().and_downcast::<gtk::Label>();
        let description = row.last_child().and_downcast::<gtk::Label>();
        let models = models.borrow();
        let Some(info) = models.get(item.position() as usize) else {
            return;
        };
        if let Some(name) = name {
            name.set_label(&info.name);
        }
        if let Some(description) = description {
            let text = info.description.as_deref().unwrap_or(&info.id);
            description.set_label(text);
        }
    });

    factory
}
