mod app;
mod config;
mod models;
mod providers;
mod services;
mod ui;

use gtk::prelude::*;
use relm4::prelude::*;
use tracing_subscriber::EnvFilter;

use app::App;
use config::APP_ID;

const STYLE: &str = include_str!("style.css");

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting {} {}", config::APP_NAME, config::VERSION);

    let app = adw::Application::builder().application_id(APP_ID).build();

    app.connect_startup(|_| {
        gtk::Window::set_default_icon_name(APP_ID);

        let Some(display) = gtk::gdk::Display::default() else {
            tracing::warn!("No display available; skipping stylesheet");
            return;
        };
        let provider = gtk::CssProvider::new();
        provider.load_from_string(STYLE);
        gtk::style_context_add_provider_for_display(
            &display,
            &provider,
            gtk::STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    });

    RelmApp::from_app(app).run_async::<App>(());
}
