//! People Graph desktop app
//!
//! Explore contacts as a force-directed network grouped by a chosen dimension.

mod app;

use eframe::egui;
use tracing_subscriber::EnvFilter;

fn main() -> eframe::Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("people_graph=info")),
        )
        .init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_title("People Graph"),
        persist_window: true,
        ..Default::default()
    };

    eframe::run_native(
        "People Graph",
        options,
        Box::new(|cc| Ok(Box::new(app::PeopleGraphApp::new(cc)))),
    )
}
