use std::path::PathBuf;

mod backend_bridge;
mod controller;
mod ui;

use anyhow::{anyhow, Result};
use backend_bridge::commands::BackendCommand;
use clap::Parser;
use controller::events::UiEvent;
use crossbeam_channel::bounded;
use eframe::egui;
use story_core::{load_settings, Settings, StoryController};
use tracing_subscriber::EnvFilter;
use ui::{PersistedDesktopSettings, StoryWriterApp, SETTINGS_STORAGE_KEY};

#[derive(Parser, Debug)]
#[command(name = "desktop_gui", about = "Story Writer desktop app")]
struct Args {
    /// TOML config file (defaults to ./story_writer.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let settings = match load_settings(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            // Keep the window usable; the backend reports the missing key itself.
            tracing::error!("failed to load settings, continuing with defaults: {err:#}");
            Settings::default()
        }
    }
    .with_overrides(args.model, args.base_url);

    let controller = StoryController::new();
    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(16);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Story Writer")
            .with_inner_size([720.0, 640.0])
            .with_min_inner_size([420.0, 360.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Story Writer",
        options,
        Box::new(move |cc| {
            backend_bridge::runtime::launch(
                cmd_rx,
                ui_tx,
                controller.clone(),
                settings,
                cc.egui_ctx.clone(),
            );
            let persisted_settings = cc.storage.and_then(|storage| {
                storage
                    .get_string(SETTINGS_STORAGE_KEY)
                    .and_then(|text| serde_json::from_str::<PersistedDesktopSettings>(&text).ok())
            });
            Ok(Box::new(StoryWriterApp::new(
                controller,
                cmd_tx,
                ui_rx,
                persisted_settings,
            )))
        }),
    )
    .map_err(|err| anyhow!("desktop GUI exited with an error: {err}"))
}
