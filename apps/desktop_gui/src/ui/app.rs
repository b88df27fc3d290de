use arboard::Clipboard;
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use serde::{Deserialize, Serialize};
use story_core::{
    view::{PROMPT_HINT, PROMPT_LABEL, TITLE},
    StoryController, StoryView,
};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::{UiError, UiEvent},
    orchestration::request_story,
};

pub const SETTINGS_STORAGE_KEY: &str = "story_writer.desktop_settings";

const PROMPT_EDITOR_ID: &str = "story_prompt";
const ERROR_TEXT: egui::Color32 = egui::Color32::from_rgb(220, 90, 90);
const BANNER_FILL: egui::Color32 = egui::Color32::from_rgb(111, 53, 53);

/// What survives a restart: the unfinished prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDesktopSettings {
    #[serde(default)]
    pub prompt_draft: String,
}

pub struct StoryWriterApp {
    controller: StoryController,
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    status: String,
    status_banner: Option<UiError>,
}

impl StoryWriterApp {
    pub fn new(
        controller: StoryController,
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        persisted_settings: Option<PersistedDesktopSettings>,
    ) -> Self {
        if let Some(settings) = persisted_settings {
            controller.edit_prompt(settings.prompt_draft);
        }
        Self {
            controller,
            cmd_tx,
            ui_rx,
            status: "Starting...".to_string(),
            status_banner: None,
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => {
                    self.status = message;
                }
                UiEvent::Error(err) => {
                    tracing::warn!(
                        category = ?err.category(),
                        context = ?err.context(),
                        "{}",
                        err.message()
                    );
                    self.status = err.headline().to_string();
                    self.status_banner = Some(err);
                }
            }
        }
    }

    fn request_story(&mut self) {
        if let Err(err) = request_story(&self.cmd_tx, &self.controller) {
            self.status = err.headline().to_string();
            self.status_banner = Some(err);
        }
    }

    fn copy_story(&mut self, story: &str) {
        match Clipboard::new().and_then(|mut clipboard| clipboard.set_text(story.to_string())) {
            Ok(()) => self.status = "Story copied to clipboard".to_string(),
            Err(err) => {
                tracing::warn!("clipboard unavailable: {err}");
                self.status = "Clipboard unavailable".to_string();
            }
        }
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        let Some(banner) = self.status_banner.clone() else {
            return;
        };
        egui::Frame::group(ui.style())
            .fill(BANNER_FILL)
            .show(ui, |ui| {
                ui.horizontal_wrapped(|ui| {
                    ui.label(
                        egui::RichText::new(format!("{}: {}", banner.headline(), banner.message()))
                            .color(egui::Color32::WHITE),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Dismiss").clicked() {
                            self.status_banner = None;
                        }
                    });
                });
            });
        ui.add_space(8.0);
    }

    fn show_story_form(&mut self, ui: &mut egui::Ui, view: &StoryView) {
        let prompt_id = egui::Id::new(PROMPT_EDITOR_ID);
        // Taken before the editor runs, otherwise it inserts a newline first.
        let submit_shortcut = ui.memory(|memory| memory.has_focus(prompt_id))
            && ui.input_mut(|input| input.consume_key(egui::Modifiers::COMMAND, egui::Key::Enter));

        let mut prompt = view.prompt.clone();
        let response = ui
            .add_enabled(
                view.prompt_enabled,
                egui::TextEdit::multiline(&mut prompt)
                    .id(prompt_id)
                    .hint_text(PROMPT_HINT)
                    .desired_rows(4)
                    .desired_width(f32::INFINITY),
            )
            .on_hover_text(PROMPT_LABEL);
        if response.changed() {
            self.controller.edit_prompt(prompt);
        }

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let clicked = ui
                .add_enabled(view.action_enabled, egui::Button::new(view.action_label))
                .clicked();
            if clicked || (submit_shortcut && view.action_enabled) {
                self.request_story();
            }
            if ui
                .add_enabled(!view.story.is_empty(), egui::Button::new("Copy story"))
                .clicked()
            {
                self.copy_story(&view.story);
            }
        });

        if let Some(error_line) = &view.error_line {
            ui.add_space(4.0);
            ui.colored_label(ERROR_TEXT, error_line.as_str());
        }
    }

    fn show_story_output(&self, ui: &mut egui::Ui, view: &StoryView) {
        egui::ScrollArea::vertical()
            .id_salt("story_output")
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                if let Some(placeholder) = view.placeholder {
                    ui.weak(placeholder);
                }
                ui.label(view.story.as_str());
            });
    }

    fn persisted_settings(&self) -> PersistedDesktopSettings {
        PersistedDesktopSettings {
            prompt_draft: self.controller.snapshot().prompt,
        }
    }
}

impl eframe::App for StoryWriterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        let view = StoryView::project(&self.controller.snapshot());

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.small(self.status.as_str());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(TITLE);
            ui.add_space(8.0);
            self.show_status_banner(ui);
            self.show_story_form(ui, &view);
            ui.separator();
            self.show_story_output(ui, &view);
        });

        if !view.action_enabled {
            // The backend also pokes us on every fragment; this covers a
            // wake-up lost while the window was hidden.
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        if let Ok(serialized) = serde_json::to_string(&self.persisted_settings()) {
            storage.set_string(SETTINGS_STORAGE_KEY, serialized);
        }
    }
}
