//! Backend worker thread: owns the tokio runtime and the generation service.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use story_core::{
    GeminiClient, Settings, StoryController, TextGenerationService, UnavailableService,
};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    controller: StoryController,
    settings: Settings,
    repaint: egui::Context,
) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let service = build_service(&settings, &ui_tx);

            let mut changes = controller.subscribe();
            tokio::spawn(async move {
                while changes.changed().await.is_ok() {
                    repaint.request_repaint();
                }
            });

            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));
            while let Ok(cmd) = cmd_rx.recv() {
                tracing::debug!(command = cmd.name(), "backend received command");
                match cmd {
                    BackendCommand::Generate(ticket) => {
                        let generation = ticket.generation();
                        let outcome = controller.run(ticket, service.as_ref()).await;
                        tracing::debug!(generation, ?outcome, "generation resolved");
                    }
                }
            }
            tracing::info!("ui command queue closed; backend worker exiting");
        });
    });
}

/// Falls back to a service that fails every request, so a bad config still
/// resolves submissions through the normal error path.
fn build_service(settings: &Settings, ui_tx: &Sender<UiEvent>) -> Arc<dyn TextGenerationService> {
    match settings.gemini_config() {
        Ok(config) => {
            tracing::info!(model = %config.model, base_url = %config.base_url, "generation backend ready");
            Arc::new(GeminiClient::new(config))
        }
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!("backend worker startup failure: {err}"),
            )));
            tracing::warn!("generation backend unavailable: {err}");
            Arc::new(UnavailableService::new(err.to_string()))
        }
    }
}
