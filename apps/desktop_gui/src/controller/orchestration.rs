//! Command orchestration from UI actions to the backend command queue.

use crossbeam_channel::{Sender, TrySendError};
use story_core::{PendingGeneration, StoryController};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext};

/// Accepts the current prompt on the UI thread and hands the ticket to the backend.
///
/// Validation failures are already reflected in the controller state. A ticket
/// that cannot be queued is failed immediately so the UI never stays loading.
pub fn request_story(
    cmd_tx: &Sender<BackendCommand>,
    controller: &StoryController,
) -> Result<(), UiError> {
    let Ok(ticket) = controller.begin_submission() else {
        return Ok(());
    };
    dispatch_generation(cmd_tx, controller, ticket)
}

fn dispatch_generation(
    cmd_tx: &Sender<BackendCommand>,
    controller: &StoryController,
    ticket: PendingGeneration,
) -> Result<(), UiError> {
    let generation = ticket.generation();
    match cmd_tx.try_send(BackendCommand::Generate(ticket)) {
        Ok(()) => {
            tracing::debug!(command = "generate", generation, "queued ui->backend command");
            Ok(())
        }
        Err(TrySendError::Full(BackendCommand::Generate(ticket))) => {
            tracing::warn!(command = "generate", "ui->backend command queue is full");
            controller.fail(ticket, "ui->backend command queue is full");
            Err(UiError::from_message(
                UiErrorContext::CommandQueue,
                "UI command queue is full; please retry",
            ))
        }
        Err(TrySendError::Disconnected(BackendCommand::Generate(ticket))) => {
            tracing::error!(command = "generate", "ui->backend command queue disconnected");
            controller.fail(ticket, "ui->backend command queue disconnected");
            Err(UiError::from_message(
                UiErrorContext::CommandQueue,
                "Backend command processor disconnected (possible startup/runtime failure); restart the app",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::events::UiErrorCategory;
    use crossbeam_channel::bounded;
    use story_core::{GENERATION_FAILED_MESSAGE, VALIDATION_MESSAGE};

    #[test]
    fn queues_ticket_with_captured_prompt() {
        let (cmd_tx, cmd_rx) = bounded(4);
        let controller = StoryController::new();
        controller.edit_prompt("A shy dragon");

        request_story(&cmd_tx, &controller).expect("queued");

        let BackendCommand::Generate(ticket) = cmd_rx.try_recv().expect("command");
        assert_eq!(ticket.prompt(), "A shy dragon");
        assert!(controller.snapshot().is_loading);
    }

    #[test]
    fn empty_prompt_queues_nothing() {
        let (cmd_tx, cmd_rx) = bounded(4);
        let controller = StoryController::new();

        request_story(&cmd_tx, &controller).expect("validation is not a dispatch error");

        assert!(cmd_rx.try_recv().is_err());
        let state = controller.snapshot();
        assert_eq!(state.error, VALIDATION_MESSAGE);
        assert!(!state.is_loading);
    }

    #[test]
    fn full_queue_fails_the_ticket() {
        let (cmd_tx, _cmd_rx) = bounded(0);
        let controller = StoryController::new();
        controller.edit_prompt("A shy dragon");

        let err = request_story(&cmd_tx, &controller).expect_err("queue full");

        assert_eq!(err.context(), UiErrorContext::CommandQueue);
        let state = controller.snapshot();
        assert!(!state.is_loading);
        assert_eq!(state.error, GENERATION_FAILED_MESSAGE);
    }

    #[test]
    fn disconnected_backend_fails_the_ticket() {
        let (cmd_tx, cmd_rx) = bounded(4);
        drop(cmd_rx);
        let controller = StoryController::new();
        controller.edit_prompt("A shy dragon");

        let err = request_story(&cmd_tx, &controller).expect_err("disconnected");

        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(!controller.snapshot().is_loading);
    }
}
