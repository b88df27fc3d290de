//! The story session state machine.
//!
//! `StoryController` owns the one session record and publishes every change
//! through a `watch` channel, so any number of views can re-render from
//! snapshots while a single worker drives the generation stream.
//!
//! A submission is split in two: [`StoryController::begin_submission`]
//! validates and flips `is_loading` synchronously, then
//! [`StoryController::run`] consumes the fragment stream. Front ends that hand
//! work to another thread call the first on the UI side and ship the returned
//! [`PendingGeneration`] ticket to the worker.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::service::{GenerationError, GenerationRequest, TextGenerationService};

pub const VALIDATION_MESSAGE: &str = "Please enter a prompt to start your story.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "An error occurred while writing the story. Please try again.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub prompt: String,
    pub story: String,
    pub is_loading: bool,
    pub error: String,
}

/// Proof that a submission was accepted; carries the prompt captured at that moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGeneration {
    generation: u64,
    prompt: String,
}

impl PendingGeneration {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Please enter a prompt to start your story.")]
    EmptyPrompt,
    #[error("a story is already being written")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed { fragments: usize },
    Failed { fragments: usize },
    /// The ticket was already resolved; nothing was applied.
    Superseded,
}

struct Inner {
    state: watch::Sender<SessionState>,
    // Only read or bumped while the watch value is locked.
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct StoryController {
    inner: Arc<Inner>,
}

impl Default for StoryController {
    fn default() -> Self {
        Self::new()
    }
}

impl StoryController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(Inner {
                state,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Allowed in any state; an in-flight request keeps the prompt it captured.
    pub fn edit_prompt(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.state.send_if_modified(|state| {
            if state.prompt == text {
                return false;
            }
            state.prompt = text;
            true
        });
    }

    pub fn begin_submission(&self) -> Result<PendingGeneration, SubmitError> {
        let mut outcome = Err(SubmitError::Busy);
        self.inner.state.send_if_modified(|state| {
            if state.is_loading {
                return false;
            }
            if state.prompt.is_empty() {
                outcome = Err(SubmitError::EmptyPrompt);
                if state.error == VALIDATION_MESSAGE {
                    return false;
                }
                state.error = VALIDATION_MESSAGE.to_string();
                return true;
            }

            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            state.error.clear();
            state.story.clear();
            state.is_loading = true;
            outcome = Ok(PendingGeneration {
                generation,
                prompt: state.prompt.clone(),
            });
            true
        });

        match &outcome {
            Ok(ticket) => debug!(generation = ticket.generation, "story submission accepted"),
            Err(err) => debug!(reason = %err, "story submission rejected"),
        }
        outcome
    }

    /// Drives one accepted submission to its terminal state.
    pub async fn run(
        &self,
        ticket: PendingGeneration,
        service: &dyn TextGenerationService,
    ) -> GenerationOutcome {
        let request = GenerationRequest::story(ticket.prompt.clone());
        let mut stream = match service.stream_generate(request).await {
            Ok(stream) => stream,
            Err(err) => return self.finish_failed(&ticket, &err, 0),
        };

        let mut fragments = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) if text.is_empty() => continue,
                Ok(text) => {
                    if !self.update_current(&ticket, |state| state.story.push_str(&text)) {
                        debug!(
                            generation = ticket.generation,
                            "dropping fragment for a resolved generation"
                        );
                        return GenerationOutcome::Superseded;
                    }
                    fragments += 1;
                }
                Err(err) => return self.finish_failed(&ticket, &err, fragments),
            }
        }

        if self.update_current(&ticket, |state| state.is_loading = false) {
            info!(generation = ticket.generation, fragments, "story complete");
            GenerationOutcome::Completed { fragments }
        } else {
            GenerationOutcome::Superseded
        }
    }

    pub async fn submit(
        &self,
        service: &dyn TextGenerationService,
    ) -> Result<GenerationOutcome, SubmitError> {
        let ticket = self.begin_submission()?;
        Ok(self.run(ticket, service).await)
    }

    /// Resolves a ticket that never reached a worker.
    pub fn fail(&self, ticket: PendingGeneration, reason: impl fmt::Display) -> GenerationOutcome {
        error!(
            generation = ticket.generation,
            "story generation could not start: {reason}"
        );
        self.resolve_failure(&ticket, 0)
    }

    fn finish_failed(
        &self,
        ticket: &PendingGeneration,
        err: &GenerationError,
        fragments: usize,
    ) -> GenerationOutcome {
        error!(
            generation = ticket.generation,
            code = ?err.code(),
            fragments,
            "story generation failed: {err}"
        );
        self.resolve_failure(ticket, fragments)
    }

    fn resolve_failure(&self, ticket: &PendingGeneration, fragments: usize) -> GenerationOutcome {
        let applied = self.update_current(ticket, |state| {
            state.error = GENERATION_FAILED_MESSAGE.to_string();
            state.is_loading = false;
        });
        if applied {
            GenerationOutcome::Failed { fragments }
        } else {
            GenerationOutcome::Superseded
        }
    }

    /// Applies `apply` only while `ticket` is the outstanding generation.
    fn update_current(
        &self,
        ticket: &PendingGeneration,
        apply: impl FnOnce(&mut SessionState),
    ) -> bool {
        let mut current = false;
        self.inner.state.send_if_modified(|state| {
            current = state.is_loading
                && self.inner.generation.load(Ordering::SeqCst) == ticket.generation;
            if current {
                apply(state);
            }
            current
        });
        current
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
