//! Backend commands queued from UI to backend worker.

use story_core::PendingGeneration;

pub enum BackendCommand {
    /// Stream the story for a submission the UI already accepted.
    Generate(PendingGeneration),
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Generate(_) => "generate",
        }
    }
}
