pub mod config;
pub mod controller;
pub mod gemini;
pub mod service;
pub mod view;

pub use config::{load_settings, GeminiConfig, Settings};
pub use controller::{
    GenerationOutcome, PendingGeneration, SessionState, StoryController, SubmitError,
    GENERATION_FAILED_MESSAGE, VALIDATION_MESSAGE,
};
pub use gemini::GeminiClient;
pub use service::{
    FragmentStream, GenerationError, GenerationRequest, TextGenerationService,
    UnavailableService, SYSTEM_INSTRUCTION,
};
pub use view::StoryView;
