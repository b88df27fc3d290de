//! Seam between the story controller and whatever produces text.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use shared::error::{ApiException, ErrorCode};
use thiserror::Error;

pub const SYSTEM_INSTRUCTION: &str = "You are a creative and engaging storyteller for all ages. Write a short story based on the user's prompt.";

/// Fragments in delivery order. An `Err` item ends the stream.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_instruction: String,
}

impl GenerationRequest {
    pub fn story(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generation API rejected the request: {0}")]
    Api(#[from] ApiException),
    #[error("malformed stream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed event stream: {0}")]
    EventStream(String),
    #[error("prompt blocked: {0}")]
    Blocked(String),
    #[error("generation service unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Classification used for log fields; users only ever see the generic message.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Api(exception) => exception.status,
            Self::Transport(err) if err.is_timeout() => ErrorCode::DeadlineExceeded,
            Self::Transport(err) => err
                .status()
                .map(|status| ErrorCode::from_http_status(status.as_u16()))
                .unwrap_or(ErrorCode::Unavailable),
            Self::Decode(_) | Self::EventStream(_) => ErrorCode::Internal,
            Self::Blocked(_) => ErrorCode::InvalidArgument,
            Self::Unavailable(_) => ErrorCode::FailedPrecondition,
        }
    }
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Starts a generation. Failures before the first byte may surface either
    /// here or as the first stream item; callers treat both the same.
    async fn stream_generate(
        &self,
        request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError>;
}

/// Stands in when no usable backend could be configured.
pub struct UnavailableService {
    reason: String,
}

impl UnavailableService {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextGenerationService for UnavailableService {
    async fn stream_generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let err = GenerationError::Unavailable(self.reason.clone());
        Ok(Box::pin(stream::once(async move { Err::<String, _>(err) })))
    }
}
