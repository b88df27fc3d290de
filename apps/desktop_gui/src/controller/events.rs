//! Backend-to-UI events and error modeling for the desktop GUI.
//!
//! These never carry story text; the story itself flows through
//! `StoryController` subscriptions.

pub enum UiEvent {
    Info(String),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Configuration,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    CommandQueue,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("api key")
            || message_lower.contains("api_key")
            || message_lower.contains("base url")
            || message_lower.contains("model name")
            || message_lower.contains("config")
        {
            UiErrorCategory::Configuration
        } else if message_lower.contains("disconnected")
            || message_lower.contains("queue")
            || message_lower.contains("runtime")
            || message_lower.contains("connection")
            || message_lower.contains("unavailable")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headline(&self) -> &'static str {
        match self.category {
            UiErrorCategory::Configuration => "Configuration problem",
            UiErrorCategory::Transport => "Backend unavailable",
            UiErrorCategory::Unknown => "Unexpected error",
        }
    }
}
