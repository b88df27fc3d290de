//! UI layer for desktop GUI: the story writer window.

pub mod app;

pub use app::{PersistedDesktopSettings, StoryWriterApp, SETTINGS_STORAGE_KEY};
