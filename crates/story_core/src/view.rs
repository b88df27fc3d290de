//! What a front end shows for a given session state.

use crate::controller::SessionState;

pub const TITLE: &str = "Story Writer";
pub const PROMPT_HINT: &str = "A shy dragon who loves to bake...";
pub const PROMPT_LABEL: &str = "Story prompt";
pub const GENERATE_LABEL: &str = "Generate Story";
pub const WRITING_LABEL: &str = "Writing...";
pub const STORY_PLACEHOLDER: &str = "Your story will appear here...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryView {
    pub prompt: String,
    pub prompt_enabled: bool,
    pub action_label: &'static str,
    pub action_enabled: bool,
    pub error_line: Option<String>,
    pub placeholder: Option<&'static str>,
    pub story: String,
}

impl StoryView {
    pub fn project(state: &SessionState) -> Self {
        Self {
            prompt: state.prompt.clone(),
            prompt_enabled: !state.is_loading,
            action_label: if state.is_loading {
                WRITING_LABEL
            } else {
                GENERATE_LABEL
            },
            action_enabled: !state.is_loading,
            error_line: (!state.error.is_empty()).then(|| state.error.clone()),
            placeholder: (state.is_loading && state.story.is_empty()).then_some(STORY_PLACEHOLDER),
            story: state.story.clone(),
        }
    }
}

impl From<&SessionState> for StoryView {
    fn from(state: &SessionState) -> Self {
        Self::project(state)
    }
}
