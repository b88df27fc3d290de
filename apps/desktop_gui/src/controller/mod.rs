//! Controller layer: UI events and command orchestration around the story controller.

pub mod events;
pub mod orchestration;
