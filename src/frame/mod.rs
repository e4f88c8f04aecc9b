//! Per-frame resources and recording

pub mod renderer;
pub mod resources;

pub use renderer::{FrameInputs, FrameRenderer, FrameState};
pub use resources::{FrameResourceSet, FrameUniformBlock};
