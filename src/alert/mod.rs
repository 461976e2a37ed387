//! Alert rendering
//!
//! Turns an alert request (username + image + color) into a fade-in,
//! fade-out animation drawn on an overlay surface, with an audio cue:
//! - Asset catalog lookups (image size, text offsets, audio id)
//! - Bottom-right anchored layout computed once per alert
//! - Per-frame opacity stepping
//! - Pluggable surfaces and audio players

mod assets;
mod audio;
mod fade;
mod layout;
mod renderer;
mod surface;

pub use assets::*;
pub use audio::*;
pub use fade::*;
pub use layout::*;
pub use renderer::*;
pub use surface::*;
