//! Shared ids and math helpers for the trellis workspace.
//!
//! `glam` is the linear-algebra collaborator; this crate only adds the
//! handful of guarded operations the scene graph needs on top of it.

pub mod math;
mod types;

pub use math::MathError;
pub use types::{IdGenerator, NodeId};

pub fn crate_info() -> &'static str {
    "trellis-common v0.1.0"
}
