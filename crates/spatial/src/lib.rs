//! Spatial hierarchy: transforms, cameras and lights.
//!
//! # Invariants
//! - Every node's world matrix derives from its parent's world matrix and its
//!   own local matrix, parent first, once per `update` pass.
//! - The hierarchy is acyclic; `add` refuses links that would close a loop.
//! - Cameras write world-projection matrices but never move nodes.

mod camera;
mod light;
mod transform;

pub use camera::{Camera, Lens, ProjectionMode};
pub use light::{Light, LightKind};
pub use transform::{SpatialError, TransformEvent, TransformNode, TransformTree};

pub fn crate_info() -> &'static str {
    "trellis-spatial v0.1.0"
}
