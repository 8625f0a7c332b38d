//! Scene orchestration: one transform tree, its behaviors, and the frame loop.
//!
//! # Frame order
//! 1. Transforms propagate from the root.
//! 2. Every model runs its mesh and material behaviors.
//! 3. Every camera distributes its projection.
//! 4. The renderer builds, clears and executes the frame's draws.
//! 5. Model and camera stores commit their deferred effect writes.

mod config;
mod scene;

pub use config::SceneConfig;
pub use scene::{Scene, SceneError};

pub fn crate_info() -> &'static str {
    "trellis-scene v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("scene"));
    }
}
