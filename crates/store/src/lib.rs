//! Store: the per-node memoized state substrate every behavior runs against.
//!
//! # Invariants
//! - A prop's clamp rule and initial value are fixed by its first declaration.
//! - Within one run, the Nth positional slot call addresses the same slot as
//!   the Nth call of every other run, provided the owner calls `reset` first.
//! - Effect dependency writes become visible only after `flush`.

mod prop;
mod store;

pub use prop::{Clamp, PropValue};
pub use store::{Effect, SlotKey, Store, StoreError};

pub fn crate_info() -> &'static str {
    "trellis-store v0.1.0"
}
