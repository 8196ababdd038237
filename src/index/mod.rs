//! Property indexes and uniqueness constraints maintained from merged views.
//!
//! Commits describe each touched node by its committed and merged
//! [`NodeProjection`]s; [`NodeUpdates`] turns the pair into at most one
//! [`IndexUpdate`] per index, which [`IndexStore`] checks and applies.

mod store;
mod types;
mod updates;

pub use store::IndexStore;
pub use types::{IndexDef, TypeTag};
pub use updates::{IndexUpdate, NodeProjection, NodeUpdates};
