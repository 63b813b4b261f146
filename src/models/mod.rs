//! Domain models for tabdeck.
//!
//! # Core Concepts
//!
//! - [`Entity`]: snapshot of a group-like container owned by the host tree.
//!   Groups are decorated; folders and split views carry an exclusion marker.
//! - [`LifecycleState`]: where the registry has an entity (Discovered → Initialized → Destroyed).
//! - [`Namespace`]: the two persisted record sets, `colors` and `icons`.
//! - [`Rgb`] / [`PickerSample`]: color math shared by favicon sampling and the color picker.

mod color;
mod entity;
mod namespace;

pub use color::*;
pub use entity::*;
pub use namespace::*;
