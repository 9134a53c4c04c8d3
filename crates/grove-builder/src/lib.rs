//! Copy-on-write transactions over Grove trees.
//!
//! A [`NodeBuilder`] is a mutable handle onto one conceptual node of a new
//! tree version. Handles are cheap, clonable, and share one transaction
//! arena: every path has a single mutable node, however many handles point
//! at it. Mutations accumulate in an in-memory overlay; nothing is written
//! until [`node_state`](NodeBuilder::node_state) persists the changed
//! records and stitches them to the untouched remainder of the base
//! version by record id.
//!
//! # Design Rules
//!
//! 1. A builder transaction belongs to one thread; the states it consumes
//!    and produces are immutable and shareable.
//! 2. Handles connect on write: touching a path keeps it attached to
//!    whatever node currently lives there.
//! 3. Removal disconnects. A handle onto a removed node fails every
//!    operation until the path is re-added, and re-adding yields a fresh
//!    node, never the removed content.
//! 4. Materializing an untouched builder is free and returns the base
//!    state itself.

pub mod builder;
pub mod error;
pub mod path;

mod arena;
mod materialize;

pub use builder::{Buildable, NodeBuilder};
pub use error::{BuilderError, BuilderResult};
pub use path::NodePath;
