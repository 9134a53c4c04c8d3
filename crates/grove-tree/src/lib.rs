//! Record model for the Grove store.
//!
//! A stored tree node is a small cluster of records: a slot-structured
//! `Node` record pointing at a [`NodeTemplate`] record describing its shape,
//! one `Value` record per general property, and, when the node has two or
//! more children, a canonical hash-trie map ([`MapRecord`]) from child name
//! to child node record. [`NodeState`] composes these records into the
//! immutable read view the rest of the system works against.
//!
//! # Layout
//!
//! Node records are arrays of record-id-wide slots (`W = RecordId::BYTES`):
//!
//! ```text
//! [0 .. W)    record header, zero-padded to the slot width
//! [W .. 2W)   child pointer (single child node, or map root) -- only when
//!             the node has children
//! [next W)    template record id
//! [then]      one slot per general property value, in template order
//! ```
//!
//! General property slots therefore start at `2W` for childless nodes and
//! `3W` otherwise, and the slot for property index `i` sits at
//! `base + i * W`.
//!
//! # Design Rules
//!
//! 1. Unchanged substructure is shared across versions by record id, never
//!    copied.
//! 2. Templates keep their general property array sorted by name; lookups
//!    binary-search it.
//! 3. Well-typed reserved type properties live in template slots, not in
//!    the general array; ill-typed ones fall through as ordinary
//!    properties.
//! 4. Child maps are canonical: one entry set has exactly one stored shape.
//! 5. Decoding validates what it reads and fails with the offending record
//!    id rather than returning a plausible wrong value.

pub mod error;
pub mod map;
pub mod state;
pub mod template;
pub mod value;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{TreeError, TreeResult};
pub use map::{update_map, write_map, MapOp, MapRecord};
pub use state::NodeState;
pub use template::{ChildLayout, EffectiveProperty, NodeTemplate, PropertyTemplate};
pub use value::{read_typed_value, read_value, write_value};
