//! Segment storage for the Grove store.
//!
//! Grove persists trees as records packed into immutable segments. A record
//! is addressed by [`RecordId`](grove_types::RecordId) (segment identity
//! plus byte offset) and starts with a fixed 4-byte header tagging its kind.
//! Higher layers compose records into nodes, templates, child maps, and
//! property values; this crate only frames, stores, and retrieves them.
//!
//! # Storage Backends
//!
//! All backends implement [`SegmentReader`] and [`SegmentWriter`]:
//!
//! - [`InMemorySegmentStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Records are immutable once written; a `RecordId` resolves to the same
//!    bytes forever.
//! 2. Writes are deduplicated by content: identical record images share one
//!    address, no matter how often they are written.
//! 3. Records start 4-byte aligned and record-id slots are read only inside
//!    the record that owns them.
//! 4. The store never interprets record contents beyond the header.
//! 5. Corruption is reported with the offending address, never papered over
//!    with a guessed value.

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{SegmentError, SegmentResult};
pub use memory::{InMemorySegmentStore, DEFAULT_SEGMENT_CAPACITY};
pub use record::{Record, RecordHeader, RecordKind};
pub use traits::{SegmentReader, SegmentStore, SegmentWriter};
