use grove_segment::SegmentError;
use grove_types::{PropertyType, RecordId};

/// Errors from record-model operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A record payload failed to serialize.
    #[error("encode failed: {0}")]
    Encode(String),

    /// More entries than the 16-bit record header counter can carry,
    /// rejected at write time.
    #[error("{count} entries exceed the record header limit of {}", u16::MAX)]
    TooManyEntries { count: usize },

    /// A record payload is malformed or cannot be decoded.
    #[error("corrupt record {record}: {reason}")]
    Decode { record: RecordId, reason: String },

    /// A decoded template's general property array is not sorted by name.
    #[error("template {record} not sorted: {first:?} precedes {second:?}")]
    UnsortedTemplate {
        record: RecordId,
        first: String,
        second: String,
    },

    /// A well-typed reserved type property appears in the general array.
    #[error("template {record} holds reserved property {name:?} in its general array")]
    ReservedInTemplate { record: RecordId, name: String },

    /// A node header contradicts its template's child layout.
    #[error("node {record}: header says has_child={header}, template says {template}")]
    LayoutMismatch {
        record: RecordId,
        header: bool,
        template: bool,
    },

    /// A node header's property count contradicts its template.
    #[error("node {record}: header counts {header} properties, template {template}")]
    CountMismatch {
        record: RecordId,
        header: u16,
        template: usize,
    },

    /// A value record's type does not match what its template declared.
    #[error("value {record} is {actual}, expected {expected}")]
    ValueTypeMismatch {
        record: RecordId,
        expected: PropertyType,
        actual: PropertyType,
    },

    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// Result alias for record-model operations.
pub type TreeResult<T> = Result<T, TreeError>;
