use grove_types::{RecordId, SegmentId, TypeError};

use crate::record::RecordKind;

/// Errors from segment store operations.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// The addressed segment is not present in the store.
    #[error("unknown segment: {0}")]
    UnknownSegment(SegmentId),

    /// The addressed offset is not the start of a record.
    #[error("no record at {0}")]
    UnknownRecord(RecordId),

    /// A slot read would leave the containing record.
    #[error("slot at byte {slot} is outside record {record} ({len} bytes)")]
    OutOfBounds {
        record: RecordId,
        slot: u32,
        len: u32,
    },

    /// A record's kind tag does not match what the reader expected.
    #[error("record {record} is {actual:?}, expected {expected:?}")]
    KindMismatch {
        record: RecordId,
        expected: RecordKind,
        actual: RecordKind,
    },

    /// An encoded record-id slot failed to decode.
    #[error("bad record id in {record} at byte {slot}: {source}")]
    BadRecordId {
        record: RecordId,
        slot: u32,
        #[source]
        source: TypeError,
    },

    /// The record bytes fail structural validation.
    #[error("corrupt record {record}: {reason}")]
    Corrupt { record: RecordId, reason: String },
}

/// Result alias for segment store operations.
pub type SegmentResult<T> = Result<T, SegmentError>;
