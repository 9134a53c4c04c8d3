use grove_types::RecordId;

use crate::error::{SegmentError, SegmentResult};
use crate::record::{Record, RecordKind};

/// Read access to segment records.
///
/// All implementations must satisfy these invariants:
/// - Records are immutable once written; a `RecordId` always resolves to
///   the same bytes.
/// - Record-id slots are read at offsets relative to the start of the
///   containing record and never cross a record boundary.
/// - Concurrent reads are always safe.
/// - Corruption is reported with the offending address, never papered over
///   with a guessed value.
pub trait SegmentReader: Send + Sync {
    /// Read a whole record: its header plus the body bytes that follow.
    fn read_record(&self, id: RecordId) -> SegmentResult<Record>;

    /// Read the record-id slot `slot` bytes from the start of the record at
    /// `from`.
    ///
    /// Slots are `RecordId::BYTES` wide and must lie entirely inside the
    /// record at `from`.
    fn read_record_id(&self, from: RecordId, slot: u32) -> SegmentResult<RecordId>;

    /// Whether `id` addresses a record in this store.
    fn contains(&self, id: RecordId) -> bool;

    /// Read a record and verify its kind tag.
    fn read_record_expecting(&self, id: RecordId, kind: RecordKind) -> SegmentResult<Record> {
        let record = self.read_record(id)?;
        if record.header.kind != kind {
            return Err(SegmentError::KindMismatch {
                record: id,
                expected: kind,
                actual: record.header.kind,
            });
        }
        Ok(record)
    }
}

/// Write access to segment storage.
pub trait SegmentWriter: Send + Sync {
    /// Append a record image and return its address.
    ///
    /// Writes are deduplicated by content: appending an identical image
    /// again returns the address of the first copy. The body is stored
    /// verbatim after the encoded header.
    fn write_record(
        &self,
        kind: RecordKind,
        flags: u8,
        count: u16,
        body: &[u8],
    ) -> SegmentResult<RecordId>;
}

/// Combined read/write segment storage.
pub trait SegmentStore: SegmentReader + SegmentWriter {}

impl<T: SegmentReader + SegmentWriter> SegmentStore for T {}
