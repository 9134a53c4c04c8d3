use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use tracing::debug;

use grove_types::{RecordId, SegmentId};

use crate::error::{SegmentError, SegmentResult};
use crate::record::{Record, RecordHeader, RecordKind};
use crate::traits::{SegmentReader, SegmentWriter};

/// Capacity at which the open segment rolls over (256 KiB).
pub const DEFAULT_SEGMENT_CAPACITY: usize = 256 * 1024;

/// Records start on 4-byte boundaries.
const RECORD_ALIGN: usize = 4;

/// One segment's bytes plus the index of record extents within it.
struct Segment {
    data: Vec<u8>,
    /// Record start offset mapped to total record length, header included.
    records: BTreeMap<u32, u32>,
}

impl Segment {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            records: BTreeMap::new(),
        }
    }
}

struct StoreInner {
    segments: HashMap<SegmentId, Segment>,
    /// Segment currently accepting appends.
    current: SegmentId,
    /// BLAKE3 of a record image mapped to where that image already lives.
    dedup: HashMap<[u8; 32], RecordId>,
}

/// In-memory segment store.
///
/// Intended for tests and embedding. Segments are byte buffers behind a
/// `RwLock`; the open segment accepts 4-byte-aligned appends until its
/// capacity is reached, then a fresh segment (new v7 UUID) is started. A
/// content index keyed by the BLAKE3 hash of the full record image makes
/// writes idempotent: identical images resolve to a single address no
/// matter how often they are written.
pub struct InMemorySegmentStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
}

impl InMemorySegmentStore {
    /// Create an empty store with the default segment capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SEGMENT_CAPACITY)
    }

    /// Create an empty store rolling segments at `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        let current = SegmentId::new();
        let mut segments = HashMap::new();
        segments.insert(current, Segment::new());
        Self {
            inner: RwLock::new(StoreInner {
                segments,
                current,
                dedup: HashMap::new(),
            }),
            capacity,
        }
    }

    /// Number of segments allocated so far, the open one included.
    pub fn segment_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").segments.len()
    }

    /// Number of records across all segments.
    pub fn record_count(&self) -> usize {
        self.inner
            .read()
            .expect("lock poisoned")
            .segments
            .values()
            .map(|seg| seg.records.len())
            .sum()
    }

    /// Total bytes across all segments, alignment padding included.
    pub fn total_bytes(&self) -> u64 {
        self.inner
            .read()
            .expect("lock poisoned")
            .segments
            .values()
            .map(|seg| seg.data.len() as u64)
            .sum()
    }
}

impl Default for InMemorySegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentWriter for InMemorySegmentStore {
    fn write_record(
        &self,
        kind: RecordKind,
        flags: u8,
        count: u16,
        body: &[u8],
    ) -> SegmentResult<RecordId> {
        let header = RecordHeader::new(kind, flags, count);
        let mut image = Vec::with_capacity(RecordHeader::SIZE + body.len());
        image.extend_from_slice(&header.encode());
        image.extend_from_slice(body);
        let digest = *blake3::hash(&image).as_bytes();

        let mut guard = self.inner.write().expect("lock poisoned");
        let inner = &mut *guard;

        // Idempotent: an identical image already has an address.
        if let Some(&existing) = inner.dedup.get(&digest) {
            return Ok(existing);
        }

        let open_len = inner
            .segments
            .get(&inner.current)
            .map(|seg| seg.data.len())
            .unwrap_or(0);
        if open_len > 0 && open_len + image.len() > self.capacity {
            let fresh = SegmentId::new();
            debug!(
                closed = %inner.current.short_id(),
                open = %fresh.short_id(),
                bytes = open_len,
                "rolling to fresh segment"
            );
            inner.segments.insert(fresh, Segment::new());
            inner.current = fresh;
        }

        let current = inner.current;
        let seg = inner.segments.entry(current).or_insert_with(Segment::new);
        let offset = seg.data.len() as u32;
        seg.data.extend_from_slice(&image);
        while seg.data.len() % RECORD_ALIGN != 0 {
            seg.data.push(0);
        }
        seg.records.insert(offset, image.len() as u32);

        let id = RecordId::new(current, offset);
        inner.dedup.insert(digest, id);
        debug!(record = %id, kind = ?kind, bytes = image.len(), "wrote record");
        Ok(id)
    }
}

impl SegmentReader for InMemorySegmentStore {
    fn read_record(&self, id: RecordId) -> SegmentResult<Record> {
        let inner = self.inner.read().expect("lock poisoned");
        let seg = inner
            .segments
            .get(&id.segment())
            .ok_or(SegmentError::UnknownSegment(id.segment()))?;
        let len = *seg
            .records
            .get(&id.offset())
            .ok_or(SegmentError::UnknownRecord(id))?;
        if (len as usize) < RecordHeader::SIZE {
            return Err(SegmentError::Corrupt {
                record: id,
                reason: format!("record shorter than its header ({len} bytes)"),
            });
        }
        let start = id.offset() as usize;
        let bytes = &seg.data[start..start + len as usize];
        let header = RecordHeader::decode([bytes[0], bytes[1], bytes[2], bytes[3]]).ok_or_else(
            || SegmentError::Corrupt {
                record: id,
                reason: format!("unknown record kind tag {}", bytes[0]),
            },
        )?;
        Ok(Record {
            header,
            body: bytes[RecordHeader::SIZE..].to_vec(),
        })
    }

    fn read_record_id(&self, from: RecordId, slot: u32) -> SegmentResult<RecordId> {
        let inner = self.inner.read().expect("lock poisoned");
        let seg = inner
            .segments
            .get(&from.segment())
            .ok_or(SegmentError::UnknownSegment(from.segment()))?;
        let len = *seg
            .records
            .get(&from.offset())
            .ok_or(SegmentError::UnknownRecord(from))?;
        if slot as usize + RecordId::BYTES > len as usize {
            return Err(SegmentError::OutOfBounds {
                record: from,
                slot,
                len,
            });
        }
        let start = from.offset() as usize + slot as usize;
        let bytes = &seg.data[start..start + RecordId::BYTES];
        RecordId::from_bytes(bytes).map_err(|source| SegmentError::BadRecordId {
            record: from,
            slot,
            source,
        })
    }

    fn contains(&self, id: RecordId) -> bool {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .segments
            .get(&id.segment())
            .is_some_and(|seg| seg.records.contains_key(&id.offset()))
    }
}

impl std::fmt::Debug for InMemorySegmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySegmentStore")
            .field("segment_count", &self.segment_count())
            .field("record_count", &self.record_count())
            .field("total_bytes", &self.total_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use grove_types::TypeError;

    use super::*;

    fn store() -> InMemorySegmentStore {
        InMemorySegmentStore::new()
    }

    /// Node-record body with a padded header slot and one record-id slot.
    fn node_body_with_pointer(target: RecordId) -> Vec<u8> {
        let mut body = vec![0u8; RecordId::BYTES - RecordHeader::SIZE];
        body.extend_from_slice(&target.to_bytes());
        body
    }

    // -----------------------------------------------------------------------
    // Core write/read
    // -----------------------------------------------------------------------

    #[test]
    fn write_and_read_record() {
        let store = store();
        let id = store
            .write_record(RecordKind::Value, 0, 1, b"payload")
            .unwrap();
        let record = store.read_record(id).unwrap();
        assert_eq!(record.header.kind, RecordKind::Value);
        assert_eq!(record.header.count, 1);
        assert_eq!(record.body, b"payload");
        assert_eq!(record.stored_len(), RecordHeader::SIZE + 7);
    }

    #[test]
    fn empty_body_is_allowed() {
        let store = store();
        let id = store.write_record(RecordKind::MapLeaf, 0, 0, &[]).unwrap();
        let record = store.read_record(id).unwrap();
        assert!(record.body.is_empty());
    }

    #[test]
    fn contains_tracks_written_records() {
        let store = store();
        let id = store.write_record(RecordKind::Value, 0, 0, b"x").unwrap();
        assert!(store.contains(id));
        assert!(!store.contains(RecordId::new(id.segment(), id.offset() + 4)));
    }

    // -----------------------------------------------------------------------
    // Content addressing
    // -----------------------------------------------------------------------

    #[test]
    fn identical_images_share_an_address() {
        let store = store();
        let a = store.write_record(RecordKind::Value, 0, 1, b"same").unwrap();
        let b = store.write_record(RecordKind::Value, 0, 1, b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn header_participates_in_dedup() {
        let store = store();
        let a = store.write_record(RecordKind::Value, 0, 1, b"same").unwrap();
        let b = store
            .write_record(RecordKind::Template, 0, 1, b"same")
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(store.record_count(), 2);
    }

    #[test]
    fn different_bodies_get_distinct_addresses() {
        let store = store();
        let a = store.write_record(RecordKind::Value, 0, 0, b"aaa").unwrap();
        let b = store.write_record(RecordKind::Value, 0, 0, b"bbb").unwrap();
        assert_ne!(a, b);
    }

    // -----------------------------------------------------------------------
    // Record-id slots
    // -----------------------------------------------------------------------

    #[test]
    fn record_id_slot_roundtrip() {
        let store = store();
        let target = store.write_record(RecordKind::Value, 0, 0, b"t").unwrap();
        let node = store
            .write_record(
                RecordKind::Node,
                RecordHeader::HAS_CHILD,
                0,
                &node_body_with_pointer(target),
            )
            .unwrap();
        let read = store
            .read_record_id(node, RecordId::BYTES as u32)
            .unwrap();
        assert_eq!(read, target);
    }

    #[test]
    fn slot_past_record_end_is_out_of_bounds() {
        let store = store();
        let id = store.write_record(RecordKind::Value, 0, 0, b"xy").unwrap();
        let err = store.read_record_id(id, 4).unwrap_err();
        assert!(matches!(err, SegmentError::OutOfBounds { slot: 4, .. }));
    }

    #[test]
    fn nil_slot_bytes_fail_to_decode() {
        let store = store();
        let body = vec![0u8; RecordId::BYTES + RecordId::BYTES - RecordHeader::SIZE];
        let id = store
            .write_record(RecordKind::Node, RecordHeader::HAS_CHILD, 0, &body)
            .unwrap();
        let err = store
            .read_record_id(id, RecordId::BYTES as u32)
            .unwrap_err();
        assert!(matches!(
            err,
            SegmentError::BadRecordId {
                source: TypeError::NilSegment,
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // Unknown addresses
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_segment_is_reported() {
        let store = store();
        let foreign = RecordId::new(SegmentId::new(), 0);
        assert!(matches!(
            store.read_record(foreign).unwrap_err(),
            SegmentError::UnknownSegment(_)
        ));
    }

    #[test]
    fn non_record_offset_is_reported() {
        let store = store();
        let id = store.write_record(RecordKind::Value, 0, 0, b"abcdef").unwrap();
        let inside = RecordId::new(id.segment(), id.offset() + 4);
        assert!(matches!(
            store.read_record(inside).unwrap_err(),
            SegmentError::UnknownRecord(_)
        ));
    }

    #[test]
    fn kind_expectation_is_checked() {
        let store = store();
        let id = store.write_record(RecordKind::Value, 0, 0, b"v").unwrap();
        let err = store
            .read_record_expecting(id, RecordKind::Template)
            .unwrap_err();
        assert!(matches!(
            err,
            SegmentError::KindMismatch {
                expected: RecordKind::Template,
                actual: RecordKind::Value,
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // Segment rollover and alignment
    // -----------------------------------------------------------------------

    #[test]
    fn records_are_4_byte_aligned() {
        let store = store();
        for len in [1usize, 2, 3, 5, 7, 11] {
            let id = store
                .write_record(RecordKind::Value, 0, 0, &vec![len as u8; len])
                .unwrap();
            assert_eq!(id.offset() % 4, 0);
        }
    }

    #[test]
    fn full_segment_rolls_to_a_fresh_one() {
        let store = InMemorySegmentStore::with_capacity(64);
        let mut ids = Vec::new();
        for i in 0..8u8 {
            ids.push(
                store
                    .write_record(RecordKind::Value, 0, 0, &[i; 24])
                    .unwrap(),
            );
        }
        assert!(store.segment_count() > 1);
        // Every record stays readable after rollover.
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(store.read_record(*id).unwrap().body, vec![i as u8; 24]);
        }
    }

    #[test]
    fn oversized_record_still_fits_in_its_own_segment() {
        let store = InMemorySegmentStore::with_capacity(16);
        let id = store
            .write_record(RecordKind::Value, 0, 0, &[7u8; 100])
            .unwrap();
        assert_eq!(store.read_record(id).unwrap().body.len(), 100);
    }

    // -----------------------------------------------------------------------
    // Utilities
    // -----------------------------------------------------------------------

    #[test]
    fn counters_track_writes() {
        let store = store();
        assert_eq!(store.segment_count(), 1);
        assert_eq!(store.record_count(), 0);
        assert_eq!(store.total_bytes(), 0);

        store.write_record(RecordKind::Value, 0, 0, b"12345").unwrap();
        assert_eq!(store.record_count(), 1);
        // 4-byte header + 5 bytes body, padded to the next boundary.
        assert_eq!(store.total_bytes(), 12);
    }

    #[test]
    fn default_creates_empty_store() {
        let store = InMemorySegmentStore::default();
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn debug_format() {
        let store = store();
        store.write_record(RecordKind::Value, 0, 0, b"x").unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemorySegmentStore"));
        assert!(debug.contains("record_count"));
    }

    // -----------------------------------------------------------------------
    // Concurrent read safety
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemorySegmentStore::new());
        let id = store
            .write_record(RecordKind::Value, 0, 0, b"shared data")
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let record = store.read_record(id).unwrap();
                    assert_eq!(record.body, b"shared data");
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }
}
