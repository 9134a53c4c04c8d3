use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};

/// Identity of one immutable storage segment.
///
/// Segments are allocated with time-ordered UUIDs (v7) so that segment
/// listings sort roughly by creation time. The nil UUID is reserved as a
/// "no segment" marker and never addresses real storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(Uuid);

impl SegmentId {
    /// Number of bytes in the wire representation.
    pub const BYTES: usize = 16;

    /// Allocate a fresh time-ordered segment identity.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The nil segment identity (all zeros). Represents "no segment".
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the nil segment identity.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The raw 16-byte form.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Short representation (first 8 hex characters).
    pub fn short_id(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SegmentId({})", self.short_id())
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SegmentId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SegmentId> for Uuid {
    fn from(id: SegmentId) -> Self {
        id.0
    }
}

/// Address of one record: the segment that holds it plus the byte offset
/// of the record within that segment.
///
/// A `RecordId` is a plain value: cheap to copy, compared and hashed by
/// both fields. Structural sharing across tree versions is expressed
/// entirely as records referencing other records by `RecordId`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    segment: SegmentId,
    offset: u32,
}

impl RecordId {
    /// Number of bytes in the wire representation (segment + offset).
    pub const BYTES: usize = SegmentId::BYTES + 4;

    /// Create a record address.
    ///
    /// # Panics
    ///
    /// Panics if `segment` is nil. The nil segment never holds records, so
    /// such an address is a contract violation by the caller.
    pub fn new(segment: SegmentId, offset: u32) -> Self {
        assert!(
            !segment.is_nil(),
            "record address requires a non-nil segment"
        );
        Self { segment, offset }
    }

    /// The segment holding the record.
    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Byte offset of the record within its segment.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Fixed-width wire form: 16 UUID bytes followed by the offset in
    /// big-endian order.
    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut out = [0u8; Self::BYTES];
        out[..SegmentId::BYTES].copy_from_slice(self.segment.as_bytes());
        out[SegmentId::BYTES..].copy_from_slice(&self.offset.to_be_bytes());
        out
    }

    /// Decode the fixed-width wire form. Fails on a nil segment.
    pub fn from_bytes(bytes: &[u8]) -> TypeResult<Self> {
        if bytes.len() != Self::BYTES {
            return Err(TypeError::InvalidLength {
                expected: Self::BYTES,
                actual: bytes.len(),
            });
        }
        let mut seg = [0u8; SegmentId::BYTES];
        seg.copy_from_slice(&bytes[..SegmentId::BYTES]);
        let segment = SegmentId::from_uuid(Uuid::from_bytes(seg));
        if segment.is_nil() {
            return Err(TypeError::NilSegment);
        }
        let mut off = [0u8; 4];
        off.copy_from_slice(&bytes[SegmentId::BYTES..]);
        Ok(Self {
            segment,
            offset: u32::from_be_bytes(off),
        })
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({}:{})", self.segment.short_id(), self.offset)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn seg(b: u8) -> SegmentId {
        SegmentId::from_uuid(Uuid::from_bytes([b; 16]))
    }

    #[test]
    fn fresh_segment_ids_are_distinct() {
        assert_ne!(SegmentId::new(), SegmentId::new());
    }

    #[test]
    fn nil_is_detected() {
        assert!(SegmentId::nil().is_nil());
        assert!(!SegmentId::new().is_nil());
    }

    #[test]
    fn short_id_is_8_chars() {
        assert_eq!(seg(0xab).short_id(), "abababab");
    }

    #[test]
    fn equality_covers_both_fields() {
        let a = RecordId::new(seg(1), 64);
        assert_eq!(a, RecordId::new(seg(1), 64));
        assert_ne!(a, RecordId::new(seg(1), 68));
        assert_ne!(a, RecordId::new(seg(2), 64));
    }

    #[test]
    #[should_panic(expected = "non-nil segment")]
    fn nil_segment_is_rejected() {
        let _ = RecordId::new(SegmentId::nil(), 0);
    }

    #[test]
    fn byte_form_is_segment_then_offset() {
        let id = RecordId::new(seg(7), 0x0102_0304);
        let bytes = id.to_bytes();
        assert_eq!(&bytes[..16], &[7u8; 16]);
        assert_eq!(&bytes[16..], &[1, 2, 3, 4]);
    }

    #[test]
    fn from_bytes_rejects_nil_segment() {
        let bytes = [0u8; RecordId::BYTES];
        assert_eq!(RecordId::from_bytes(&bytes), Err(TypeError::NilSegment));
    }

    #[test]
    fn from_bytes_rejects_bad_length() {
        assert_eq!(
            RecordId::from_bytes(&[1, 2, 3]),
            Err(TypeError::InvalidLength {
                expected: 20,
                actual: 3,
            })
        );
    }

    #[test]
    fn display_is_segment_colon_offset() {
        let id = RecordId::new(seg(0xab), 128);
        assert_eq!(format!("{id}"), format!("{}:128", seg(0xab)));
        assert_eq!(format!("{id:?}"), "RecordId(abababab:128)");
    }

    #[test]
    fn serde_roundtrip() {
        let id = RecordId::new(seg(3), 512);
        let bytes = bincode::serialize(&id).unwrap();
        let parsed: RecordId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn byte_roundtrip(raw in prop::array::uniform16(1u8..), offset: u32) {
            let id = RecordId::new(SegmentId::from_uuid(Uuid::from_bytes(raw)), offset);
            prop_assert_eq!(RecordId::from_bytes(&id.to_bytes()).unwrap(), id);
        }
    }
}
