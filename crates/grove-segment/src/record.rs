/// Kind tag of a stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// Slot-structured node record.
    Node = 1,
    /// Node template payload.
    Template = 2,
    /// Property value payload.
    Value = 3,
    /// Child-map leaf payload.
    MapLeaf = 4,
    /// Child-map branch payload.
    MapBranch = 5,
}

impl RecordKind {
    /// Decode a kind tag. Unknown tags yield `None`.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Node),
            2 => Some(Self::Template),
            3 => Some(Self::Value),
            4 => Some(Self::MapLeaf),
            5 => Some(Self::MapBranch),
            _ => None,
        }
    }
}

/// Fixed header at the start of every record.
///
/// Encoded form:
/// ```text
/// [1 byte: kind tag]
/// [1 byte: flags]
/// [2 bytes: element count (little-endian u16)]
/// ```
///
/// For node records `count` carries the general property count and the
/// [`HAS_CHILD`](RecordHeader::HAS_CHILD) flag mirrors the template's child
/// layout; readers cross-check both against the decoded template. In a node
/// record the header occupies slot 0, zero-padded to the record-id width,
/// so that every later slot sits at a multiple of `RecordId::BYTES`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    pub flags: u8,
    pub count: u16,
}

impl RecordHeader {
    /// Size of the encoded header in bytes.
    pub const SIZE: usize = 4;

    /// Flag bit set on node records that carry a child-pointer slot.
    pub const HAS_CHILD: u8 = 0b0000_0001;

    pub fn new(kind: RecordKind, flags: u8, count: u16) -> Self {
        Self { kind, flags, count }
    }

    /// Returns `true` if the node carries a child-pointer slot.
    pub fn has_child(&self) -> bool {
        self.flags & Self::HAS_CHILD != 0
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = self.kind as u8;
        out[1] = self.flags;
        out[2..].copy_from_slice(&self.count.to_le_bytes());
        out
    }

    /// Decode a header. Unknown kind tags yield `None`.
    pub fn decode(bytes: [u8; Self::SIZE]) -> Option<Self> {
        let kind = RecordKind::from_u8(bytes[0])?;
        Some(Self {
            kind,
            flags: bytes[1],
            count: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// A retrieved record image: its header plus the body bytes that follow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    pub body: Vec<u8>,
}

impl Record {
    /// Total stored length of the record, header included.
    pub fn stored_len(&self) -> usize {
        RecordHeader::SIZE + self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = RecordHeader::new(RecordKind::Node, RecordHeader::HAS_CHILD, 3);
        let decoded = RecordHeader::decode(header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.has_child());
        assert_eq!(decoded.count, 3);
    }

    #[test]
    fn count_is_little_endian() {
        let header = RecordHeader::new(RecordKind::Template, 0, 0x0102);
        assert_eq!(header.encode(), [2, 0, 0x02, 0x01]);
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        assert_eq!(RecordKind::from_u8(0), None);
        assert_eq!(RecordKind::from_u8(6), None);
        assert!(RecordHeader::decode([0xff, 0, 0, 0]).is_none());
    }

    #[test]
    fn all_kind_tags_roundtrip() {
        for kind in [
            RecordKind::Node,
            RecordKind::Template,
            RecordKind::Value,
            RecordKind::MapLeaf,
            RecordKind::MapBranch,
        ] {
            assert_eq!(RecordKind::from_u8(kind as u8), Some(kind));
        }
    }
}
