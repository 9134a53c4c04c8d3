use grove_segment::{RecordKind, SegmentStore};
use grove_types::{PropertyType, PropertyValue, RecordId};

use crate::error::{TreeError, TreeResult};

/// Persist a property value as a `Value` record and return its address.
///
/// The header count carries the number of contained values, saturated at
/// the header width; the payload always holds the full list.
pub fn write_value(store: &dyn SegmentStore, value: &PropertyValue) -> TreeResult<RecordId> {
    let body = bincode::serialize(value).map_err(|e| TreeError::Encode(e.to_string()))?;
    let count = value.count().min(u16::MAX as usize) as u16;
    Ok(store.write_record(RecordKind::Value, 0, count, &body)?)
}

/// Read a property value record.
pub fn read_value(store: &dyn SegmentStore, id: RecordId) -> TreeResult<PropertyValue> {
    let record = store.read_record_expecting(id, RecordKind::Value)?;
    bincode::deserialize(&record.body).map_err(|e| TreeError::Decode {
        record: id,
        reason: e.to_string(),
    })
}

/// Read a value record and check it against the type its template declared.
///
/// A mismatch means the node record points at the wrong value record, which
/// is storage corruption, not a recoverable condition.
pub fn read_typed_value(
    store: &dyn SegmentStore,
    id: RecordId,
    expected: PropertyType,
) -> TreeResult<PropertyValue> {
    let value = read_value(store, id)?;
    if value.ty() != expected {
        return Err(TreeError::ValueTypeMismatch {
            record: id,
            expected,
            actual: value.ty(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use grove_segment::InMemorySegmentStore;

    use super::*;

    #[test]
    fn scalar_value_roundtrip() {
        let store = InMemorySegmentStore::new();
        let value = PropertyValue::Name("nt:folder".into());
        let id = write_value(&store, &value).unwrap();
        assert_eq!(read_value(&store, id).unwrap(), value);
    }

    #[test]
    fn multi_value_roundtrip_keeps_order() {
        let store = InMemorySegmentStore::new();
        let value = PropertyValue::Longs(vec![3, 1, 2]);
        let id = write_value(&store, &value).unwrap();
        assert_eq!(read_value(&store, id).unwrap(), value);
    }

    #[test]
    fn identical_values_share_an_address() {
        let store = InMemorySegmentStore::new();
        let a = write_value(&store, &PropertyValue::Long(42)).unwrap();
        let b = write_value(&store, &PropertyValue::Long(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn scalar_and_single_element_array_do_not_collide() {
        let store = InMemorySegmentStore::new();
        let scalar = write_value(&store, &PropertyValue::Name("a".into())).unwrap();
        let array = write_value(&store, &PropertyValue::Names(vec!["a".into()])).unwrap();
        assert_ne!(scalar, array);
    }

    #[test]
    fn declared_type_is_enforced() {
        let store = InMemorySegmentStore::new();
        let id = write_value(&store, &PropertyValue::Long(1)).unwrap();
        assert_eq!(
            read_typed_value(&store, id, PropertyType::LONG).unwrap(),
            PropertyValue::Long(1)
        );
        let err = read_typed_value(&store, id, PropertyType::STRING).unwrap_err();
        assert!(matches!(
            err,
            TreeError::ValueTypeMismatch {
                expected: PropertyType::STRING,
                actual: PropertyType::LONG,
                ..
            }
        ));
    }

    #[test]
    fn non_value_record_is_rejected() {
        let store = InMemorySegmentStore::new();
        use grove_segment::SegmentWriter;
        let id = store
            .write_record(RecordKind::Template, 0, 0, b"not a value")
            .unwrap();
        assert!(read_value(&store, id).is_err());
    }
}
