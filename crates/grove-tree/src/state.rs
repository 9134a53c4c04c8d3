use std::fmt;
use std::sync::Arc;

use tracing::debug;

use grove_segment::{RecordHeader, RecordKind, SegmentStore};
use grove_types::{names, PropertyValue, RecordId};

use crate::error::{TreeError, TreeResult};
use crate::map::MapRecord;
use crate::template::{ChildLayout, NodeTemplate};
use crate::value;

/// Immutable read view of one stored node version.
///
/// A state pairs a [`NodeTemplate`] with the node record whose slots the
/// template describes. States are cheap to clone and safe to share across
/// threads; reads walk record bytes through the store and never mutate
/// anything. Two states are equal when they address the same node record.
#[derive(Clone)]
pub struct NodeState {
    store: Arc<dyn SegmentStore>,
    template: Arc<NodeTemplate>,
    record_id: RecordId,
}

impl NodeState {
    /// Read the node record at `id` and its template.
    ///
    /// The node header is cross-checked against the decoded template; any
    /// disagreement is reported as corruption rather than read around.
    pub fn read(store: Arc<dyn SegmentStore>, id: RecordId) -> TreeResult<Self> {
        let record = store.read_record_expecting(id, RecordKind::Node)?;
        let template_slot = if record.header.has_child() {
            2 * RecordId::BYTES as u32
        } else {
            RecordId::BYTES as u32
        };
        let template_id = store.read_record_id(id, template_slot)?;
        let template_record = store.read_record_expecting(template_id, RecordKind::Template)?;
        let template = NodeTemplate::from_bytes(template_id, &template_record.body)?;

        if record.header.has_child() != template.child_layout().has_children() {
            return Err(TreeError::LayoutMismatch {
                record: id,
                header: record.header.has_child(),
                template: template.child_layout().has_children(),
            });
        }
        if record.header.count as usize != template.properties().len() {
            return Err(TreeError::CountMismatch {
                record: id,
                header: record.header.count,
                template: template.properties().len(),
            });
        }

        Ok(Self {
            store,
            template: Arc::new(template),
            record_id: id,
        })
    }

    /// Persist one node version: the template record, then the
    /// slot-structured node record pointing at it.
    ///
    /// `property_values` carries one already-written value record per
    /// general property, in template order; `child_pointer` carries the
    /// single child's node record or the map root, per the template's
    /// layout. Callers decide which of those ids are fresh and which are
    /// reused from a base version; that is where structural sharing
    /// happens.
    pub fn write(
        store: &Arc<dyn SegmentStore>,
        template: &NodeTemplate,
        child_pointer: Option<RecordId>,
        property_values: &[RecordId],
    ) -> TreeResult<Self> {
        debug_assert_eq!(
            template.child_layout().has_children(),
            child_pointer.is_some()
        );
        debug_assert_eq!(template.properties().len(), property_values.len());

        let count = template.properties().len();
        if count > u16::MAX as usize {
            return Err(TreeError::TooManyEntries { count });
        }
        let count = count as u16;
        let template_id =
            store.write_record(RecordKind::Template, 0, count, &template.to_bytes()?)?;

        let mut body =
            Vec::with_capacity((3 + property_values.len()) * RecordId::BYTES - RecordHeader::SIZE);
        // Slot 0 carries the header; pad out the rest of the slot.
        body.extend_from_slice(&[0u8; RecordId::BYTES - RecordHeader::SIZE]);
        if let Some(child) = child_pointer {
            body.extend_from_slice(&child.to_bytes());
        }
        body.extend_from_slice(&template_id.to_bytes());
        for value_id in property_values {
            body.extend_from_slice(&value_id.to_bytes());
        }

        let flags = if child_pointer.is_some() {
            RecordHeader::HAS_CHILD
        } else {
            0
        };
        let record_id = store.write_record(RecordKind::Node, flags, count, &body)?;
        debug!(node = %record_id, properties = count, "wrote node record");

        Ok(Self {
            store: Arc::clone(store),
            template: Arc::new(template.clone()),
            record_id,
        })
    }

    /// Address of the node record.
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// The node's template.
    pub fn template(&self) -> &NodeTemplate {
        &self.template
    }

    /// The store this state reads through.
    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    // -- properties ---------------------------------------------------------

    /// Read one property by name.
    ///
    /// The reserved type properties resolve straight from the template; the
    /// general array is binary-searched and the value record at the
    /// property's slot is fetched and type-checked.
    pub fn property(&self, name: &str) -> TreeResult<Option<PropertyValue>> {
        if name == names::PRIMARY_TYPE {
            if let Some(primary) = self.template.primary_type() {
                return Ok(Some(PropertyValue::Name(primary.to_string())));
            }
        }
        if name == names::MIXIN_TYPES {
            if let Some(mixins) = self.template.mixin_types() {
                return Ok(Some(PropertyValue::Names(mixins.to_vec())));
            }
        }
        let Some(index) = self.template.property_index(name) else {
            return Ok(None);
        };
        let slot = self.template.property_slot(index);
        let value_id = self.store.read_record_id(self.record_id, slot)?;
        let declared = self.template.properties()[index].ty();
        Ok(Some(value::read_typed_value(
            &*self.store,
            value_id,
            declared,
        )?))
    }

    /// Whether the node has a property named `name`. Template-only, no
    /// value record is touched.
    pub fn has_property(&self, name: &str) -> bool {
        (name == names::PRIMARY_TYPE && self.template.primary_type().is_some())
            || (name == names::MIXIN_TYPES && self.template.mixin_types().is_some())
            || self.template.property_index(name).is_some()
    }

    /// Total property count, the present reserved slots included.
    pub fn property_count(&self) -> usize {
        self.template.property_count()
    }

    /// Names of all properties, the type properties first. Template-only,
    /// no value record is touched.
    pub fn property_names(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.template.property_count());
        if self.template.primary_type().is_some() {
            out.push(names::PRIMARY_TYPE.to_string());
        }
        if self.template.mixin_types().is_some() {
            out.push(names::MIXIN_TYPES.to_string());
        }
        out.extend(
            self.template
                .properties()
                .iter()
                .map(|p| p.name().to_string()),
        );
        out
    }

    /// Record id of the value record behind a general property, if any.
    ///
    /// The reserved type properties live inside the template and have no
    /// value record, so they yield `None` here. This is how an unchanged
    /// property's storage is carried into a derived node version without
    /// rewriting it.
    pub fn property_value_id(&self, name: &str) -> TreeResult<Option<RecordId>> {
        let Some(index) = self.template.property_index(name) else {
            return Ok(None);
        };
        let slot = self.template.property_slot(index);
        Ok(Some(self.store.read_record_id(self.record_id, slot)?))
    }

    /// All properties: the type properties first, then the general array
    /// in name order.
    pub fn properties(&self) -> TreeResult<Vec<(String, PropertyValue)>> {
        let mut out = Vec::with_capacity(self.template.property_count());
        if let Some(primary) = self.template.primary_type() {
            out.push((
                names::PRIMARY_TYPE.to_string(),
                PropertyValue::Name(primary.to_string()),
            ));
        }
        if let Some(mixins) = self.template.mixin_types() {
            out.push((
                names::MIXIN_TYPES.to_string(),
                PropertyValue::Names(mixins.to_vec()),
            ));
        }
        for (index, prop) in self.template.properties().iter().enumerate() {
            let slot = self.template.property_slot(index);
            let value_id = self.store.read_record_id(self.record_id, slot)?;
            let value = value::read_typed_value(&*self.store, value_id, prop.ty())?;
            out.push((prop.name().to_string(), value));
        }
        Ok(out)
    }

    // -- children -----------------------------------------------------------

    /// Number of children.
    pub fn child_count(&self) -> TreeResult<u64> {
        match self.template.child_layout() {
            ChildLayout::Zero => Ok(0),
            ChildLayout::One(_) => Ok(1),
            ChildLayout::Many => self.child_map()?.size(),
        }
    }

    /// Whether the node has a child named `name`.
    pub fn has_child(&self, name: &str) -> TreeResult<bool> {
        match self.template.child_layout() {
            ChildLayout::Zero => Ok(false),
            ChildLayout::One(child) => Ok(child == name),
            ChildLayout::Many => self.child_map()?.contains(name),
        }
    }

    /// Read the child named `name`, if any.
    pub fn child(&self, name: &str) -> TreeResult<Option<NodeState>> {
        match self.child_id(name)? {
            Some(id) => Ok(Some(NodeState::read(Arc::clone(&self.store), id)?)),
            None => Ok(None),
        }
    }

    /// Record id of the child named `name`, if any, without decoding it.
    pub fn child_id(&self, name: &str) -> TreeResult<Option<RecordId>> {
        match self.template.child_layout() {
            ChildLayout::Zero => Ok(None),
            ChildLayout::One(child) if child == name => Ok(Some(self.child_pointer()?)),
            ChildLayout::One(_) => Ok(None),
            ChildLayout::Many => self.child_map()?.entry(name),
        }
    }

    /// Names of all children. Order is unspecified.
    pub fn child_names(&self) -> TreeResult<Vec<String>> {
        match self.template.child_layout() {
            ChildLayout::Zero => Ok(Vec::new()),
            ChildLayout::One(child) => Ok(vec![child.clone()]),
            ChildLayout::Many => Ok(self
                .child_map()?
                .entries()?
                .into_iter()
                .map(|(name, _)| name)
                .collect()),
        }
    }

    /// All children paired with their names. Order is unspecified.
    pub fn children(&self) -> TreeResult<Vec<(String, NodeState)>> {
        let ids: Vec<(String, RecordId)> = match self.template.child_layout() {
            ChildLayout::Zero => Vec::new(),
            ChildLayout::One(child) => vec![(child.clone(), self.child_pointer()?)],
            ChildLayout::Many => self.child_map()?.entries()?,
        };
        ids.into_iter()
            .map(|(name, id)| Ok((name, NodeState::read(Arc::clone(&self.store), id)?)))
            .collect()
    }

    /// Root of the child map, when the node stores its children that way.
    pub fn child_map_id(&self) -> TreeResult<Option<RecordId>> {
        match self.template.child_layout() {
            ChildLayout::Many => Ok(Some(self.child_pointer()?)),
            _ => Ok(None),
        }
    }

    /// The child-pointer slot: the single child's record for `One`, the
    /// map root for `Many`.
    fn child_pointer(&self) -> TreeResult<RecordId> {
        match self.template.child_slot() {
            Some(slot) => Ok(self.store.read_record_id(self.record_id, slot)?),
            // Reachable only if a caller bypasses the layout dispatch.
            None => Err(TreeError::LayoutMismatch {
                record: self.record_id,
                header: false,
                template: true,
            }),
        }
    }

    fn child_map(&self) -> TreeResult<MapRecord<'_>> {
        let map_id = self.child_pointer()?;
        MapRecord::open(&*self.store, map_id)
    }
}

impl PartialEq for NodeState {
    fn eq(&self, other: &Self) -> bool {
        self.record_id == other.record_id && self.template == other.template
    }
}

impl Eq for NodeState {}

impl fmt::Debug for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeState")
            .field("record_id", &self.record_id)
            .field("template", &self.template)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use grove_segment::InMemorySegmentStore;
    use grove_types::PropertyType;

    use super::*;
    use crate::map;
    use crate::template::PropertyTemplate;

    fn store() -> Arc<dyn SegmentStore> {
        Arc::new(InMemorySegmentStore::new())
    }

    /// Write a node with the given properties and children, the way the
    /// builder's materializer does.
    fn persist(
        store: &Arc<dyn SegmentStore>,
        props: &[(&str, PropertyValue)],
        children: &[(&str, &NodeState)],
    ) -> NodeState {
        let layout = match children {
            [] => ChildLayout::Zero,
            [(name, _)] => ChildLayout::One(name.to_string()),
            _ => ChildLayout::Many,
        };
        let template = NodeTemplate::classify(props.iter().map(|(n, v)| (*n, v)), layout);

        let mut value_ids = Vec::new();
        for prop in template.properties() {
            let (_, v) = props
                .iter()
                .find(|(n, _)| *n == prop.name())
                .expect("template property comes from the input");
            value_ids.push(value::write_value(&**store, v).unwrap());
        }

        let child_pointer = match children {
            [] => None,
            [(_, only)] => Some(only.record_id()),
            several => {
                let entries: BTreeMap<String, RecordId> = several
                    .iter()
                    .map(|(n, s)| (n.to_string(), s.record_id()))
                    .collect();
                Some(map::write_map(&**store, &entries).unwrap())
            }
        };

        NodeState::write(store, &template, child_pointer, &value_ids).unwrap()
    }

    fn leaf(store: &Arc<dyn SegmentStore>, marker: i64) -> NodeState {
        persist(store, &[("marker", PropertyValue::Long(marker))], &[])
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[test]
    fn written_node_reads_back() {
        let store = store();
        let state = persist(
            &store,
            &[
                ("jcr:primaryType", PropertyValue::Name("nt:folder".into())),
                ("title", PropertyValue::String("hello".into())),
                ("count", PropertyValue::Long(7)),
            ],
            &[],
        );

        assert_eq!(
            state.property("jcr:primaryType").unwrap(),
            Some(PropertyValue::Name("nt:folder".into()))
        );
        assert_eq!(
            state.property("title").unwrap(),
            Some(PropertyValue::String("hello".into()))
        );
        assert_eq!(state.property("count").unwrap(), Some(PropertyValue::Long(7)));
        assert_eq!(state.property("missing").unwrap(), None);
        assert_eq!(state.property_count(), 3);
        assert!(state.has_property("title"));
        assert!(!state.has_property("missing"));
    }

    #[test]
    fn reread_state_equals_written_state() {
        let store = store();
        let written = persist(&store, &[("a", PropertyValue::Long(1))], &[]);
        let reread = NodeState::read(Arc::clone(&store), written.record_id()).unwrap();
        assert_eq!(reread, written);
        assert_eq!(reread.template(), written.template());
    }

    #[test]
    fn property_enumeration_lists_type_properties_first() {
        let store = store();
        let state = persist(
            &store,
            &[
                ("zeta", PropertyValue::Long(1)),
                ("jcr:primaryType", PropertyValue::Name("nt:file".into())),
                ("alpha", PropertyValue::Boolean(true)),
            ],
            &[],
        );
        let props = state.properties().unwrap();
        let names: Vec<&str> = props.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["jcr:primaryType", "alpha", "zeta"]);
    }

    #[test]
    fn ill_typed_primary_type_reads_from_the_general_array() {
        let store = store();
        let state = persist(
            &store,
            &[(
                "jcr:primaryType",
                PropertyValue::Names(vec!["nt:folder".into()]),
            )],
            &[],
        );
        assert_eq!(state.template().primary_type(), None);
        assert_eq!(
            state.property("jcr:primaryType").unwrap(),
            Some(PropertyValue::Names(vec!["nt:folder".into()]))
        );
    }

    #[test]
    fn identical_content_converges_to_one_record() {
        let store = store();
        let a = persist(&store, &[("x", PropertyValue::Long(5))], &[]);
        let b = persist(&store, &[("x", PropertyValue::Long(5))], &[]);
        assert_eq!(a.record_id(), b.record_id());
        assert_eq!(a, b);
    }

    // -----------------------------------------------------------------------
    // Children
    // -----------------------------------------------------------------------

    #[test]
    fn childless_node_dispatch() {
        let store = store();
        let state = persist(&store, &[("a", PropertyValue::Long(1))], &[]);
        assert_eq!(state.child_count().unwrap(), 0);
        assert!(!state.has_child("x").unwrap());
        assert!(state.child("x").unwrap().is_none());
        assert!(state.child_names().unwrap().is_empty());
    }

    #[test]
    fn single_child_dispatch() {
        let store = store();
        let child = leaf(&store, 1);
        let state = persist(&store, &[], &[("only", &child)]);

        assert_eq!(state.child_count().unwrap(), 1);
        assert!(state.has_child("only").unwrap());
        assert!(!state.has_child("other").unwrap());
        assert_eq!(state.child("only").unwrap().unwrap(), child);
        assert!(state.child("other").unwrap().is_none());
        assert_eq!(state.child_names().unwrap(), ["only"]);
    }

    #[test]
    fn many_children_dispatch() {
        let store = store();
        let x = leaf(&store, 1);
        let y = leaf(&store, 2);
        let z = leaf(&store, 3);
        let state = persist(&store, &[], &[("x", &x), ("y", &y), ("z", &z)]);

        assert_eq!(state.child_count().unwrap(), 3);
        assert!(state.has_child("y").unwrap());
        assert!(!state.has_child("w").unwrap());
        assert_eq!(state.child("z").unwrap().unwrap(), z);

        let mut names = state.child_names().unwrap();
        names.sort();
        assert_eq!(names, ["x", "y", "z"]);

        let children = state.children().unwrap();
        assert_eq!(children.len(), 3);
    }

    // -----------------------------------------------------------------------
    // Corruption checks
    // -----------------------------------------------------------------------

    /// Hand-assemble a node record whose header disagrees with its
    /// template.
    fn forged_node(
        store: &Arc<dyn SegmentStore>,
        template: &NodeTemplate,
        flags: u8,
        count: u16,
        slots: &[RecordId],
    ) -> RecordId {
        let template_id = store
            .write_record(
                RecordKind::Template,
                0,
                template.properties().len() as u16,
                &template.to_bytes().unwrap(),
            )
            .unwrap();
        let mut body = vec![0u8; RecordId::BYTES - RecordHeader::SIZE];
        for slot in slots {
            body.extend_from_slice(&slot.to_bytes());
        }
        body.extend_from_slice(&template_id.to_bytes());
        store
            .write_record(RecordKind::Node, flags, count, &body)
            .unwrap()
    }

    #[test]
    fn header_child_flag_must_match_template() {
        let store = store();
        let decoy = leaf(&store, 9);
        // Childless template, but the header claims a child slot.
        let template = NodeTemplate::classify(std::iter::empty(), ChildLayout::Zero);
        let id = forged_node(
            &store,
            &template,
            RecordHeader::HAS_CHILD,
            0,
            &[decoy.record_id()],
        );
        let err = NodeState::read(Arc::clone(&store), id).unwrap_err();
        assert!(matches!(err, TreeError::LayoutMismatch { .. }));
    }

    #[test]
    fn header_count_must_match_template() {
        let store = store();
        let template = NodeTemplate::classify(std::iter::empty(), ChildLayout::Zero);
        let id = forged_node(&store, &template, 0, 5, &[]);
        let err = NodeState::read(Arc::clone(&store), id).unwrap_err();
        assert!(matches!(
            err,
            TreeError::CountMismatch {
                header: 5,
                template: 0,
                ..
            }
        ));
    }

    #[test]
    fn oversized_property_set_fails_the_write() {
        let store = store();
        // One property past what the header's u16 count can carry.
        let names: Vec<String> = (0..=u16::MAX as u32).map(|i| format!("p{i:05}")).collect();
        let value = PropertyValue::Long(0);
        let template = NodeTemplate::classify(
            names.iter().map(|n| (n.as_str(), &value)),
            ChildLayout::Zero,
        );
        let value_id = value::write_value(&*store, &value).unwrap();
        let value_ids = vec![value_id; names.len()];

        let err = NodeState::write(&store, &template, None, &value_ids).unwrap_err();
        assert!(matches!(err, TreeError::TooManyEntries { count: 65_536 }));
    }

    #[test]
    fn unsorted_stored_template_fails_the_read() {
        let store = store();
        // Bypass classify() to store an invalid template payload.
        let bad = bincode::serialize(&(
            None::<String>,
            None::<Vec<String>>,
            vec![
                PropertyTemplate::new("b", PropertyType::LONG),
                PropertyTemplate::new("a", PropertyType::LONG),
            ],
            ChildLayout::Zero,
        ))
        .unwrap();
        let template_id = store.write_record(RecordKind::Template, 0, 2, &bad).unwrap();

        let mut body = vec![0u8; RecordId::BYTES - RecordHeader::SIZE];
        body.extend_from_slice(&template_id.to_bytes());
        let node_id = store.write_record(RecordKind::Node, 0, 2, &body).unwrap();

        let err = NodeState::read(Arc::clone(&store), node_id).unwrap_err();
        assert!(matches!(err, TreeError::UnsortedTemplate { .. }));
    }

    #[test]
    fn non_node_record_is_rejected() {
        let store = store();
        let value_id = value::write_value(&*store, &PropertyValue::Long(1)).unwrap();
        assert!(NodeState::read(Arc::clone(&store), value_id).is_err());
    }
}
