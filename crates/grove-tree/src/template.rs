use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use grove_types::{names, PropertyType, PropertyValue, RecordId};

use crate::error::{TreeError, TreeResult};

/// Width of one node-record slot.
pub(crate) const SLOT: u32 = RecordId::BYTES as u32;

/// Name and declared type of one general property, as recorded in a node
/// template. Ordered by name, which is what keeps template arrays sorted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyTemplate {
    name: String,
    ty: PropertyType,
}

impl PropertyTemplate {
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> PropertyType {
        self.ty
    }
}

/// Shape of a node's child collection.
///
/// A node with exactly one child stores that child's name inline and its
/// record id in the fixed child slot; a node with two or more stores a map
/// root there instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildLayout {
    /// No children; the node record has no child slot.
    Zero,
    /// Exactly one child, with the given name.
    One(String),
    /// Two or more children, reachable through a map record.
    Many,
}

impl ChildLayout {
    pub fn has_children(&self) -> bool {
        !matches!(self, Self::Zero)
    }
}

/// One property of a node version under construction: either a value set
/// in the current transaction, or a property carried over from a base
/// version as its declared type plus the stored value record.
///
/// Carried-over properties never rewrite their value records; the old
/// record id flows into the new node unchanged.
#[derive(Clone, Debug)]
pub enum EffectiveProperty {
    /// A value set in this transaction, not yet persisted.
    Fresh(PropertyValue),
    /// A value inherited from a base version: declared type and the record
    /// that already holds it.
    Stored(PropertyType, RecordId),
}

impl EffectiveProperty {
    pub fn ty(&self) -> PropertyType {
        match self {
            Self::Fresh(value) => value.ty(),
            Self::Stored(ty, _) => *ty,
        }
    }
}

/// Compact encoding of one node version's shape: the extracted type
/// properties, the sorted general property array, and the child layout.
///
/// The sorted-array and reserved-extraction invariants are structural:
/// fields are private, [`classify`](NodeTemplate::classify) establishes
/// them, and [`from_bytes`](NodeTemplate::from_bytes) re-validates them
/// before a decoded template is handed out.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeTemplate {
    primary_type: Option<String>,
    mixin_types: Option<Vec<String>>,
    properties: Vec<PropertyTemplate>,
    child_layout: ChildLayout,
}

impl NodeTemplate {
    /// Classify effective node content into a template.
    ///
    /// A `jcr:primaryType` property typed NAME and a `jcr:mixinTypes`
    /// property typed NAMES are promoted into the dedicated slots;
    /// everything else, reserved names carrying any other type included,
    /// lands in the general array, sorted by name.
    pub fn classify<'a>(
        properties: impl IntoIterator<Item = (&'a str, &'a PropertyValue)>,
        child_layout: ChildLayout,
    ) -> Self {
        let effective: BTreeMap<String, EffectiveProperty> = properties
            .into_iter()
            .map(|(name, value)| (name.to_string(), EffectiveProperty::Fresh(value.clone())))
            .collect();
        Self::classify_effective(effective, child_layout).0
    }

    /// [`classify`](NodeTemplate::classify) over a mix of fresh and
    /// carried-over properties.
    ///
    /// Returns the template together with the effective entries backing
    /// its general array, in array order, so a caller can persist fresh
    /// values and reuse stored record ids slot by slot. Only `Fresh`
    /// reserved properties promote; a stored general property never holds
    /// a well-typed reserved name in the first place.
    pub fn classify_effective(
        properties: BTreeMap<String, EffectiveProperty>,
        child_layout: ChildLayout,
    ) -> (Self, Vec<EffectiveProperty>) {
        let mut primary_type = None;
        let mut mixin_types = None;
        let mut general = Vec::new();
        let mut backing = Vec::new();
        for (name, prop) in properties {
            if name == names::PRIMARY_TYPE {
                if let EffectiveProperty::Fresh(PropertyValue::Name(n)) = &prop {
                    primary_type = Some(n.clone());
                    continue;
                }
            }
            if name == names::MIXIN_TYPES {
                if let EffectiveProperty::Fresh(PropertyValue::Names(ns)) = &prop {
                    mixin_types = Some(ns.clone());
                    continue;
                }
            }
            general.push(PropertyTemplate::new(name, prop.ty()));
            backing.push(prop);
        }
        // Map iteration is name-ordered, so the array arrives sorted.
        let template = Self {
            primary_type,
            mixin_types,
            properties: general,
            child_layout,
        };
        (template, backing)
    }

    /// The extracted primary type, if the node has a well-typed one.
    pub fn primary_type(&self) -> Option<&str> {
        self.primary_type.as_deref()
    }

    /// The extracted mixin types, if the node has well-typed ones.
    pub fn mixin_types(&self) -> Option<&[String]> {
        self.mixin_types.as_deref()
    }

    /// The general property array, sorted by name.
    pub fn properties(&self) -> &[PropertyTemplate] {
        &self.properties
    }

    pub fn child_layout(&self) -> &ChildLayout {
        &self.child_layout
    }

    /// Total property count, the present reserved slots included.
    pub fn property_count(&self) -> usize {
        self.properties.len()
            + usize::from(self.primary_type.is_some())
            + usize::from(self.mixin_types.is_some())
    }

    /// Index of `name` in the general array, by binary search.
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
    }

    /// Template entry for `name` in the general array, if any.
    pub fn property_template(&self, name: &str) -> Option<&PropertyTemplate> {
        self.property_index(name).map(|i| &self.properties[i])
    }

    /// Byte offset of the child-pointer slot in the node record, when the
    /// node has children.
    pub fn child_slot(&self) -> Option<u32> {
        self.child_layout.has_children().then_some(SLOT)
    }

    /// Byte offset of the template-pointer slot in the node record.
    pub fn template_slot(&self) -> u32 {
        if self.child_layout.has_children() {
            2 * SLOT
        } else {
            SLOT
        }
    }

    /// Byte offset of the first general property slot: two slot widths for
    /// a childless node, three otherwise.
    pub fn property_base(&self) -> u32 {
        if self.child_layout.has_children() {
            3 * SLOT
        } else {
            2 * SLOT
        }
    }

    /// Byte offset of the general property slot at `index`.
    pub fn property_slot(&self, index: usize) -> u32 {
        self.property_base() + index as u32 * SLOT
    }

    /// Encode for storage as a `Template` record body.
    pub fn to_bytes(&self) -> TreeResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| TreeError::Encode(e.to_string()))
    }

    /// Decode a `Template` record body, re-validating the structural
    /// invariants. `record` names the source in errors.
    pub fn from_bytes(record: RecordId, bytes: &[u8]) -> TreeResult<Self> {
        let template: Self = bincode::deserialize(bytes).map_err(|e| TreeError::Decode {
            record,
            reason: e.to_string(),
        })?;
        template.validate(record)?;
        Ok(template)
    }

    fn validate(&self, record: RecordId) -> TreeResult<()> {
        for pair in self.properties.windows(2) {
            if pair[0].name >= pair[1].name {
                return Err(TreeError::UnsortedTemplate {
                    record,
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }
        for p in &self.properties {
            let well_typed = (p.name == names::PRIMARY_TYPE && p.ty == PropertyType::NAME)
                || (p.name == names::MIXIN_TYPES && p.ty == PropertyType::NAMES);
            if well_typed {
                return Err(TreeError::ReservedInTemplate {
                    record,
                    name: p.name.clone(),
                });
            }
        }
        if let ChildLayout::One(name) = &self.child_layout {
            if name.is_empty() {
                return Err(TreeError::Decode {
                    record,
                    reason: "empty single-child name".to_string(),
                });
            }
        }
        Ok(())
    }
}
