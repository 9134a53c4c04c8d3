//! Turning an arena overlay back into stored, immutable node records.
//!
//! Materialization is bottom-up and share-everything: a subtree with no
//! overlay anywhere below it resolves to its base record id without a
//! single write, an unchanged property carries its old value record into
//! the new node, and a node with a stored child map is diff-updated so
//! untouched siblings are never even read.

use std::collections::BTreeMap;

use tracing::debug;

use grove_tree::{
    update_map, write_map, write_value, ChildLayout, EffectiveProperty, MapOp, MapRecord,
    NodeState, NodeTemplate,
};
use grove_types::{names, PropertyValue, RecordId};

use crate::arena::{Arena, Entry, PropertyOp};
use crate::error::BuilderResult;
use crate::path::NodePath;

/// Persist the node at `path` and everything changed beneath it, returning
/// the resulting state. A node left untouched materializes to its base.
pub(crate) fn materialize(arena: &Arena, path: &NodePath) -> BuilderResult<NodeState> {
    let entry = arena.live_entry(path)?;

    // Children first. Every visited live child materializes recursively;
    // ids that differ from the base child mark this node dirty.
    let mut materialized: BTreeMap<String, RecordId> = BTreeMap::new();
    let mut children_changed = false;
    for name in arena.visited_child_names(path) {
        let child_state = materialize(arena, &path.child(&name))?;
        if base_child_id(entry, &name)? != Some(child_state.record_id()) {
            children_changed = true;
        }
        materialized.insert(name, child_state.record_id());
    }

    // Untouched node: the base version is the result, record id and all.
    if let Some(base) = &entry.base {
        let clean = entry.properties.is_empty()
            && entry.removed_children.is_empty()
            && entry.added_children.is_empty()
            && !children_changed;
        if clean {
            return Ok(base.clone());
        }
    }

    let store = arena.store();
    let effective = effective_properties(entry)?;
    let (child_layout, child_pointer) = resolve_children(arena, entry, &materialized)?;

    let (template, backing) = NodeTemplate::classify_effective(effective, child_layout);
    let mut value_ids = Vec::with_capacity(backing.len());
    for prop in backing {
        let id = match prop {
            EffectiveProperty::Stored(_, id) => id,
            EffectiveProperty::Fresh(value) => write_value(&**store, &value)?,
        };
        value_ids.push(id);
    }

    let state = NodeState::write(store, &template, child_pointer, &value_ids)?;
    debug!(path = %path, node = %state.record_id(), "materialized node");
    Ok(state)
}

fn base_child_id(entry: &Entry, name: &str) -> BuilderResult<Option<RecordId>> {
    match &entry.base {
        Some(base) => Ok(base.child_id(name)?),
        None => Ok(None),
    }
}

/// The node's final property set: base properties first, overlay on top.
///
/// Base type properties come back as fresh values (they live in the
/// template, reconstructing them is free); base general properties come
/// back as stored type-plus-record pairs so their value records survive
/// into the new version untouched.
fn effective_properties(entry: &Entry) -> BuilderResult<BTreeMap<String, EffectiveProperty>> {
    let mut effective = BTreeMap::new();
    if let Some(base) = &entry.base {
        let template = base.template();
        if let Some(primary) = template.primary_type() {
            effective.insert(
                names::PRIMARY_TYPE.to_string(),
                EffectiveProperty::Fresh(PropertyValue::Name(primary.to_string())),
            );
        }
        if let Some(mixins) = template.mixin_types() {
            effective.insert(
                names::MIXIN_TYPES.to_string(),
                EffectiveProperty::Fresh(PropertyValue::Names(mixins.to_vec())),
            );
        }
        for prop in template.properties() {
            if let Some(id) = base.property_value_id(prop.name())? {
                effective.insert(
                    prop.name().to_string(),
                    EffectiveProperty::Stored(prop.ty(), id),
                );
            }
        }
    }
    for (name, op) in &entry.properties {
        match op {
            PropertyOp::Set(value) => {
                effective.insert(name.clone(), EffectiveProperty::Fresh(value.clone()));
            }
            PropertyOp::Remove => {
                effective.remove(name);
            }
        }
    }
    Ok(effective)
}

/// Final child layout and pointer for a node being written.
///
/// A base with a stored child map is updated with one op per changed name,
/// leaving sibling records shared; any other base shape carries at most
/// one child and the final set is assembled directly.
fn resolve_children(
    arena: &Arena,
    entry: &Entry,
    materialized: &BTreeMap<String, RecordId>,
) -> BuilderResult<(ChildLayout, Option<RecordId>)> {
    let store = arena.store();
    let base_map = match &entry.base {
        Some(base) => base.child_map_id()?,
        None => None,
    };

    if let Some(base_map) = base_map {
        let mut ops: Vec<MapOp> = Vec::new();
        for name in &entry.removed_children {
            if !materialized.contains_key(name) {
                ops.push(MapOp::Remove(name.clone()));
            }
        }
        for (name, id) in materialized {
            if base_child_id(entry, name)? != Some(*id) {
                ops.push(MapOp::Put(name.clone(), *id));
            }
        }
        return Ok(match update_map(&**store, base_map, &ops)? {
            None => (ChildLayout::Zero, None),
            Some(map_id) => {
                let map = MapRecord::open(&**store, map_id)?;
                match map.size()? {
                    0 => (ChildLayout::Zero, None),
                    1 => match map.entries()?.pop() {
                        Some((name, child_id)) => (ChildLayout::One(name), Some(child_id)),
                        None => (ChildLayout::Zero, None),
                    },
                    _ => (ChildLayout::Many, Some(map_id)),
                }
            }
        });
    }

    // At most one base child here; overlay entries shadow it by name.
    let mut finals: BTreeMap<String, RecordId> = BTreeMap::new();
    if let Some(base) = &entry.base {
        if let ChildLayout::One(name) = base.template().child_layout() {
            if !entry.removed_children.contains(name) {
                if let Some(id) = base.child_id(name)? {
                    finals.insert(name.clone(), id);
                }
            }
        }
    }
    for (name, id) in materialized {
        finals.insert(name.clone(), *id);
    }

    Ok(match finals.len() {
        0 => (ChildLayout::Zero, None),
        1 => match finals.into_iter().next() {
            Some((name, id)) => (ChildLayout::One(name), Some(id)),
            None => (ChildLayout::Zero, None),
        },
        _ => {
            let map_id = write_map(&**store, &finals)?;
            (ChildLayout::Many, Some(map_id))
        }
    })
}
