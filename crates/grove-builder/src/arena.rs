//! Per-transaction node table.
//!
//! Every path touched by a builder transaction has exactly one [`Entry`]
//! here, so any number of handles for the same path observe the same
//! mutable node. Entries survive removal in disconnected form; that is
//! what lets a stale handle fail loudly instead of reading resurrected
//! content.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use grove_segment::SegmentStore;
use grove_tree::{NodeState, TreeResult};
use grove_types::PropertyValue;

use crate::error::{BuilderError, BuilderResult};
use crate::path::NodePath;

/// One recorded property mutation.
#[derive(Clone, Debug)]
pub(crate) enum PropertyOp {
    Set(PropertyValue),
    Remove,
}

/// Mutable state of one conceptual node.
///
/// Bookkeeping invariants: `removed_children` only ever names children
/// that exist in `base`, and `added_children` only names live entries at
/// the corresponding child path. A name can sit in both sets at once,
/// which means the base child was removed and a fresh node added in its
/// place.
pub(crate) struct Entry {
    /// Live flag. A removed node keeps its entry, disconnected, until the
    /// path is re-added or the transaction is rebased.
    pub connected: bool,
    /// Stored version this node reads through, if its path resolves in the
    /// transaction base.
    pub base: Option<NodeState>,
    /// Property overlay, by name.
    pub properties: BTreeMap<String, PropertyOp>,
    /// Base children removed in this transaction.
    pub removed_children: BTreeSet<String>,
    /// Children added in this transaction.
    pub added_children: BTreeSet<String>,
}

impl Entry {
    fn live(base: Option<NodeState>) -> Self {
        Self {
            connected: true,
            base,
            properties: BTreeMap::new(),
            removed_children: BTreeSet::new(),
            added_children: BTreeSet::new(),
        }
    }

    fn dead() -> Self {
        Self {
            connected: false,
            ..Self::live(None)
        }
    }
}

/// The table itself plus the store every materialization writes into.
pub(crate) struct Arena {
    store: Arc<dyn SegmentStore>,
    nodes: HashMap<NodePath, Entry>,
}

impl Arena {
    pub fn new(store: Arc<dyn SegmentStore>, base: Option<NodeState>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodePath::root(), Entry::live(base));
        Self { store, nodes }
    }

    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    pub fn is_connected(&self, path: &NodePath) -> bool {
        self.nodes.get(path).is_some_and(|entry| entry.connected)
    }

    pub fn live_entry(&self, path: &NodePath) -> BuilderResult<&Entry> {
        match self.nodes.get(path) {
            Some(entry) if entry.connected => Ok(entry),
            _ => Err(BuilderError::Disconnected { path: path.clone() }),
        }
    }

    fn live_entry_mut(&mut self, path: &NodePath) -> BuilderResult<&mut Entry> {
        match self.nodes.get_mut(path) {
            Some(entry) if entry.connected => Ok(entry),
            _ => Err(BuilderError::Disconnected { path: path.clone() }),
        }
    }

    /// Names of `path`'s children that have a live entry of their own.
    pub fn visited_child_names(&self, path: &NodePath) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(p, entry)| entry.connected && p.parent().as_ref() == Some(path))
            .filter_map(|(p, _)| p.name().map(str::to_string))
            .collect()
    }

    // -- properties ---------------------------------------------------------

    pub fn base_state(&self, path: &NodePath) -> BuilderResult<Option<NodeState>> {
        Ok(self.live_entry(path)?.base.clone())
    }

    pub fn property(&self, path: &NodePath, name: &str) -> BuilderResult<Option<PropertyValue>> {
        let entry = self.live_entry(path)?;
        if let Some(op) = entry.properties.get(name) {
            return Ok(match op {
                PropertyOp::Set(value) => Some(value.clone()),
                PropertyOp::Remove => None,
            });
        }
        match &entry.base {
            Some(base) => Ok(base.property(name)?),
            None => Ok(None),
        }
    }

    pub fn has_property(&self, path: &NodePath, name: &str) -> BuilderResult<bool> {
        let entry = self.live_entry(path)?;
        if let Some(op) = entry.properties.get(name) {
            return Ok(matches!(op, PropertyOp::Set(_)));
        }
        match &entry.base {
            Some(base) => Ok(base.has_property(name)),
            None => Ok(false),
        }
    }

    pub fn property_count(&self, path: &NodePath) -> BuilderResult<usize> {
        let entry = self.live_entry(path)?;
        let mut count = 0;
        if let Some(base) = &entry.base {
            count += base
                .property_names()
                .iter()
                .filter(|name| !entry.properties.contains_key(*name))
                .count();
        }
        count += entry
            .properties
            .values()
            .filter(|op| matches!(op, PropertyOp::Set(_)))
            .count();
        Ok(count)
    }

    pub fn set_property(
        &mut self,
        path: &NodePath,
        name: &str,
        value: PropertyValue,
    ) -> BuilderResult<()> {
        require_name(name)?;
        let entry = self.live_entry_mut(path)?;
        entry
            .properties
            .insert(name.to_string(), PropertyOp::Set(value));
        Ok(())
    }

    /// Remove a property. Returns whether it existed.
    pub fn remove_property(&mut self, path: &NodePath, name: &str) -> BuilderResult<bool> {
        require_name(name)?;
        let entry = self.live_entry(path)?;
        let base_has = entry.base.as_ref().is_some_and(|base| base.has_property(name));
        let existed = match entry.properties.get(name) {
            Some(PropertyOp::Set(_)) => true,
            Some(PropertyOp::Remove) => false,
            None => base_has,
        };
        if !existed {
            return Ok(false);
        }
        let entry = self.live_entry_mut(path)?;
        if base_has {
            entry
                .properties
                .insert(name.to_string(), PropertyOp::Remove);
        } else {
            entry.properties.remove(name);
        }
        Ok(true)
    }

    // -- children -----------------------------------------------------------

    pub fn child_count(&self, path: &NodePath) -> BuilderResult<u64> {
        let entry = self.live_entry(path)?;
        let base_count = match &entry.base {
            Some(base) => base.child_count()?,
            None => 0,
        };
        // removed_children never outgrows the base child set.
        Ok(base_count + entry.added_children.len() as u64 - entry.removed_children.len() as u64)
    }

    pub fn has_child(&self, path: &NodePath, name: &str) -> BuilderResult<bool> {
        let entry = self.live_entry(path)?;
        if entry.added_children.contains(name) {
            return Ok(true);
        }
        if entry.removed_children.contains(name) {
            return Ok(false);
        }
        match &entry.base {
            Some(base) => Ok(base.has_child(name)?),
            None => Ok(false),
        }
    }

    pub fn child_names(&self, path: &NodePath) -> BuilderResult<Vec<String>> {
        let entry = self.live_entry(path)?;
        let mut names: BTreeSet<String> = BTreeSet::new();
        if let Some(base) = &entry.base {
            names.extend(
                base.child_names()?
                    .into_iter()
                    .filter(|name| !entry.removed_children.contains(name)),
            );
        }
        names.extend(entry.added_children.iter().cloned());
        Ok(names.into_iter().collect())
    }

    /// Ensure a live entry for `path/name`, creating or reviving it.
    ///
    /// An existing live entry is left untouched. Otherwise the child binds
    /// to the parent's base child of that name if one exists and was not
    /// removed; any other case produces a fresh empty node, with no trace
    /// of earlier overlay state at the same path.
    pub fn connect_child(&mut self, path: &NodePath, name: &str) -> BuilderResult<()> {
        require_name(name)?;
        let child_path = path.child(name);
        let parent = self.live_entry(path)?;
        if self
            .nodes
            .get(&child_path)
            .is_some_and(|entry| entry.connected)
        {
            return Ok(());
        }
        let base_child = if parent.removed_children.contains(name) {
            None
        } else {
            match &parent.base {
                Some(base) => base.child(name)?,
                None => None,
            }
        };
        let fresh = base_child.is_none();
        self.nodes.insert(child_path, Entry::live(base_child));
        if fresh {
            let parent = self.live_entry_mut(path)?;
            parent.added_children.insert(name.to_string());
        }
        Ok(())
    }

    /// Remove a child and disconnect its whole subtree. Returns whether
    /// the child existed.
    pub fn remove_child(&mut self, path: &NodePath, name: &str) -> BuilderResult<bool> {
        require_name(name)?;
        if !self.has_child(path, name)? {
            return Ok(false);
        }
        let child_path = path.child(name);
        for (p, entry) in self.nodes.iter_mut() {
            if p.starts_with(&child_path) {
                entry.connected = false;
            }
        }
        let parent = self.live_entry_mut(path)?;
        if !parent.added_children.remove(name) {
            parent.removed_children.insert(name.to_string());
        }
        debug!(path = %child_path, "removed child subtree");
        Ok(true)
    }

    // -- rebase -------------------------------------------------------------

    /// Throw away the whole overlay and rebind every known path against
    /// `new_base`. Paths that do not resolve there disconnect.
    pub fn reset(&mut self, new_base: NodeState) -> BuilderResult<()> {
        let paths: Vec<NodePath> = self.nodes.keys().cloned().collect();
        for path in paths {
            let entry = match resolve(&new_base, &path)? {
                Some(state) => Entry::live(Some(state)),
                None => Entry::dead(),
            };
            self.nodes.insert(path, entry);
        }
        debug!(root = %new_base.record_id(), "reset transaction onto new base");
        Ok(())
    }
}

fn require_name(name: &str) -> BuilderResult<()> {
    if name.is_empty() {
        return Err(BuilderError::EmptyName);
    }
    Ok(())
}

/// Walk `path` down from `base`, segment by segment.
fn resolve(base: &NodeState, path: &NodePath) -> TreeResult<Option<NodeState>> {
    let mut current = base.clone();
    for segment in path.segments() {
        match current.child(segment)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
