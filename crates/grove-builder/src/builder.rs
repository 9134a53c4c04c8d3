//! Copy-on-write node builders.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use grove_segment::SegmentStore;
use grove_tree::NodeState;
use grove_types::PropertyValue;

use crate::arena::Arena;
use crate::error::{BuilderError, BuilderResult};
use crate::materialize;
use crate::path::NodePath;

/// Mutable handle onto one conceptual node of a tree version under
/// construction.
///
/// All builders obtained from one root share a single arena of per-path
/// node entries; two handles for the same path are two views of the same
/// mutable node, so a mutation through either is immediately visible
/// through the other. The shared arena sits behind `Rc`, which keeps a
/// transaction on one thread; the immutable [`NodeState`]s it reads from
/// and produces remain freely shareable.
///
/// Mutations never touch stored records. Reads see the base version
/// through the overlay until [`node_state`](NodeBuilder::node_state)
/// persists the changed parts.
#[derive(Clone)]
pub struct NodeBuilder {
    arena: Rc<RefCell<Arena>>,
    path: NodePath,
}

impl NodeBuilder {
    /// Open a transaction. With a base state the root reads through it
    /// until mutated; without one the root starts empty.
    pub fn new(store: Arc<dyn SegmentStore>, base: Option<NodeState>) -> Self {
        Self {
            arena: Rc::new(RefCell::new(Arena::new(store, base))),
            path: NodePath::root(),
        }
    }

    /// Path of this handle's node within its transaction.
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Whether this handle's node is live. Removing a node disconnects
    /// every handle onto it and its descendants.
    pub fn is_connected(&self) -> bool {
        self.arena.borrow().is_connected(&self.path)
    }

    /// The stored version this node reads through, if any. Fresh nodes
    /// have none.
    pub fn base_state(&self) -> BuilderResult<Option<NodeState>> {
        self.arena.borrow().base_state(&self.path)
    }

    // -- properties ---------------------------------------------------------

    /// Read one property, overlay first, base second.
    pub fn property(&self, name: &str) -> BuilderResult<Option<PropertyValue>> {
        self.arena.borrow().property(&self.path, name)
    }

    pub fn has_property(&self, name: &str) -> BuilderResult<bool> {
        self.arena.borrow().has_property(&self.path, name)
    }

    pub fn property_count(&self) -> BuilderResult<usize> {
        self.arena.borrow().property_count(&self.path)
    }

    /// Set a property in the overlay.
    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> BuilderResult<()> {
        self.arena
            .borrow_mut()
            .set_property(&self.path, name, value.into())
    }

    /// Remove a property. Returns whether it existed.
    pub fn remove_property(&self, name: &str) -> BuilderResult<bool> {
        self.arena.borrow_mut().remove_property(&self.path, name)
    }

    // -- children -----------------------------------------------------------

    /// Handle onto the named child, creating it empty if absent.
    ///
    /// The returned builder is connected: if the name was previously
    /// removed here, this adds a fresh node in its place rather than
    /// reviving the removed content.
    pub fn child(&self, name: &str) -> BuilderResult<NodeBuilder> {
        self.arena.borrow_mut().connect_child(&self.path, name)?;
        Ok(NodeBuilder {
            arena: Rc::clone(&self.arena),
            path: self.path.child(name),
        })
    }

    pub fn has_child(&self, name: &str) -> BuilderResult<bool> {
        self.arena.borrow().has_child(&self.path, name)
    }

    pub fn child_count(&self) -> BuilderResult<u64> {
        self.arena.borrow().child_count(&self.path)
    }

    /// Names of all children, in name order.
    pub fn child_names(&self) -> BuilderResult<Vec<String>> {
        self.arena.borrow().child_names(&self.path)
    }

    /// Remove the named child and its whole subtree, disconnecting every
    /// handle onto it. Returns whether the child existed.
    pub fn remove_child(&self, name: &str) -> BuilderResult<bool> {
        self.arena.borrow_mut().remove_child(&self.path, name)
    }

    // -- transaction --------------------------------------------------------

    /// Rebase the transaction onto `new_base`, discarding the overlay.
    ///
    /// Root-only. Every handle rebinds eagerly: paths that resolve in
    /// `new_base` read it from now on, paths that do not disconnect.
    pub fn reset(&self, new_base: NodeState) -> BuilderResult<()> {
        if !self.path.is_root() {
            return Err(BuilderError::ResetNonRoot {
                path: self.path.clone(),
            });
        }
        self.arena.borrow_mut().reset(new_base)
    }

    /// Persist this node's current content as an immutable state.
    ///
    /// Untouched builders hand back their base state without writing;
    /// otherwise changed records are written and everything else is
    /// carried over from the base by record id.
    pub fn node_state(&self) -> BuilderResult<NodeState> {
        materialize::materialize(&self.arena.borrow(), &self.path)
    }
}

/// Opening builder transactions on stored states.
pub trait Buildable {
    /// A root builder with `self` as base.
    fn builder(&self) -> NodeBuilder;
}

impl Buildable for NodeState {
    fn builder(&self) -> NodeBuilder {
        NodeBuilder::new(Arc::clone(self.store()), Some(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
