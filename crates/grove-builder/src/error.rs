//! Builder error taxonomy.

use grove_tree::TreeError;

use crate::path::NodePath;

/// Errors surfaced by builder operations.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    /// The handle's node was removed from the transaction. Re-obtaining the
    /// path through `child()` on a live ancestor yields a fresh node.
    #[error("node {path} was removed from the transaction")]
    Disconnected {
        /// Path of the removed node.
        path: NodePath,
    },

    /// Node and property names must be non-empty.
    #[error("empty name")]
    EmptyName,

    /// `reset` rebases the whole transaction and is a root-only operation.
    #[error("reset called on non-root node {path}")]
    ResetNonRoot {
        /// Path of the offending handle.
        path: NodePath,
    },

    /// A record-level failure while reading a base version or persisting
    /// the built one.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Convenience alias for builder operations.
pub type BuilderResult<T> = Result<T, BuilderError>;
