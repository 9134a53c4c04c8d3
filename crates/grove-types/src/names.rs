//! Reserved node-type property names.
//!
//! Two property names carry node typing information and live in dedicated
//! template slots instead of the general property array, but only when
//! their value type matches the expected form (single NAME for the primary
//! type, multi-valued NAME for the mixin types).

/// Name of the single-valued NAME property holding a node's primary type.
pub const PRIMARY_TYPE: &str = "jcr:primaryType";

/// Name of the multi-valued NAME property holding a node's mixin types.
pub const MIXIN_TYPES: &str = "jcr:mixinTypes";

/// Returns `true` if `name` is one of the reserved type-property names.
///
/// Reservation is by name only; whether such a property is promoted into a
/// template slot also depends on its value type.
pub fn is_reserved(name: &str) -> bool {
    name == PRIMARY_TYPE || name == MIXIN_TYPES
}
