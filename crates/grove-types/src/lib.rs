//! Foundation types for the Grove store.
//!
//! This crate provides the identity and value types used throughout the
//! Grove storage core. Every other Grove crate depends on `grove-types`.
//!
//! # Key Types
//!
//! - [`SegmentId`] — UUID v7 identity of one immutable storage segment
//! - [`RecordId`] — Address of a record: segment identity plus byte offset
//! - [`PropertyType`] — Base kind plus multiplicity of a property value
//! - [`PropertyValue`] — A typed property value, scalar or multi-valued
//! - [`names`] — Reserved node-type property names

pub mod error;
pub mod names;
pub mod property;
pub mod record_id;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use property::{PropertyType, ValueKind};
pub use record_id::{RecordId, SegmentId};
pub use value::PropertyValue;
