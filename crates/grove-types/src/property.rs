use std::fmt;

use serde::{Deserialize, Serialize};

/// Base type of a property value, without multiplicity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Name,
    Long,
    Double,
    Boolean,
    Binary,
}

impl ValueKind {
    /// Upper-case name of the scalar form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Name => "NAME",
            Self::Long => "LONG",
            Self::Double => "DOUBLE",
            Self::Boolean => "BOOLEAN",
            Self::Binary => "BINARY",
        }
    }

    /// Upper-case name of the multi-valued form.
    pub fn plural_name(&self) -> &'static str {
        match self {
            Self::String => "STRINGS",
            Self::Name => "NAMES",
            Self::Long => "LONGS",
            Self::Double => "DOUBLES",
            Self::Boolean => "BOOLEANS",
            Self::Binary => "BINARIES",
        }
    }
}

/// Full type of a property value: base kind plus multiplicity.
///
/// A multi-valued property with a single element is a different type from
/// the scalar form; the distinction matters when classifying the reserved
/// node-type properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyType {
    pub kind: ValueKind,
    pub multiple: bool,
}

impl PropertyType {
    pub const STRING: Self = Self::scalar(ValueKind::String);
    pub const STRINGS: Self = Self::array(ValueKind::String);
    pub const NAME: Self = Self::scalar(ValueKind::Name);
    pub const NAMES: Self = Self::array(ValueKind::Name);
    pub const LONG: Self = Self::scalar(ValueKind::Long);
    pub const LONGS: Self = Self::array(ValueKind::Long);
    pub const DOUBLE: Self = Self::scalar(ValueKind::Double);
    pub const DOUBLES: Self = Self::array(ValueKind::Double);
    pub const BOOLEAN: Self = Self::scalar(ValueKind::Boolean);
    pub const BOOLEANS: Self = Self::array(ValueKind::Boolean);
    pub const BINARY: Self = Self::scalar(ValueKind::Binary);
    pub const BINARIES: Self = Self::array(ValueKind::Binary);

    /// The scalar type of `kind`.
    pub const fn scalar(kind: ValueKind) -> Self {
        Self {
            kind,
            multiple: false,
        }
    }

    /// The multi-valued type of `kind`.
    pub const fn array(kind: ValueKind) -> Self {
        Self {
            kind,
            multiple: true,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multiple {
            f.write_str(self.kind.plural_name())
        } else {
            f.write_str(self.kind.name())
        }
    }
}
