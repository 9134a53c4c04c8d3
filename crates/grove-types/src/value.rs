use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::property::PropertyType;

/// A typed property value.
///
/// Scalar and multi-valued forms are distinct variants: a multi-valued
/// property holding one element is not the same value as the scalar form.
/// Equality and hashing are structural, with doubles compared by bit
/// pattern so that values can key deduplication maps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Name(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Binary(Vec<u8>),
    Strings(Vec<String>),
    Names(Vec<String>),
    Longs(Vec<i64>),
    Doubles(Vec<f64>),
    Booleans(Vec<bool>),
    Binaries(Vec<Vec<u8>>),
}

impl PropertyValue {
    /// The full type of this value.
    pub fn ty(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::STRING,
            Self::Name(_) => PropertyType::NAME,
            Self::Long(_) => PropertyType::LONG,
            Self::Double(_) => PropertyType::DOUBLE,
            Self::Boolean(_) => PropertyType::BOOLEAN,
            Self::Binary(_) => PropertyType::BINARY,
            Self::Strings(_) => PropertyType::STRINGS,
            Self::Names(_) => PropertyType::NAMES,
            Self::Longs(_) => PropertyType::LONGS,
            Self::Doubles(_) => PropertyType::DOUBLES,
            Self::Booleans(_) => PropertyType::BOOLEANS,
            Self::Binaries(_) => PropertyType::BINARIES,
        }
    }

    /// Number of contained values (1 for scalar forms).
    pub fn count(&self) -> usize {
        match self {
            Self::String(_)
            | Self::Name(_)
            | Self::Long(_)
            | Self::Double(_)
            | Self::Boolean(_)
            | Self::Binary(_) => 1,
            Self::Strings(v) | Self::Names(v) => v.len(),
            Self::Longs(v) => v.len(),
            Self::Doubles(v) => v.len(),
            Self::Booleans(v) => v.len(),
            Self::Binaries(v) => v.len(),
        }
    }

    /// Returns `true` for multi-valued forms.
    pub fn is_multiple(&self) -> bool {
        self.ty().multiple
    }

    /// Scalar string payload (`String` or `Name`), if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar long payload, if any.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// Scalar boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Multi-valued name payload, if any.
    pub fn as_names(&self) -> Option<&[String]> {
        match self {
            Self::Names(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        use PropertyValue::*;
        match (self, other) {
            (String(a), String(b)) | (Name(a), Name(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Boolean(a), Boolean(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Strings(a), Strings(b)) | (Names(a), Names(b)) => a == b,
            (Longs(a), Longs(b)) => a == b,
            (Doubles(a), Doubles(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (Booleans(a), Booleans(b)) => a == b,
            (Binaries(a), Binaries(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyValue {}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use PropertyValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            String(s) | Name(s) => s.hash(state),
            Long(n) => n.hash(state),
            Double(d) => d.to_bits().hash(state),
            Boolean(b) => b.hash(state),
            Binary(b) => b.hash(state),
            Strings(v) | Names(v) => v.hash(state),
            Longs(v) => v.hash(state),
            Doubles(v) => {
                for d in v {
                    d.to_bits().hash(state);
                }
            }
            Booleans(v) => v.hash(state),
            Binaries(v) => v.hash(state),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
