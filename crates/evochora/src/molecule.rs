//! Typed molecules: the value type shared by world cells and registers.

use std::fmt;

use crate::vector::Vector;

/// Tag of a typed molecule.
///
/// The discriminants are part of the program artifact encoding and must not
/// be reordered.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MoleculeTag {
    #[default]
    Empty = 0,
    Code = 1,
    Data = 2,
    Energy = 3,
    Structure = 4,
}

/// A typed molecule: a tag plus a signed integer payload.
///
/// Equality is `(tag, value)`. The empty molecule always has payload 0;
/// constructors uphold that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Molecule {
    pub tag: MoleculeTag,
    pub value: i64,
}

impl Molecule {
    pub const EMPTY: Self = Self {
        tag: MoleculeTag::Empty,
        value: 0,
    };

    /// Creates a molecule. An `Empty` tag forces the payload to 0.
    #[must_use]
    pub fn new(tag: MoleculeTag, value: i64) -> Self {
        match tag {
            MoleculeTag::Empty => Self::EMPTY,
            _ => Self { tag, value },
        }
    }

    #[must_use]
    pub fn data(value: i64) -> Self {
        Self::new(MoleculeTag::Data, value)
    }

    #[must_use]
    pub fn code(value: i64) -> Self {
        Self::new(MoleculeTag::Code, value)
    }

    #[must_use]
    pub fn energy(value: i64) -> Self {
        Self::new(MoleculeTag::Energy, value)
    }

    #[must_use]
    pub fn structure(value: i64) -> Self {
        Self::new(MoleculeTag::Structure, value)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.tag == MoleculeTag::Empty
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag, self.value)
    }
}

/// The value held by an organism register: a molecule or an n-D vector.
///
/// Location registers always hold vectors; data and procedure registers may
/// hold either, depending on what was last written (`SETV` vs `SETI`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RegValue {
    Molecule(Molecule),
    Vector(Vector),
}

impl RegValue {
    /// Returns the molecule if this value holds one.
    #[must_use]
    pub fn as_molecule(&self) -> Option<Molecule> {
        match self {
            Self::Molecule(m) => Some(*m),
            Self::Vector(_) => None,
        }
    }

    /// Returns the vector if this value holds one.
    #[must_use]
    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            Self::Molecule(_) => None,
            Self::Vector(v) => Some(v),
        }
    }
}

impl Default for RegValue {
    fn default() -> Self {
        Self::Molecule(Molecule::data(0))
    }
}

impl From<Molecule> for RegValue {
    fn from(m: Molecule) -> Self {
        Self::Molecule(m)
    }
}

impl From<Vector> for RegValue {
    fn from(v: Vector) -> Self {
        Self::Vector(v)
    }
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Molecule(m) => write!(f, "{m}"),
            Self::Vector(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn empty_payload_is_forced_to_zero() {
        assert_eq!(Molecule::new(MoleculeTag::Empty, 17), Molecule::EMPTY);
    }

    #[test]
    fn tag_names_round_trip() {
        for tag in [
            MoleculeTag::Empty,
            MoleculeTag::Code,
            MoleculeTag::Data,
            MoleculeTag::Energy,
            MoleculeTag::Structure,
        ] {
            assert_eq!(MoleculeTag::from_str(&tag.to_string()).unwrap(), tag);
        }
    }

    #[test]
    fn display_matches_assembly_syntax() {
        assert_eq!(Molecule::data(10).to_string(), "DATA:10");
        assert_eq!(Molecule::energy(-3).to_string(), "ENERGY:-3");
    }
}
