//! Register references and their cell encoding.
//!
//! The assembler and the runtime share one register numbering: each register
//! file gets a disjoint index range so a single `DATA` payload identifies any
//! register in an operand cell.

use std::fmt;

/// Encoded index range reserved per register file.
const FILE_RANGE: i64 = 1000;
const PR_BASE: i64 = 1000;
const FPR_BASE: i64 = 2000;
const LR_BASE: i64 = 3000;

/// A reference to one register in one of the four register files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RegisterRef {
    /// `%DRn` — general data registers.
    Data(u16),
    /// `%PRn` — procedure-scoped registers, shadowed across `CALL`.
    Proc(u16),
    /// `%FPRn` — formal parameter bindings of the innermost call frame.
    Formal(u16),
    /// `%LRn` — location registers holding n-D coordinates.
    Location(u16),
}

impl RegisterRef {
    /// Encodes this reference as an operand cell payload.
    #[must_use]
    pub fn encode(self) -> i64 {
        match self {
            Self::Data(n) => i64::from(n),
            Self::Proc(n) => PR_BASE + i64::from(n),
            Self::Formal(n) => FPR_BASE + i64::from(n),
            Self::Location(n) => LR_BASE + i64::from(n),
        }
    }

    /// Decodes an operand cell payload back into a register reference.
    ///
    /// Returns `None` for payloads outside every file's range.
    #[must_use]
    pub fn decode(payload: i64) -> Option<Self> {
        if !(0..LR_BASE + FILE_RANGE).contains(&payload) {
            return None;
        }
        let index = (payload % FILE_RANGE) as u16;
        Some(match payload / FILE_RANGE {
            0 => Self::Data(index),
            1 => Self::Proc(index),
            2 => Self::Formal(index),
            _ => Self::Location(index),
        })
    }

    /// Parses assembly syntax like `%DR0`, `%PR2`, `%FPR1`, `%LR3`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('%')?;
        let upper = rest.to_ascii_uppercase();
        let (file, digits) = if let Some(d) = upper.strip_prefix("FPR") {
            ("FPR", d)
        } else if let Some(d) = upper.strip_prefix("DR") {
            ("DR", d)
        } else if let Some(d) = upper.strip_prefix("PR") {
            ("PR", d)
        } else if let Some(d) = upper.strip_prefix("LR") {
            ("LR", d)
        } else {
            return None;
        };
        let index: u16 = digits.parse().ok()?;
        if i64::from(index) >= FILE_RANGE {
            return None;
        }
        Some(match file {
            "DR" => Self::Data(index),
            "PR" => Self::Proc(index),
            "FPR" => Self::Formal(index),
            _ => Self::Location(index),
        })
    }
}

impl fmt::Display for RegisterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(n) => write!(f, "%DR{n}"),
            Self::Proc(n) => write!(f, "%PR{n}"),
            Self::Formal(n) => write!(f, "%FPR{n}"),
            Self::Location(n) => write!(f, "%LR{n}"),
        }
    }
}
