//! The linear intermediate representation between AST and layout.

use std::fmt;

use crate::{isa::Opcode, molecule::Molecule, source::SourceSpan, vector::Vector};

/// One instruction operand in the IR.
///
/// `LabelRef` is the only unresolved shape; the linker rewrites every one of
/// them into a `Vec` coordinate. Registers are stored pre-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum IrOperand {
    Reg(u16),
    Imm(Molecule),
    Vec(Vector),
    LabelRef(String),
}

impl fmt::Display for IrOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(n) => write!(f, "Reg({n})"),
            Self::Imm(m) => write!(f, "Imm({m})"),
            Self::Vec(v) => write!(f, "Vec({v})"),
            Self::LabelRef(name) => write!(f, "LabelRef({name})"),
        }
    }
}

/// An instruction with resolved register/immediate operands.
///
/// `CALL` carries its actuals as first-class fields: the leading
/// `ref_actuals` bind by register identity, `val_actuals` by copied value.
#[derive(Debug, Clone, PartialEq)]
pub struct IrInstruction {
    pub opcode: Opcode,
    pub operands: Vec<IrOperand>,
    pub ref_actuals: Vec<u16>,
    pub val_actuals: Vec<u16>,
    pub span: SourceSpan,
}

/// One item of the linear IR stream.
#[derive(Debug, Clone, PartialEq)]
pub enum IrItem {
    Instruction(IrInstruction),
    /// A label bound to the next emitted cell, stored by canonical dotted path.
    Label { name: String, span: SourceSpan },
    /// `.ORG` — move the layout origin.
    Org { vector: Vector, span: SourceSpan },
    /// `.DIR` — change the layout direction.
    Dir { vector: Vector, span: SourceSpan },
    /// `.PLACE` — one cell at a fixed offset, off the layout cursor path.
    Place {
        molecule: Molecule,
        offset: Vector,
        span: SourceSpan,
    },
}
