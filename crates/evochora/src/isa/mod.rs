//! The instruction set: opcodes, operand shapes, decoding, execution.
//!
//! Instructions live in the world as cells: one `CODE` cell holding the
//! opcode id, followed by its operand cells along the executing organism's
//! direction vector. Register and immediate operands occupy one cell each; a
//! vector operand occupies one cell per world axis, so instruction length
//! depends on world dimensionality and is computed at decode time.
//!
//! # Module structure
//!
//! - `data` - register moves and bitmask/vector conversion
//! - `math` - arithmetic and bitwise operations
//! - `flow` - conditionals, jumps, calls, direction changes
//! - `world_ops` - scanning, peeking, poking, movement, data pointers
//! - `stack_ops` - the data and location stacks
//! - `scan` - neighborhood scans and seeded random choice

pub mod data;
pub mod flow;
pub mod math;
pub mod scan;
pub mod stack_ops;
pub mod world_ops;

use crate::{
    molecule::{Molecule, MoleculeTag, RegValue},
    organism::{Organism, StepError, TrapKind},
    registers::RegisterRef,
    rng::TickRng,
    vector::Vector,
    world::World,
};

/// Shape of one instruction operand in cell encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// One `DATA` cell holding an encoded register index.
    Reg,
    /// One cell holding an arbitrary typed molecule.
    Imm,
    /// `n` `DATA` cells, one component per world axis. Label operands are
    /// rewritten to this shape by the linker.
    Vec,
}

/// Instruction opcodes.
///
/// Discriminants are the `CODE` cell payloads of compiled programs and must
/// never be reordered.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(i64)]
pub enum Opcode {
    // data
    Nop = 0,
    Seti = 1,
    Setr = 2,
    Setv = 3,
    B2vr = 4,
    V2br = 5,
    // arithmetic
    Addi = 10,
    Addr = 11,
    Subi = 12,
    Subr = 13,
    Muli = 14,
    Mulr = 15,
    Divi = 16,
    Divr = 17,
    Notr = 18,
    Andr = 19,
    Orr = 20,
    Xorr = 21,
    Rtrr = 22,
    // comparison (conditional skip)
    Ifr = 30,
    Ifi = 31,
    Iftr = 32,
    Gtr = 33,
    Gti = 34,
    Ltr = 35,
    Lti = 36,
    // control flow
    Jmpi = 40,
    Jmpr = 41,
    Call = 42,
    Ret = 43,
    Hlt = 44,
    Trni = 45,
    Trnr = 46,
    // world I/O
    Scan = 50,
    Peek = 51,
    Poke = 52,
    Poki = 53,
    Seek = 54,
    // data pointers
    Sdpa = 60,
    Sync = 61,
    Skdp = 62,
    Pekd = 63,
    Pokd = 64,
    // location registers
    Slrd = 65,
    Sdrl = 66,
    Pusl = 67,
    Popl = 68,
    // stacks
    Push = 70,
    Pop = 71,
    Dups = 72,
    Swps = 73,
    Drps = 74,
    // neighborhood scans and random choice
    Snti = 80,
    Rbir = 81,
    Rndi = 82,
    // reproduction
    Fork = 90,
}

impl Opcode {
    /// The operand shapes of this opcode, in argument order.
    ///
    /// `CALL` is variable-length (target vector, two count cells, then one
    /// register cell per actual) and is decoded specially; its entry here
    /// covers only the fixed target operand.
    #[must_use]
    pub fn operand_kinds(self) -> &'static [OperandKind] {
        use OperandKind::{Imm, Reg, Vec};
        match self {
            Self::Nop | Self::Ret | Self::Hlt | Self::Sync | Self::Dups | Self::Swps | Self::Drps => &[],
            Self::Seti | Self::Addi | Self::Subi | Self::Muli | Self::Divi | Self::Ifi | Self::Gti | Self::Lti => {
                &[Reg, Imm]
            }
            Self::Setr
            | Self::B2vr
            | Self::V2br
            | Self::Addr
            | Self::Subr
            | Self::Mulr
            | Self::Divr
            | Self::Andr
            | Self::Orr
            | Self::Xorr
            | Self::Ifr
            | Self::Iftr
            | Self::Gtr
            | Self::Ltr
            | Self::Rbir => &[Reg, Reg],
            Self::Notr | Self::Jmpr | Self::Trnr | Self::Pekd | Self::Pokd | Self::Push | Self::Pop => &[Reg],
            Self::Setv => &[Reg, Vec],
            Self::Rtrr => &[Reg, Imm, Imm],
            Self::Jmpi | Self::Call => &[Vec],
            Self::Trni | Self::Seek | Self::Skdp => &[Vec],
            Self::Scan | Self::Peek | Self::Poke => &[Reg, Vec],
            Self::Poki => &[Imm, Vec],
            Self::Sdpa | Self::Slrd | Self::Sdrl | Self::Pusl | Self::Popl => &[Imm],
            Self::Snti | Self::Rndi => &[Reg, Imm],
            Self::Fork => &[Reg, Reg],
        }
    }

    /// Number of cells this instruction occupies, opcode cell included.
    ///
    /// For `CALL`, this covers only the fixed prefix (opcode + target + the
    /// two actual-count cells); the true length additionally depends on the
    /// counts and is produced by [`decode`].
    #[must_use]
    pub fn fixed_cell_len(self, dims: usize) -> usize {
        let operands: usize = self
            .operand_kinds()
            .iter()
            .map(|kind| match kind {
                OperandKind::Reg | OperandKind::Imm => 1,
                OperandKind::Vec => dims,
            })
            .sum();
        let call_counts = if self == Self::Call { 2 } else { 0 };
        1 + operands + call_counts
    }
}

/// A decoded operand value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(RegisterRef),
    Imm(Molecule),
    Vec(Vector),
}

/// A fully decoded instruction, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// For `CALL`: how many leading registers in `actuals` are REF bindings.
    pub ref_count: usize,
    /// For `CALL`: actual registers, REF bindings first.
    pub actuals: Vec<RegisterRef>,
    /// Total cells occupied, opcode included.
    pub cell_len: usize,
}

impl Instruction {
    /// The register operand at `index`.
    ///
    /// # Panics
    /// Panics when the operand has a different shape; [`decode`] guarantees
    /// operands match the opcode signature, so this indicates a ISA bug.
    pub(crate) fn reg(&self, index: usize) -> RegisterRef {
        match &self.operands[index] {
            Operand::Reg(reg) => *reg,
            other => unreachable!("operand {index} of {} is {other:?}, expected a register", self.opcode),
        }
    }

    /// The immediate operand at `index`.
    pub(crate) fn imm(&self, index: usize) -> Molecule {
        match &self.operands[index] {
            Operand::Imm(m) => *m,
            other => unreachable!("operand {index} of {} is {other:?}, expected an immediate", self.opcode),
        }
    }

    /// The vector operand at `index`.
    pub(crate) fn vec(&self, index: usize) -> &Vector {
        match &self.operands[index] {
            Operand::Vec(v) => v,
            other => unreachable!("operand {index} of {} is {other:?}, expected a vector", self.opcode),
        }
    }
}

/// Failures while reading an instruction out of the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The instruction-pointer cell is not a `CODE` molecule.
    NotCode(Molecule),
    /// The `CODE` payload does not name an opcode.
    UnknownOpcode(i64),
    /// An operand cell that must name a register does not.
    BadRegister(i64),
    /// A `CALL` actual-count cell is negative or absurd.
    BadCallArity(i64),
}

/// Reads the instruction at `ip`, walking `dv` for operand cells.
///
/// Decoding never mutates anything; traps and halts are decided by the
/// caller from the returned error.
pub fn decode(world: &World, ip: &Vector, dv: &Vector) -> Result<Instruction, DecodeError> {
    let dims = world.dims();
    let mut cursor = ip.clone();
    let mut next_cell = |world: &World| -> Molecule {
        cursor = world.wrap(&cursor.add(dv));
        world.get(&cursor)
    };

    let head = world.get(ip);
    if head.tag != MoleculeTag::Code {
        return Err(DecodeError::NotCode(head));
    }
    let opcode = Opcode::from_repr(head.value).ok_or(DecodeError::UnknownOpcode(head.value))?;

    let mut operands = Vec::with_capacity(opcode.operand_kinds().len());
    let mut cell_len = 1usize;
    for kind in opcode.operand_kinds() {
        match kind {
            OperandKind::Reg => {
                let cell = next_cell(world);
                cell_len += 1;
                let reg = RegisterRef::decode(cell.value).ok_or(DecodeError::BadRegister(cell.value))?;
                operands.push(Operand::Reg(reg));
            }
            OperandKind::Imm => {
                let cell = next_cell(world);
                cell_len += 1;
                operands.push(Operand::Imm(cell));
            }
            OperandKind::Vec => {
                let mut components = Vec::with_capacity(dims);
                for _ in 0..dims {
                    components.push(next_cell(world).value);
                }
                cell_len += dims;
                operands.push(Operand::Vec(Vector::new(components)));
            }
        }
    }

    let mut ref_count = 0;
    let mut actuals = Vec::new();
    if opcode == Opcode::Call {
        let refs = next_cell(world).value;
        let vals = next_cell(world).value;
        cell_len += 2;
        if !(0..=64).contains(&refs) || !(0..=64).contains(&vals) {
            return Err(DecodeError::BadCallArity(refs.max(vals)));
        }
        ref_count = refs as usize;
        for _ in 0..refs + vals {
            let cell = next_cell(world);
            cell_len += 1;
            let reg = RegisterRef::decode(cell.value).ok_or(DecodeError::BadRegister(cell.value))?;
            actuals.push(reg);
        }
    }

    Ok(Instruction {
        opcode,
        operands,
        ref_count,
        actuals,
        cell_len,
    })
}

/// Outcome of executing one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Executed normally; advance `ip` unless the instruction wrote it.
    Ok,
    /// Predicate was false; advance past the next whole instruction too.
    SkipNext,
}

/// Mutable execution context handed to every instruction handler.
pub struct ExecContext<'a> {
    pub world: &'a mut World,
    pub rng: &'a mut TickRng,
    /// Children spawned this step (`FORK`); collected by the scheduler.
    pub spawned: &'a mut Vec<crate::organism::SpawnRequest>,
}

/// Executes one decoded instruction against an organism.
///
/// Returns the outcome, or a [`StepError`] describing a trap or halt. Traps
/// are recorded in `er` by the caller and execution continues; halts remove
/// the organism.
pub fn execute(
    org: &mut Organism,
    instr: &Instruction,
    ctx: &mut ExecContext<'_>,
) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Nop => Ok(Outcome::Ok),
        Opcode::Seti | Opcode::Setr | Opcode::Setv | Opcode::B2vr | Opcode::V2br => data::execute(org, instr),
        Opcode::Addi
        | Opcode::Addr
        | Opcode::Subi
        | Opcode::Subr
        | Opcode::Muli
        | Opcode::Mulr
        | Opcode::Divi
        | Opcode::Divr
        | Opcode::Notr
        | Opcode::Andr
        | Opcode::Orr
        | Opcode::Xorr
        | Opcode::Rtrr => math::execute(org, instr),
        Opcode::Ifr | Opcode::Ifi | Opcode::Iftr | Opcode::Gtr | Opcode::Gti | Opcode::Ltr | Opcode::Lti => {
            flow::execute_predicate(org, instr)
        }
        Opcode::Jmpi | Opcode::Jmpr | Opcode::Call | Opcode::Ret | Opcode::Hlt | Opcode::Trni | Opcode::Trnr => {
            flow::execute(org, instr, ctx)
        }
        Opcode::Scan
        | Opcode::Peek
        | Opcode::Poke
        | Opcode::Poki
        | Opcode::Seek
        | Opcode::Sdpa
        | Opcode::Sync
        | Opcode::Skdp
        | Opcode::Pekd
        | Opcode::Pokd => world_ops::execute(org, instr, ctx),
        Opcode::Slrd | Opcode::Sdrl | Opcode::Pusl | Opcode::Popl | Opcode::Push | Opcode::Pop | Opcode::Dups
        | Opcode::Swps | Opcode::Drps => stack_ops::execute(org, instr),
        Opcode::Snti | Opcode::Rbir | Opcode::Rndi | Opcode::Fork => scan::execute(org, instr, ctx),
    }
}

/// Renders the instruction at `ip` as assembly text, for snapshots.
///
/// Returns `None` when the cell under `ip` does not decode.
#[must_use]
pub fn disassemble(world: &World, ip: &Vector, dv: &Vector) -> Option<String> {
    let instr = decode(world, ip, dv).ok()?;
    let mut text = instr.opcode.to_string();
    for operand in &instr.operands {
        match operand {
            Operand::Reg(reg) => text.push_str(&format!(" {reg}")),
            Operand::Imm(m) => text.push_str(&format!(" {m}")),
            Operand::Vec(v) => text.push_str(&format!(" {v}")),
        }
    }
    if instr.opcode == Opcode::Call {
        let (refs, vals) = instr.actuals.split_at(instr.ref_count);
        if !refs.is_empty() {
            text.push_str(" REF");
            for reg in refs {
                text.push_str(&format!(" {reg}"));
            }
        }
        if !vals.is_empty() {
            text.push_str(" VAL");
            for reg in vals {
                text.push_str(&format!(" {reg}"));
            }
        }
    }
    Some(text)
}

/// Convenience for handlers: requires a molecule-valued register.
pub(crate) fn molecule_of(value: &RegValue) -> Result<Molecule, StepError> {
    value
        .as_molecule()
        .ok_or(StepError::Trap(TrapKind::TypeMismatch))
}

/// Convenience for handlers: requires a vector-valued register.
pub(crate) fn vector_of(value: &RegValue) -> Result<Vector, StepError> {
    value
        .as_vector()
        .cloned()
        .ok_or(StepError::Trap(TrapKind::TypeMismatch))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn opcode_names_round_trip() {
        for (name, op) in [("SETI", Opcode::Seti), ("JMPI", Opcode::Jmpi), ("FORK", Opcode::Fork)] {
            assert_eq!(Opcode::from_str(name).unwrap(), op);
            assert_eq!(op.to_string(), name);
        }
    }

    #[test]
    fn fixed_cell_len_counts_vector_operands_per_axis() {
        // SETV reg vec in 3-D: opcode + reg + 3 components.
        assert_eq!(Opcode::Setv.fixed_cell_len(3), 5);
        // NOP is a bare opcode cell.
        assert_eq!(Opcode::Nop.fixed_cell_len(3), 1);
        // CALL prefix: opcode + 2 target components + 2 count cells.
        assert_eq!(Opcode::Call.fixed_cell_len(2), 5);
    }
}
