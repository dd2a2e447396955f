//! Arithmetic and bitwise instructions.
//!
//! Register/register forms require matching tags (or two vectors, which
//! combine component-wise where that makes sense). Immediate forms operate
//! on payloads and keep the destination's tag. Overflow and division by zero
//! are arithmetic domain failures, which halt.

use crate::{
    isa::{molecule_of, Instruction, Opcode, Outcome},
    molecule::{Molecule, RegValue},
    organism::{HaltKind, Organism, StepError, TrapKind},
};

pub(crate) fn execute(org: &mut Organism, instr: &Instruction) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Addi | Opcode::Subi | Opcode::Muli | Opcode::Divi => {
            let current = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let operand = instr.imm(1).value;
            let value = apply_scalar(instr.opcode, current.value, operand)?;
            org.write_reg(instr.reg(0), RegValue::Molecule(Molecule::new(current.tag, value)))?;
        }
        Opcode::Addr | Opcode::Subr => {
            let lhs = org.read_reg(instr.reg(0))?;
            let rhs = org.read_reg(instr.reg(1))?;
            let result = match (&lhs, &rhs) {
                (RegValue::Vector(a), RegValue::Vector(b)) => {
                    if a.dims() != b.dims() {
                        return Err(StepError::Trap(TrapKind::TypeMismatch));
                    }
                    let b = if instr.opcode == Opcode::Subr { b.scaled(-1) } else { b.clone() };
                    RegValue::Vector(a.add(&b))
                }
                (RegValue::Molecule(a), RegValue::Molecule(b)) => {
                    if a.tag != b.tag {
                        return Err(StepError::Trap(TrapKind::TypeMismatch));
                    }
                    let value = apply_scalar(instr.opcode, a.value, b.value)?;
                    RegValue::Molecule(Molecule::new(a.tag, value))
                }
                _ => return Err(StepError::Trap(TrapKind::TypeMismatch)),
            };
            org.write_reg(instr.reg(0), result)?;
        }
        Opcode::Mulr | Opcode::Divr | Opcode::Andr | Opcode::Orr | Opcode::Xorr => {
            let lhs = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let rhs = molecule_of(&org.read_reg(instr.reg(1))?)?;
            if lhs.tag != rhs.tag {
                return Err(StepError::Trap(TrapKind::TypeMismatch));
            }
            let value = apply_scalar(instr.opcode, lhs.value, rhs.value)?;
            org.write_reg(instr.reg(0), RegValue::Molecule(Molecule::new(lhs.tag, value)))?;
        }
        Opcode::Notr => {
            let current = molecule_of(&org.read_reg(instr.reg(0))?)?;
            org.write_reg(
                instr.reg(0),
                RegValue::Molecule(Molecule::new(current.tag, !current.value)),
            )?;
        }
        Opcode::Rtrr => {
            let mut vector = match org.read_reg(instr.reg(0))? {
                RegValue::Vector(v) => v,
                RegValue::Molecule(_) => return Err(StepError::Trap(TrapKind::TypeMismatch)),
            };
            let a = axis_index(instr.imm(1).value, vector.dims())?;
            let b = axis_index(instr.imm(2).value, vector.dims())?;
            vector.rotate(a, b);
            org.write_reg(instr.reg(0), RegValue::Vector(vector))?;
        }
        other => unreachable!("{other} is not an arithmetic opcode"),
    }
    Ok(Outcome::Ok)
}

fn apply_scalar(opcode: Opcode, lhs: i64, rhs: i64) -> Result<i64, StepError> {
    let result = match opcode {
        Opcode::Addi | Opcode::Addr => lhs.checked_add(rhs),
        Opcode::Subi | Opcode::Subr => lhs.checked_sub(rhs),
        Opcode::Muli | Opcode::Mulr => lhs.checked_mul(rhs),
        Opcode::Divi | Opcode::Divr => {
            if rhs == 0 {
                None
            } else {
                lhs.checked_div(rhs)
            }
        }
        Opcode::Andr => Some(lhs & rhs),
        Opcode::Orr => Some(lhs | rhs),
        Opcode::Xorr => Some(lhs ^ rhs),
        other => unreachable!("{other} has no scalar form"),
    };
    result.ok_or(StepError::Halt(HaltKind::ArithmeticDomain))
}

fn axis_index(value: i64, dims: usize) -> Result<usize, StepError> {
    usize::try_from(value)
        .ok()
        .filter(|&axis| axis < dims)
        .ok_or(StepError::Trap(TrapKind::BadDirection))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_halts() {
        assert_eq!(
            apply_scalar(Opcode::Divi, 4, 0),
            Err(StepError::Halt(HaltKind::ArithmeticDomain))
        );
    }

    #[test]
    fn overflow_halts() {
        assert_eq!(
            apply_scalar(Opcode::Addi, i64::MAX, 1),
            Err(StepError::Halt(HaltKind::ArithmeticDomain))
        );
    }
}
