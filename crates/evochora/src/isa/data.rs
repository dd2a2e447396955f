//! Register moves and bitmask/vector conversion.

use crate::{
    isa::{molecule_of, vector_of, Instruction, Opcode, Outcome},
    molecule::{Molecule, RegValue},
    organism::{Organism, StepError, TrapKind},
    vector::Vector,
};

pub(crate) fn execute(org: &mut Organism, instr: &Instruction) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Seti => {
            org.write_reg(instr.reg(0), RegValue::Molecule(instr.imm(1)))?;
        }
        Opcode::Setr => {
            let value = org.read_reg(instr.reg(1))?;
            org.write_reg(instr.reg(0), value)?;
        }
        Opcode::Setv => {
            org.write_reg(instr.reg(0), RegValue::Vector(instr.vec(1).clone()))?;
        }
        Opcode::B2vr => {
            let mask = molecule_of(&org.read_reg(instr.reg(1))?)?;
            let dims = org.ip().dims();
            let vector = mask_to_vector(mask.value, dims)?;
            org.write_reg(instr.reg(0), RegValue::Vector(vector))?;
        }
        Opcode::V2br => {
            let vector = vector_of(&org.read_reg(instr.reg(1))?)?;
            let (axis, negative) = vector
                .as_unit_axis()
                .ok_or(StepError::Trap(TrapKind::BadDirection))?;
            let bit = axis * 2 + usize::from(negative);
            org.write_reg(instr.reg(0), RegValue::Molecule(Molecule::data(1 << bit)))?;
        }
        other => unreachable!("{other} is not a data opcode"),
    }
    Ok(Outcome::Ok)
}

/// Converts a direction bitmask to the unit vector of its lowest set bit.
///
/// Bit `2k` is `+axis k`, bit `2k+1` is `-axis k`, matching the neighbor
/// ordering of [`crate::world::World::directions`].
fn mask_to_vector(mask: i64, dims: usize) -> Result<Vector, StepError> {
    if mask <= 0 {
        return Err(StepError::Trap(TrapKind::BadDirection));
    }
    let bit = mask.trailing_zeros() as usize;
    if bit >= dims * 2 {
        return Err(StepError::Trap(TrapKind::BadDirection));
    }
    Ok(Vector::unit(dims, bit / 2, bit % 2 == 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_round_trips_through_vector() {
        for bit in 0..4 {
            let vector = mask_to_vector(1 << bit, 2).unwrap();
            let (axis, negative) = vector.as_unit_axis().unwrap();
            assert_eq!(axis * 2 + usize::from(negative), bit);
        }
    }

    #[test]
    fn empty_mask_is_a_bad_direction() {
        assert_eq!(
            mask_to_vector(0, 2),
            Err(StepError::Trap(TrapKind::BadDirection))
        );
    }
}
