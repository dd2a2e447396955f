//! Neighborhood scans, seeded random choice, and reproduction.

use crate::{
    isa::{molecule_of, vector_of, ExecContext, Instruction, Opcode, Outcome},
    molecule::{Molecule, RegValue},
    organism::{Organism, SpawnRequest, StepError, TrapKind},
    world::World,
};

pub(crate) fn execute(
    org: &mut Organism,
    instr: &Instruction,
    ctx: &mut ExecContext<'_>,
) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Snti => {
            // Bitmask of neighbor directions whose molecule tag matches the
            // immediate's tag; bit order follows `World::directions`.
            let wanted = instr.imm(1).tag;
            let mut mask = 0i64;
            for (bit, (_, coord)) in ctx.world.neighbors(&org.ip).into_iter().enumerate() {
                if ctx.world.get(&coord).tag == wanted {
                    mask |= 1 << bit;
                }
            }
            org.write_reg(instr.reg(0), RegValue::Molecule(Molecule::data(mask)))?;
        }
        Opcode::Rbir => {
            let mask = molecule_of(&org.read_reg(instr.reg(1))?)?;
            if mask.value < 0 {
                return Err(StepError::Trap(TrapKind::TypeMismatch));
            }
            let choice = ctx
                .rng
                .choose_set_bit(mask.value as u64)
                .map_or(-1, i64::from);
            org.write_reg(instr.reg(0), RegValue::Molecule(Molecule::data(choice)))?;
        }
        Opcode::Rndi => {
            let bound = instr.imm(1).value;
            if bound <= 0 {
                return Err(StepError::Trap(TrapKind::TypeMismatch));
            }
            let value = ctx.rng.below(bound as u64) as i64;
            org.write_reg(instr.reg(0), RegValue::Molecule(Molecule::data(value)))?;
        }
        Opcode::Fork => fork(org, instr, ctx.world, ctx.spawned)?,
        other => unreachable!("{other} is not a scan opcode"),
    }
    Ok(Outcome::Ok)
}

/// `FORK energy-reg entry-reg`: spend energy to spawn a child at a
/// program-frame coordinate. The child shares the parent's program and
/// origin, inherits its direction, and first acts next tick.
fn fork(
    org: &mut Organism,
    instr: &Instruction,
    world: &World,
    spawned: &mut Vec<SpawnRequest>,
) -> Result<(), StepError> {
    let endowment = molecule_of(&org.read_reg(instr.reg(0))?)?;
    if endowment.value <= 0 {
        return Err(StepError::Trap(TrapKind::TypeMismatch));
    }
    let energy = endowment.value as u64;
    if energy > org.energy {
        return Err(StepError::Trap(TrapKind::InsufficientEnergy));
    }
    let entry = vector_of(&org.read_reg(instr.reg(1))?)?;
    if entry.dims() != world.dims() {
        return Err(StepError::Trap(TrapKind::TypeMismatch));
    }
    org.energy -= energy;
    spawned.push(SpawnRequest {
        parent_id: org.id,
        program_id: org.program_id,
        origin: org.origin.clone(),
        ip: world.wrap(&org.origin.add(&entry)),
        dv: org.dv.clone(),
        energy,
    });
    Ok(())
}
