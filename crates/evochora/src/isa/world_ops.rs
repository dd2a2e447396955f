//! World reads and writes: scanning, peeking, poking, movement, data pointers.
//!
//! These are the only instructions that may change an organism's energy:
//! absorbing an `ENERGY` molecule credits its payload, overwriting a foreign
//! cell debits the payload of what is destroyed.

use crate::{
    isa::{molecule_of, ExecContext, Instruction, Opcode, Outcome},
    molecule::{Molecule, MoleculeTag, RegValue},
    organism::{Organism, StepError, TrapKind},
    registers::RegisterRef,
    vector::Vector,
    world::World,
};

pub(crate) fn execute(
    org: &mut Organism,
    instr: &Instruction,
    ctx: &mut ExecContext<'_>,
) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Scan => {
            let coord = ctx.world.wrap(&org.ip.add(instr.vec(1)));
            let molecule = ctx.world.get(&coord);
            org.write_reg(instr.reg(0), RegValue::Molecule(molecule))?;
        }
        Opcode::Peek => {
            let coord = ctx.world.wrap(&org.ip.add(instr.vec(1)));
            peek(org, ctx.world, &coord, instr.reg(0))?;
        }
        Opcode::Poke => {
            let value = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let coord = ctx.world.wrap(&org.ip.add(instr.vec(1)));
            poke(org, ctx.world, &coord, value)?;
        }
        Opcode::Poki => {
            let coord = ctx.world.wrap(&org.ip.add(instr.vec(1)));
            poke(org, ctx.world, &coord, instr.imm(0))?;
        }
        Opcode::Seek => {
            let target = ctx.world.wrap(&org.ip.add(instr.vec(0)));
            if !ctx.world.is_passable(&target, org.id) {
                return Err(StepError::Trap(TrapKind::Blocked));
            }
            org.write_ip(target);
        }
        Opcode::Sdpa => {
            let index = usize::try_from(instr.imm(0).value)
                .ok()
                .filter(|&i| i < org.dps.len())
                .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
            org.active_dp = index;
        }
        Opcode::Sync => {
            let ip = org.ip.clone();
            *org.dp_mut() = ip;
        }
        Opcode::Skdp => {
            // Data pointers are not writes; they move without passability checks.
            let moved = ctx.world.wrap(&org.dp().add(instr.vec(0)));
            *org.dp_mut() = moved;
        }
        Opcode::Pekd => {
            let coord = org.dp().clone();
            peek(org, ctx.world, &coord, instr.reg(0))?;
        }
        Opcode::Pokd => {
            let value = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let coord = org.dp().clone();
            poke(org, ctx.world, &coord, value)?;
        }
        other => unreachable!("{other} is not a world opcode"),
    }
    Ok(Outcome::Ok)
}

/// Reads and clears a cell. Only passable cells may be taken; an absorbed
/// `ENERGY` molecule credits the organism's energy.
fn peek(org: &mut Organism, world: &mut World, coord: &Vector, dest: RegisterRef) -> Result<(), StepError> {
    if !world.is_passable(coord, org.id) {
        return Err(StepError::Trap(TrapKind::Blocked));
    }
    let molecule = world.get(coord);
    org.write_reg(dest, RegValue::Molecule(molecule))?;
    if molecule.tag == MoleculeTag::Energy && molecule.value > 0 {
        org.energy = org.energy.saturating_add(molecule.value as u64);
    }
    world.set(coord, Molecule::EMPTY, org.id);
    Ok(())
}

/// Writes a cell. Passable cells are free; overwriting a foreign cell costs
/// energy equal to the destroyed payload and fails without it, leaving the
/// cell untouched.
fn poke(org: &mut Organism, world: &mut World, coord: &Vector, value: Molecule) -> Result<(), StepError> {
    if !world.is_passable(coord, org.id) {
        let occupant = world.get(coord);
        let cost = occupant.value.unsigned_abs();
        if org.energy < cost {
            return Err(StepError::Trap(TrapKind::InsufficientEnergy));
        }
        org.energy -= cost;
    }
    world.set(coord, value, org.id);
    Ok(())
}
