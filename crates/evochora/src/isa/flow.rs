//! Conditionals, jumps, procedure calls, and direction changes.

use crate::{
    isa::{molecule_of, vector_of, ExecContext, Instruction, Opcode, Outcome},
    organism::{FprBinding, HaltKind, Organism, StepError, TrapKind},
};

/// Comparison opcodes: predicate true means the next instruction runs,
/// false means it is skipped whole.
pub(crate) fn execute_predicate(org: &mut Organism, instr: &Instruction) -> Result<Outcome, StepError> {
    let truth = match instr.opcode {
        Opcode::Ifr => {
            let lhs = org.read_reg(instr.reg(0))?;
            let rhs = org.read_reg(instr.reg(1))?;
            lhs == rhs
        }
        Opcode::Ifi => {
            let lhs = molecule_of(&org.read_reg(instr.reg(0))?)?;
            lhs == instr.imm(1)
        }
        Opcode::Iftr => {
            let lhs = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let rhs = molecule_of(&org.read_reg(instr.reg(1))?)?;
            lhs.tag == rhs.tag
        }
        Opcode::Gtr | Opcode::Ltr => {
            let lhs = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let rhs = molecule_of(&org.read_reg(instr.reg(1))?)?;
            if lhs.tag != rhs.tag {
                return Err(StepError::Trap(TrapKind::TypeMismatch));
            }
            if instr.opcode == Opcode::Gtr {
                lhs.value > rhs.value
            } else {
                lhs.value < rhs.value
            }
        }
        Opcode::Gti | Opcode::Lti => {
            let lhs = molecule_of(&org.read_reg(instr.reg(0))?)?;
            let rhs = instr.imm(1);
            if lhs.tag != rhs.tag {
                return Err(StepError::Trap(TrapKind::TypeMismatch));
            }
            if instr.opcode == Opcode::Gti {
                lhs.value > rhs.value
            } else {
                lhs.value < rhs.value
            }
        }
        other => unreachable!("{other} is not a predicate opcode"),
    };
    Ok(if truth { Outcome::Ok } else { Outcome::SkipNext })
}

pub(crate) fn execute(
    org: &mut Organism,
    instr: &Instruction,
    ctx: &mut ExecContext<'_>,
) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Jmpi => {
            let target = ctx.world.wrap(&org.origin.add(instr.vec(0)));
            org.write_ip(target);
        }
        Opcode::Jmpr => {
            let offset = vector_of(&org.read_reg(instr.reg(0))?)?;
            if offset.dims() != ctx.world.dims() {
                return Err(StepError::Trap(TrapKind::TypeMismatch));
            }
            let target = ctx.world.wrap(&org.origin.add(&offset));
            org.write_ip(target);
        }
        Opcode::Call => call(org, instr, ctx)?,
        Opcode::Ret => {
            let return_ip = org.pop_call_frame()?;
            org.write_ip(return_ip);
        }
        Opcode::Hlt => return Err(StepError::Halt(HaltKind::Explicit)),
        Opcode::Trni => {
            let vector = instr.vec(0);
            if vector.as_unit_axis().is_none() {
                return Err(StepError::Trap(TrapKind::BadDirection));
            }
            org.dv = vector.clone();
        }
        Opcode::Trnr => {
            let vector = vector_of(&org.read_reg(instr.reg(0))?)?;
            if vector.dims() != ctx.world.dims() || vector.as_unit_axis().is_none() {
                return Err(StepError::Trap(TrapKind::BadDirection));
            }
            org.dv = vector;
        }
        other => unreachable!("{other} is not a control-flow opcode"),
    }
    Ok(Outcome::Ok)
}

/// `CALL`: push the return frame, bind actuals, jump to the entry.
///
/// REF actuals bind by register identity (resolved now, so chained REFs land
/// on the ultimate target); VAL actuals are copied into the frame. `PR*` and
/// `LR*` are shadowed by the frame and restored on `RET`.
fn call(org: &mut Organism, instr: &Instruction, ctx: &mut ExecContext<'_>) -> Result<(), StepError> {
    let return_ip = ctx
        .world
        .wrap(&org.ip.add(&org.dv.scaled(instr.cell_len as i64)));

    let mut bindings = Vec::with_capacity(instr.actuals.len());
    for (index, actual) in instr.actuals.iter().enumerate() {
        if index < instr.ref_count {
            bindings.push(FprBinding::Ref(org.resolve_target(*actual)?));
        } else {
            bindings.push(FprBinding::Val(org.read_reg(*actual)?));
        }
    }

    org.push_call_frame(return_ip, bindings)?;
    let entry = ctx.world.wrap(&org.origin.add(instr.vec(0)));
    org.write_ip(entry);
    Ok(())
}
