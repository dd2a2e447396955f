//! The data stack, the location stack, and location registers.
//!
//! All stacks share one configured depth bound; overflow is a trap or a halt
//! per configuration, underflow is always a trap.

use crate::{
    isa::{Instruction, Opcode, Outcome},
    organism::{Organism, StepError, TrapKind},
};

pub(crate) fn execute(org: &mut Organism, instr: &Instruction) -> Result<Outcome, StepError> {
    match instr.opcode {
        Opcode::Push => {
            let value = org.read_reg(instr.reg(0))?;
            if org.data_stack.len() >= org.stack_limit() {
                return Err(org.overflow_error());
            }
            org.data_stack.push(value);
        }
        Opcode::Pop => {
            let value = org
                .data_stack
                .pop()
                .ok_or(StepError::Trap(TrapKind::StackUnderflow))?;
            org.write_reg(instr.reg(0), value)?;
        }
        Opcode::Dups => {
            let top = org
                .data_stack
                .last()
                .cloned()
                .ok_or(StepError::Trap(TrapKind::StackUnderflow))?;
            if org.data_stack.len() >= org.stack_limit() {
                return Err(org.overflow_error());
            }
            org.data_stack.push(top);
        }
        Opcode::Swps => {
            let len = org.data_stack.len();
            if len < 2 {
                return Err(StepError::Trap(TrapKind::StackUnderflow));
            }
            org.data_stack.swap(len - 1, len - 2);
        }
        Opcode::Drps => {
            org.data_stack
                .pop()
                .ok_or(StepError::Trap(TrapKind::StackUnderflow))?;
        }
        Opcode::Pusl => {
            let location = org.loc_regs.get(location_index(org, instr)?).cloned();
            let location = location.ok_or(StepError::Trap(TrapKind::RegisterRange))?;
            if org.location_stack.len() >= org.stack_limit() {
                return Err(org.overflow_error());
            }
            org.location_stack.push(location);
        }
        Opcode::Popl => {
            let index = location_index(org, instr)?;
            let location = org
                .location_stack
                .pop()
                .ok_or(StepError::Trap(TrapKind::StackUnderflow))?;
            org.loc_regs[index] = location;
        }
        Opcode::Slrd => {
            let index = location_index(org, instr)?;
            org.loc_regs[index] = org.dp().clone();
        }
        Opcode::Sdrl => {
            let index = location_index(org, instr)?;
            let location = org.loc_regs[index].clone();
            *org.dp_mut() = location;
        }
        other => unreachable!("{other} is not a stack opcode"),
    }
    Ok(Outcome::Ok)
}

/// The location-register index operand, bounds-checked.
fn location_index(org: &Organism, instr: &Instruction) -> Result<usize, StepError> {
    usize::try_from(instr.imm(0).value)
        .ok()
        .filter(|&i| i < org.loc_regs.len())
        .ok_or(StepError::Trap(TrapKind::RegisterRange))
}
