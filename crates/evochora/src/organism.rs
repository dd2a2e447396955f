//! A running execution context: registers, stacks, and the step state machine.

use crate::{
    config::{OrganismConfig, OverflowPolicy, StackConfig},
    isa::{self, ExecContext, Outcome},
    molecule::RegValue,
    registers::RegisterRef,
    rng::TickRng,
    vector::Vector,
    world::World,
};

/// Recoverable instruction failures; each sets one bit in `er`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum TrapKind {
    TypeMismatch,
    RegisterRange,
    StackUnderflow,
    StackOverflow,
    InsufficientEnergy,
    /// A move or write was blocked by a foreign cell.
    Blocked,
    /// A direction argument was not an axis-aligned unit vector.
    BadDirection,
}

impl TrapKind {
    /// The `er` bit this trap sets.
    #[must_use]
    pub fn bit(self) -> u64 {
        1 << (self as u64)
    }
}

/// Fatal instruction failures; the organism is removed at the sweep end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum HaltKind {
    /// The fetched cell was not executable code.
    InvalidInstruction,
    EnergyExhausted,
    StackOverflow,
    ArithmeticDomain,
    /// `HLT`.
    Explicit,
}

/// Error type of instruction handlers: trap and continue, or halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    Trap(TrapKind),
    Halt(HaltKind),
}

/// Result of one scheduler-driven step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    Halted(HaltKind),
}

/// A resolved write target for a REF parameter binding.
///
/// REF actuals are resolved at call time, so a REF chained through a caller's
/// own formal parameter lands on the ultimate register (or the caller's VAL
/// slot) rather than re-resolving in the callee's frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RegTarget {
    Data(u16),
    Proc(u16),
    Location(u16),
    /// A VAL slot of an outer formal-parameter frame.
    FrameVal { frame: usize, slot: usize },
}

/// One formal-parameter binding of a call frame.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FprBinding {
    /// Pass-by-register-alias: reads and writes go to the target.
    Ref(RegTarget),
    /// Pass-by-value: a fresh local binding.
    Val(RegValue),
}

/// One `CALL` frame: where to return, and the shadowed register files.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallFrame {
    pub return_ip: Vector,
    saved_proc_regs: Vec<RegValue>,
    saved_loc_regs: Vec<Vector>,
}

/// A child organism requested by `FORK`, spawned by the scheduler next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub parent_id: u64,
    pub program_id: u64,
    pub origin: Vector,
    pub ip: Vector,
    pub dv: Vector,
    pub energy: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Organism {
    pub(crate) id: u64,
    pub(crate) parent_id: Option<u64>,
    pub(crate) program_id: u64,
    pub(crate) birth_tick: u64,
    pub(crate) energy: u64,
    /// Placement origin: program-frame coordinates are offsets from here.
    pub(crate) origin: Vector,
    pub(crate) ip: Vector,
    pub(crate) dv: Vector,
    pub(crate) dps: Vec<Vector>,
    pub(crate) active_dp: usize,
    pub(crate) data_regs: Vec<RegValue>,
    pub(crate) proc_regs: Vec<RegValue>,
    pub(crate) loc_regs: Vec<Vector>,
    pub(crate) data_stack: Vec<RegValue>,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) location_stack: Vec<Vector>,
    pub(crate) formal_parameters: Vec<Vec<FprBinding>>,
    /// Trap bit-set; sticky across instructions.
    pub(crate) er: u64,
    /// Return coordinate of the innermost call frame.
    pub(crate) return_ip: Vector,
    pub(crate) last_trap: Option<TrapKind>,
    pub(crate) halted: Option<HaltKind>,
    stack_limit: usize,
    overflow_halts: bool,
    /// Set by instructions that write `ip`; suppresses the advance.
    #[serde(skip)]
    ip_written: bool,
}

impl Organism {
    #[must_use]
    pub fn new(
        id: u64,
        parent_id: Option<u64>,
        program_id: u64,
        birth_tick: u64,
        origin: Vector,
        ip: Vector,
        dv: Vector,
        energy: u64,
        organism_config: &OrganismConfig,
        stack_config: &StackConfig,
    ) -> Self {
        let dims = origin.dims();
        Self {
            id,
            parent_id,
            program_id,
            birth_tick,
            energy,
            return_ip: ip.clone(),
            origin,
            ip,
            dv,
            dps: vec![Vector::zero(dims); organism_config.data_pointers],
            active_dp: 0,
            data_regs: vec![RegValue::default(); organism_config.data_registers],
            proc_regs: vec![RegValue::default(); organism_config.proc_registers],
            loc_regs: vec![Vector::zero(dims); organism_config.location_registers],
            data_stack: Vec::new(),
            call_stack: Vec::new(),
            location_stack: Vec::new(),
            formal_parameters: Vec::new(),
            er: 0,
            last_trap: None,
            halted: None,
            stack_limit: stack_config.max_depth,
            overflow_halts: stack_config.on_overflow == OverflowPolicy::Halt,
            ip_written: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn energy(&self) -> u64 {
        self.energy
    }

    #[must_use]
    pub fn ip(&self) -> &Vector {
        &self.ip
    }

    #[must_use]
    pub fn er(&self) -> u64 {
        self.er
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Runs exactly one instruction: fetch, decode, execute, advance.
    pub fn step(&mut self, world: &mut World, rng: &mut TickRng, spawned: &mut Vec<SpawnRequest>) -> StepOutcome {
        let instr = match isa::decode(world, &self.ip, &self.dv) {
            Ok(instr) => instr,
            Err(_) => return self.halt(HaltKind::InvalidInstruction),
        };

        self.ip_written = false;
        let outcome = {
            let mut ctx = ExecContext {
                world: &mut *world,
                rng: &mut *rng,
                spawned: &mut *spawned,
            };
            match isa::execute(self, &instr, &mut ctx) {
                Ok(outcome) => outcome,
                Err(StepError::Trap(kind)) => {
                    self.record_trap(kind);
                    Outcome::Ok
                }
                Err(StepError::Halt(kind)) => return self.halt(kind),
            }
        };

        if !self.ip_written {
            self.ip = world.wrap(&self.ip.add(&self.dv.scaled(instr.cell_len as i64)));
        }
        if outcome == Outcome::SkipNext {
            // Skip one whole instruction, operands included.
            match isa::decode(world, &self.ip, &self.dv) {
                Ok(next) => {
                    self.ip = world.wrap(&self.ip.add(&self.dv.scaled(next.cell_len as i64)));
                }
                Err(_) => return self.halt(HaltKind::InvalidInstruction),
            }
        }

        if self.energy == 0 {
            return self.halt(HaltKind::EnergyExhausted);
        }
        StepOutcome::Running
    }

    fn halt(&mut self, kind: HaltKind) -> StepOutcome {
        self.halted = Some(kind);
        StepOutcome::Halted(kind)
    }

    pub(crate) fn record_trap(&mut self, kind: TrapKind) {
        self.er |= kind.bit();
        self.last_trap = Some(kind);
    }

    /// Sets `ip` from an instruction, suppressing the automatic advance.
    pub(crate) fn write_ip(&mut self, ip: Vector) {
        self.ip = ip;
        self.ip_written = true;
    }

    /// The error to raise when any stack would exceed its bound.
    pub(crate) fn overflow_error(&self) -> StepError {
        if self.overflow_halts {
            StepError::Halt(HaltKind::StackOverflow)
        } else {
            StepError::Trap(TrapKind::StackOverflow)
        }
    }

    #[must_use]
    pub(crate) fn stack_limit(&self) -> usize {
        self.stack_limit
    }

    /// Reads a register, following REF bindings through formal parameters.
    pub(crate) fn read_reg(&self, reg: RegisterRef) -> Result<RegValue, StepError> {
        match reg {
            RegisterRef::Data(n) => self
                .data_regs
                .get(usize::from(n))
                .cloned()
                .ok_or(StepError::Trap(TrapKind::RegisterRange)),
            RegisterRef::Proc(n) => self
                .proc_regs
                .get(usize::from(n))
                .cloned()
                .ok_or(StepError::Trap(TrapKind::RegisterRange)),
            RegisterRef::Location(n) => self
                .loc_regs
                .get(usize::from(n))
                .cloned()
                .map(RegValue::Vector)
                .ok_or(StepError::Trap(TrapKind::RegisterRange)),
            RegisterRef::Formal(n) => {
                let frame = self
                    .formal_parameters
                    .last()
                    .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
                match frame.get(usize::from(n)) {
                    Some(FprBinding::Val(value)) => Ok(value.clone()),
                    Some(FprBinding::Ref(target)) => self.read_target(target),
                    None => Err(StepError::Trap(TrapKind::RegisterRange)),
                }
            }
        }
    }

    fn read_target(&self, target: &RegTarget) -> Result<RegValue, StepError> {
        match target {
            RegTarget::Data(n) => self.read_reg(RegisterRef::Data(*n)),
            RegTarget::Proc(n) => self.read_reg(RegisterRef::Proc(*n)),
            RegTarget::Location(n) => self.read_reg(RegisterRef::Location(*n)),
            RegTarget::FrameVal { frame, slot } => match self
                .formal_parameters
                .get(*frame)
                .and_then(|f| f.get(*slot))
            {
                Some(FprBinding::Val(value)) => Ok(value.clone()),
                _ => Err(StepError::Trap(TrapKind::RegisterRange)),
            },
        }
    }

    /// Writes a register; writes through REF bindings hit the bound target.
    pub(crate) fn write_reg(&mut self, reg: RegisterRef, value: RegValue) -> Result<(), StepError> {
        match reg {
            RegisterRef::Data(n) => {
                let slot = self
                    .data_regs
                    .get_mut(usize::from(n))
                    .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
                *slot = value;
                Ok(())
            }
            RegisterRef::Proc(n) => {
                let slot = self
                    .proc_regs
                    .get_mut(usize::from(n))
                    .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
                *slot = value;
                Ok(())
            }
            RegisterRef::Location(n) => {
                let RegValue::Vector(vector) = value else {
                    return Err(StepError::Trap(TrapKind::TypeMismatch));
                };
                let slot = self
                    .loc_regs
                    .get_mut(usize::from(n))
                    .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
                *slot = vector;
                Ok(())
            }
            RegisterRef::Formal(n) => {
                let frame = self
                    .formal_parameters
                    .last()
                    .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
                match frame.get(usize::from(n)) {
                    Some(FprBinding::Val(_)) => {
                        let top = self.formal_parameters.len() - 1;
                        self.formal_parameters[top][usize::from(n)] = FprBinding::Val(value);
                        Ok(())
                    }
                    Some(FprBinding::Ref(target)) => {
                        let target = target.clone();
                        self.write_target(&target, value)
                    }
                    None => Err(StepError::Trap(TrapKind::RegisterRange)),
                }
            }
        }
    }

    fn write_target(&mut self, target: &RegTarget, value: RegValue) -> Result<(), StepError> {
        match target {
            RegTarget::Data(n) => self.write_reg(RegisterRef::Data(*n), value),
            RegTarget::Proc(n) => self.write_reg(RegisterRef::Proc(*n), value),
            RegTarget::Location(n) => self.write_reg(RegisterRef::Location(*n), value),
            RegTarget::FrameVal { frame, slot } => {
                match self.formal_parameters.get_mut(*frame).and_then(|f| f.get_mut(*slot)) {
                    Some(binding @ FprBinding::Val(_)) => {
                        *binding = FprBinding::Val(value);
                        Ok(())
                    }
                    _ => Err(StepError::Trap(TrapKind::RegisterRange)),
                }
            }
        }
    }

    /// Resolves a REF actual to its ultimate target at call time.
    pub(crate) fn resolve_target(&self, reg: RegisterRef) -> Result<RegTarget, StepError> {
        match reg {
            RegisterRef::Data(n) if usize::from(n) < self.data_regs.len() => Ok(RegTarget::Data(n)),
            RegisterRef::Proc(n) if usize::from(n) < self.proc_regs.len() => Ok(RegTarget::Proc(n)),
            RegisterRef::Location(n) if usize::from(n) < self.loc_regs.len() => Ok(RegTarget::Location(n)),
            RegisterRef::Formal(n) => {
                let top = self
                    .formal_parameters
                    .len()
                    .checked_sub(1)
                    .ok_or(StepError::Trap(TrapKind::RegisterRange))?;
                match self.formal_parameters[top].get(usize::from(n)) {
                    Some(FprBinding::Ref(target)) => Ok(target.clone()),
                    Some(FprBinding::Val(_)) => Ok(RegTarget::FrameVal {
                        frame: top,
                        slot: usize::from(n),
                    }),
                    None => Err(StepError::Trap(TrapKind::RegisterRange)),
                }
            }
            _ => Err(StepError::Trap(TrapKind::RegisterRange)),
        }
    }

    /// Pushes a call frame, shadowing `PR*` and `LR*`.
    pub(crate) fn push_call_frame(&mut self, return_ip: Vector, bindings: Vec<FprBinding>) -> Result<(), StepError> {
        if self.call_stack.len() >= self.stack_limit {
            return Err(self.overflow_error());
        }
        self.call_stack.push(CallFrame {
            return_ip: return_ip.clone(),
            saved_proc_regs: self.proc_regs.clone(),
            saved_loc_regs: self.loc_regs.clone(),
        });
        self.formal_parameters.push(bindings);
        self.return_ip = return_ip;
        Ok(())
    }

    /// Pops the innermost call frame, restoring `PR*` and `LR*`.
    pub(crate) fn pop_call_frame(&mut self) -> Result<Vector, StepError> {
        let frame = self
            .call_stack
            .pop()
            .ok_or(StepError::Trap(TrapKind::StackUnderflow))?;
        self.formal_parameters.pop();
        self.proc_regs = frame.saved_proc_regs;
        self.loc_regs = frame.saved_loc_regs;
        self.return_ip = self
            .call_stack
            .last()
            .map_or_else(|| frame.return_ip.clone(), |outer| outer.return_ip.clone());
        Ok(frame.return_ip)
    }

    /// The active data pointer.
    pub(crate) fn dp(&self) -> &Vector {
        &self.dps[self.active_dp]
    }

    pub(crate) fn dp_mut(&mut self) -> &mut Vector {
        &mut self.dps[self.active_dp]
    }
}
