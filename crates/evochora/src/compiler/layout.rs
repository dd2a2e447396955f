//! The layout pass: assigns every emitted cell a coordinate and an address.
//!
//! Origin and direction are explicit pass-local state, mutated only by
//! `.ORG` and `.DIR`. Each instruction occupies its opcode cell plus operand
//! cells along the current direction; label operands get placeholder cells
//! and a patch record for the linker.

use indexmap::IndexMap;

use crate::{
    compiler::{
        ir::{IrItem, IrOperand},
        Reporter,
    },
    diag::DiagnosticKind,
    isa::Opcode,
    molecule::Molecule,
    source::SourceSpan,
    vector::Vector,
};

/// A placeholder left for the linker: `span` cells starting at `cell_index`
/// must be overwritten with the coordinate of `label`.
#[derive(Debug, Clone)]
pub struct Patch {
    pub cell_index: usize,
    pub label: String,
    pub span: SourceSpan,
}

/// Output of the layout pass.
#[derive(Debug)]
pub struct LayoutResult {
    pub cells: Vec<(Vector, Molecule)>,
    pub label_to_addr: IndexMap<String, usize>,
    pub linear_to_coord: Vec<Vector>,
    pub patches: Vec<Patch>,
    pub entry_point: Vector,
}

struct LayoutState {
    cursor: Vector,
    direction: Vector,
    cells: Vec<(Vector, Molecule)>,
    linear_to_coord: Vec<Vector>,
}

impl LayoutState {
    fn emit(&mut self, molecule: Molecule) {
        self.cells.push((self.cursor.clone(), molecule));
        self.linear_to_coord.push(self.cursor.clone());
        self.cursor = self.cursor.add(&self.direction);
    }
}

/// Lays out the IR, producing cells, address tables, and linker patches.
pub fn layout(items: &[IrItem], dims: usize, reporter: &mut Reporter<'_>) -> LayoutResult {
    let mut state = LayoutState {
        cursor: Vector::zero(dims),
        direction: Vector::unit(dims, 0, false),
        cells: Vec::new(),
        linear_to_coord: Vec::new(),
    };
    let mut label_to_addr = IndexMap::new();
    let mut patches = Vec::new();

    for item in items {
        match item {
            IrItem::Label { name, span } => {
                // A label binds to the next emitted cell's address.
                if label_to_addr.insert(name.clone(), state.cells.len()).is_some() {
                    reporter.error(DiagnosticKind::Layout, *span, format!("label `{name}` laid out twice"));
                }
            }
            IrItem::Org { vector, span } => {
                if vector.dims() == dims {
                    state.cursor = vector.clone();
                } else {
                    report_dims(reporter, *span, vector.dims(), dims);
                }
            }
            IrItem::Dir { vector, span } => {
                if vector.dims() != dims {
                    report_dims(reporter, *span, vector.dims(), dims);
                } else if vector.as_unit_axis().is_none() {
                    reporter.error(
                        DiagnosticKind::Layout,
                        *span,
                        "`.DIR` expects an axis-aligned unit vector",
                    );
                } else {
                    state.direction = vector.clone();
                }
            }
            IrItem::Place { molecule, offset, span } => {
                if offset.dims() == dims {
                    // Placed cells sit off the cursor path but still get a
                    // linear address so labels may refer past them.
                    state.cells.push((offset.clone(), *molecule));
                    state.linear_to_coord.push(offset.clone());
                } else {
                    report_dims(reporter, *span, offset.dims(), dims);
                }
            }
            IrItem::Instruction(instr) => {
                state.emit(Molecule::code(instr.opcode as i64));
                for operand in &instr.operands {
                    match operand {
                        IrOperand::Reg(n) => {
                            state.emit(Molecule::data(i64::from(*n)));
                        }
                        IrOperand::Imm(m) => {
                            state.emit(*m);
                        }
                        IrOperand::Vec(v) => {
                            if v.dims() != dims {
                                report_dims(reporter, instr.span, v.dims(), dims);
                            }
                            for axis in 0..dims {
                                let component = if axis < v.dims() { v.get(axis) } else { 0 };
                                state.emit(Molecule::data(component));
                            }
                        }
                        IrOperand::LabelRef(label) => {
                            let cell_index = state.cells.len();
                            for _ in 0..dims {
                                state.emit(Molecule::data(0));
                            }
                            patches.push(Patch {
                                cell_index,
                                label: label.clone(),
                                span: instr.span,
                            });
                        }
                    }
                }
                if instr.opcode == Opcode::Call {
                    state.emit(Molecule::data(instr.ref_actuals.len() as i64));
                    state.emit(Molecule::data(instr.val_actuals.len() as i64));
                    for reg in instr.ref_actuals.iter().chain(&instr.val_actuals) {
                        state.emit(Molecule::data(i64::from(*reg)));
                    }
                }
            }
        }
    }

    let entry_point = state
        .linear_to_coord
        .first()
        .cloned()
        .unwrap_or_else(|| Vector::zero(dims));
    LayoutResult {
        cells: state.cells,
        label_to_addr,
        linear_to_coord: state.linear_to_coord,
        patches,
        entry_point,
    }
}

fn report_dims(reporter: &mut Reporter<'_>, span: SourceSpan, got: usize, want: usize) {
    reporter.error(
        DiagnosticKind::Layout,
        span,
        format!("vector has {got} component(s), world dimensionality is {want}"),
    );
}
