//! The linker: rewrites label references into coordinates and validates
//! call sites against procedure signatures.

use indexmap::IndexMap;

use crate::{
    artifact::ProgramArtifact,
    compiler::{
        ir::{IrItem, IrOperand},
        layout::LayoutResult,
        symbols::{SymbolKind, SymbolTable},
        Reporter,
    },
    diag::DiagnosticKind,
    isa::Opcode,
    molecule::Molecule,
};

/// Linked output: the finished artifact plus the rewritten IR.
#[derive(Debug)]
pub struct Linked {
    pub artifact: ProgramArtifact,
    pub ir: Vec<IrItem>,
}

/// Applies layout patches, rewrites IR label refs, and emits the artifact.
pub fn link(
    layout: LayoutResult,
    mut ir: Vec<IrItem>,
    symbols: &SymbolTable,
    dims: usize,
    reporter: &mut Reporter<'_>,
) -> Linked {
    let LayoutResult {
        mut cells,
        label_to_addr,
        linear_to_coord,
        patches,
        entry_point,
    } = layout;

    // Patch the placeholder cells left for every label operand.
    for patch in &patches {
        let Some(&addr) = label_to_addr.get(&patch.label) else {
            reporter.error(
                DiagnosticKind::Link,
                patch.span,
                format!("label `{}` has no target", patch.label),
            );
            continue;
        };
        let Some(coord) = linear_to_coord.get(addr) else {
            reporter.error(
                DiagnosticKind::Link,
                patch.span,
                format!("label `{}` points past the end of the program", patch.label),
            );
            continue;
        };
        for axis in 0..dims {
            cells[patch.cell_index + axis].1 = Molecule::data(coord.get(axis));
        }
    }

    // Rewrite the IR to match and validate call arity; after this pass a
    // surviving `LabelRef` operand is a linker bug.
    for item in &mut ir {
        let IrItem::Instruction(instr) = item else { continue };
        if instr.opcode == Opcode::Call {
            if let Some(IrOperand::LabelRef(name)) = instr.operands.first() {
                check_call_arity(name.clone(), instr, symbols, reporter);
            }
        }
        for operand in &mut instr.operands {
            let IrOperand::LabelRef(name) = operand else { continue };
            match label_to_addr.get(name.as_str()).and_then(|addr| linear_to_coord.get(*addr)) {
                Some(coord) => *operand = IrOperand::Vec(coord.clone()),
                // Already reported through the cell patch above.
                None => {}
            }
        }
    }

    let proc_signatures: IndexMap<_, _> = symbols.procedures().into_iter().collect();
    Linked {
        artifact: ProgramArtifact {
            dimensions: dims,
            cells,
            label_to_addr,
            linear_to_coord,
            proc_signatures,
            entry_point,
        },
        ir,
    }
}

fn check_call_arity(
    name: String,
    instr: &crate::compiler::ir::IrInstruction,
    symbols: &SymbolTable,
    reporter: &mut Reporter<'_>,
) {
    // The target name was canonicalized by the semantic pass, so a direct
    // table lookup finds the callee.
    let Some(symbol) = symbols.get(&name) else {
        return;
    };
    match &symbol.kind {
        SymbolKind::Procedure(sig) => {
            if instr.ref_actuals.len() != sig.ref_params.len() || instr.val_actuals.len() != sig.val_params.len() {
                reporter.error(
                    DiagnosticKind::Link,
                    instr.span,
                    format!(
                        "`CALL {name}` passes {} REF / {} VAL actuals, procedure declares {} / {}",
                        instr.ref_actuals.len(),
                        instr.val_actuals.len(),
                        sig.ref_params.len(),
                        sig.val_params.len()
                    ),
                );
            }
        }
        SymbolKind::Label => {
            if !instr.ref_actuals.is_empty() || !instr.val_actuals.is_empty() {
                reporter.error(
                    DiagnosticKind::Link,
                    instr.span,
                    format!("`CALL {name}` passes actuals, but the target is a plain label"),
                );
            }
        }
        _ => {}
    }
}
