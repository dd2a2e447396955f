//! Lowers the resolved AST into the linear IR.
//!
//! By the time this pass runs, the semantic post-processor has replaced every
//! identifier that names an alias or constant; the identifiers that remain
//! name labels or procedures and become `LabelRef` operands. Operand shapes
//! are checked here against each opcode's declared signature.

use crate::{
    compiler::{
        ast::AstNode,
        ir::{IrInstruction, IrItem, IrOperand},
        Reporter,
    },
    diag::DiagnosticKind,
    isa::{Opcode, OperandKind},
    molecule::MoleculeTag,
    source::SourceSpan,
    vector::Vector,
};

/// Lowers a program AST into IR items, in source order.
pub fn lower(program: &AstNode, reporter: &mut Reporter<'_>) -> Vec<IrItem> {
    let mut items = Vec::new();
    let mut path = Vec::new();
    lower_node(program, &mut path, &mut items, reporter);
    items
}

fn canonical(path: &[String], name: &str) -> String {
    if path.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{name}", path.join("."))
    }
}

fn lower_node(node: &AstNode, path: &mut Vec<String>, items: &mut Vec<IrItem>, reporter: &mut Reporter<'_>) {
    match node {
        AstNode::Program { body } => {
            for child in body {
                lower_node(child, path, items, reporter);
            }
        }
        AstNode::Scope { name, body, .. } => {
            path.push(name.clone());
            for child in body {
                lower_node(child, path, items, reporter);
            }
            path.pop();
        }
        AstNode::Proc { name, body, span, .. } => {
            // The procedure entry is a label on its first body cell.
            items.push(IrItem::Label {
                name: canonical(path, name),
                span: *span,
            });
            path.push(name.clone());
            for child in body {
                lower_node(child, path, items, reporter);
            }
            path.pop();
        }
        AstNode::Label { name, span } => items.push(IrItem::Label {
            name: canonical(path, name),
            span: *span,
        }),
        AstNode::Org { vector, span } => items.push(IrItem::Org {
            vector: vector.clone(),
            span: *span,
        }),
        AstNode::Dir { vector, span } => items.push(IrItem::Dir {
            vector: vector.clone(),
            span: *span,
        }),
        AstNode::Place { molecule, offset, span } => items.push(IrItem::Place {
            molecule: *molecule,
            offset: offset.clone(),
            span: *span,
        }),
        AstNode::Instruction { opcode, args, span } => {
            if let Some(operands) = lower_operands(*opcode, args, *span, reporter) {
                items.push(IrItem::Instruction(IrInstruction {
                    opcode: *opcode,
                    operands,
                    ref_actuals: Vec::new(),
                    val_actuals: Vec::new(),
                    span: *span,
                }));
            }
        }
        AstNode::Call {
            target,
            ref_actuals,
            val_actuals,
            span,
        } => {
            let Some(target_op) = lower_operand(target, OperandKind::Vec, reporter) else {
                return;
            };
            let mut refs = Vec::with_capacity(ref_actuals.len());
            let mut vals = Vec::with_capacity(val_actuals.len());
            for (list, args) in [(&mut refs, ref_actuals), (&mut vals, val_actuals)] {
                for arg in args {
                    match arg {
                        AstNode::Register { reg, .. } => list.push(
                            u16::try_from(reg.encode()).expect("register encoding fits u16"),
                        ),
                        other => {
                            reporter.error(
                                DiagnosticKind::Semantic,
                                other.span(),
                                "call actuals must be registers",
                            );
                            return;
                        }
                    }
                }
            }
            items.push(IrItem::Instruction(IrInstruction {
                opcode: Opcode::Call,
                operands: vec![target_op],
                ref_actuals: refs,
                val_actuals: vals,
                span: *span,
            }));
        }
        // `.DEFINE` and `.PREG` are consumed by the symbol table.
        AstNode::Define { .. } | AstNode::PregAlias { .. } => {}
        AstNode::Identifier { .. } | AstNode::Register { .. } | AstNode::Immediate { .. } | AstNode::VectorLit { .. } => {
            unreachable!("argument nodes are lowered through their instruction")
        }
    }
}

fn lower_operands(
    opcode: Opcode,
    args: &[AstNode],
    span: SourceSpan,
    reporter: &mut Reporter<'_>,
) -> Option<Vec<IrOperand>> {
    let kinds = opcode.operand_kinds();
    if args.len() != kinds.len() {
        reporter.error(
            DiagnosticKind::Semantic,
            span,
            format!("`{opcode}` expects {} argument(s), got {}", kinds.len(), args.len()),
        );
        return None;
    }
    let mut operands = Vec::with_capacity(args.len());
    for (arg, kind) in args.iter().zip(kinds) {
        operands.push(lower_operand(arg, *kind, reporter)?);
    }
    Some(operands)
}

fn lower_operand(arg: &AstNode, kind: OperandKind, reporter: &mut Reporter<'_>) -> Option<IrOperand> {
    let operand = match (kind, arg) {
        (OperandKind::Reg, AstNode::Register { reg, .. }) => {
            IrOperand::Reg(u16::try_from(reg.encode()).expect("register encoding fits u16"))
        }
        (OperandKind::Imm, AstNode::Immediate { value, .. }) => IrOperand::Imm(*value),
        (OperandKind::Vec, AstNode::VectorLit { vector, .. }) => IrOperand::Vec(vector.clone()),
        // In 1-D worlds a vector literal lexes as a bare number.
        (OperandKind::Vec, AstNode::Immediate { value, .. }) if value.tag == MoleculeTag::Data => {
            IrOperand::Vec(Vector::new(vec![value.value]))
        }
        (OperandKind::Vec, AstNode::Identifier { name, .. }) => IrOperand::LabelRef(name.clone()),
        (_, other) => {
            let wanted = match kind {
                OperandKind::Reg => "a register",
                OperandKind::Imm => "a typed literal",
                OperandKind::Vec => "a vector or label",
            };
            reporter.error(
                DiagnosticKind::Semantic,
                other.span(),
                format!("expected {wanted} here"),
            );
            return None;
        }
    };
    Some(operand)
}
