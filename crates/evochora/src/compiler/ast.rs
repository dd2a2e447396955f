//! The abstract syntax tree produced by the parser.
//!
//! `AstNode` is a closed variant; the generic walkers recurse through each
//! node's declared children, so passes that rewrite arguments (the semantic
//! post-processor) never need per-variant traversal code.

use crate::{
    isa::Opcode,
    molecule::Molecule,
    registers::RegisterRef,
    source::SourceSpan,
    vector::Vector,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Program {
        body: Vec<AstNode>,
    },
    /// A plain instruction line. `CALL` gets its own variant because its
    /// actuals are split into two ordered lists.
    Instruction {
        opcode: Opcode,
        args: Vec<AstNode>,
        span: SourceSpan,
    },
    Call {
        target: Box<AstNode>,
        ref_actuals: Vec<AstNode>,
        val_actuals: Vec<AstNode>,
        span: SourceSpan,
    },
    /// `NAME:` — attaches to the next emitted statement.
    Label {
        name: String,
        span: SourceSpan,
    },
    Scope {
        name: String,
        body: Vec<AstNode>,
        span: SourceSpan,
    },
    Proc {
        name: String,
        exported: bool,
        ref_params: Vec<String>,
        val_params: Vec<String>,
        body: Vec<AstNode>,
        span: SourceSpan,
    },
    /// `.DEFINE name TAG:int`
    Define {
        name: String,
        value: Molecule,
        span: SourceSpan,
    },
    /// `.PREG alias %PRn` — a procedure-local register alias.
    PregAlias {
        alias: String,
        register: RegisterRef,
        span: SourceSpan,
    },
    /// `.ORG vec`
    Org {
        vector: Vector,
        span: SourceSpan,
    },
    /// `.DIR vec`
    Dir {
        vector: Vector,
        span: SourceSpan,
    },
    /// `.PLACE TAG:int @ vec`
    Place {
        molecule: Molecule,
        offset: Vector,
        span: SourceSpan,
    },
    /// An unresolved name in argument position; the semantic post-processor
    /// replaces it with a `Register` or `Immediate`, or leaves it for the
    /// linker when it names a label.
    Identifier {
        name: String,
        span: SourceSpan,
    },
    Register {
        reg: RegisterRef,
        span: SourceSpan,
    },
    Immediate {
        value: Molecule,
        span: SourceSpan,
    },
    VectorLit {
        vector: Vector,
        span: SourceSpan,
    },
}

impl AstNode {
    /// The source position of this node. The synthetic `Program` root points
    /// at its first child.
    #[must_use]
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::Program { body } => body.first().map_or(
                SourceSpan::new(crate::source::FileId::new(0), 1, 1),
                Self::span,
            ),
            Self::Instruction { span, .. }
            | Self::Call { span, .. }
            | Self::Label { span, .. }
            | Self::Scope { span, .. }
            | Self::Proc { span, .. }
            | Self::Define { span, .. }
            | Self::PregAlias { span, .. }
            | Self::Org { span, .. }
            | Self::Dir { span, .. }
            | Self::Place { span, .. }
            | Self::Identifier { span, .. }
            | Self::Register { span, .. }
            | Self::Immediate { span, .. }
            | Self::VectorLit { span, .. } => *span,
        }
    }

    /// Child nodes, in source order.
    #[must_use]
    pub fn children(&self) -> Vec<&AstNode> {
        match self {
            Self::Program { body } | Self::Scope { body, .. } | Self::Proc { body, .. } => body.iter().collect(),
            Self::Instruction { args, .. } => args.iter().collect(),
            Self::Call {
                target,
                ref_actuals,
                val_actuals,
                ..
            } => std::iter::once(target.as_ref())
                .chain(ref_actuals)
                .chain(val_actuals)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable child nodes, in source order.
    pub fn children_mut(&mut self) -> Vec<&mut AstNode> {
        match self {
            Self::Program { body } | Self::Scope { body, .. } | Self::Proc { body, .. } => body.iter_mut().collect(),
            Self::Instruction { args, .. } => args.iter_mut().collect(),
            Self::Call {
                target,
                ref_actuals,
                val_actuals,
                ..
            } => std::iter::once(target.as_mut())
                .chain(ref_actuals.iter_mut())
                .chain(val_actuals.iter_mut())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Depth-first pre-order walk.
pub fn walk(node: &AstNode, visit: &mut impl FnMut(&AstNode)) {
    visit(node);
    for child in node.children() {
        walk(child, visit);
    }
}

/// Depth-first pre-order walk with mutation.
pub fn walk_mut(node: &mut AstNode, visit: &mut impl FnMut(&mut AstNode)) {
    visit(node);
    for child in node.children_mut() {
        walk_mut(child, visit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;

    fn span() -> SourceSpan {
        SourceSpan::new(FileId::new(0), 1, 1)
    }

    #[test]
    fn walk_reaches_arguments_through_nested_blocks() {
        let tree = AstNode::Program {
            body: vec![AstNode::Scope {
                name: "S".into(),
                body: vec![AstNode::Instruction {
                    opcode: Opcode::Seti,
                    args: vec![
                        AstNode::Register {
                            reg: RegisterRef::Data(0),
                            span: span(),
                        },
                        AstNode::Immediate {
                            value: Molecule::data(1),
                            span: span(),
                        },
                    ],
                    span: span(),
                }],
                span: span(),
            }],
        };
        let mut seen = 0usize;
        walk(&tree, &mut |_| seen += 1);
        // Program, scope, instruction, and both arguments.
        assert_eq!(seen, 5);
    }

    #[test]
    fn walk_mut_can_rewrite_arguments_in_place() {
        let mut tree = AstNode::Instruction {
            opcode: Opcode::Jmpi,
            args: vec![AstNode::Identifier {
                name: "TARGET".into(),
                span: span(),
            }],
            span: span(),
        };
        walk_mut(&mut tree, &mut |node| {
            if matches!(node, AstNode::Identifier { .. }) {
                *node = AstNode::VectorLit {
                    vector: Vector::from([0, 0]),
                    span: span(),
                };
            }
        });
        let AstNode::Instruction { args, .. } = &tree else { unreachable!() };
        assert!(matches!(args[0], AstNode::VectorLit { .. }));
    }
}
