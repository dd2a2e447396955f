//! End-to-end tests of the assembler pipeline: source text in, linked
//! artifact and IR out.

use evochora::{
    compiler::ir::{IrItem, IrOperand},
    compile_file, compile_source, CollectDiagnostics, CompileOptions, Molecule, Vector,
};
use pretty_assertions::assert_eq;

fn compile_ok(source: &str, dims: usize) -> evochora::CompileOutput {
    let mut diags = CollectDiagnostics::new();
    compile_source(source, "test.s", &CompileOptions::new(dims), &mut diags)
        .unwrap_or_else(|failure| panic!("expected successful compile:\n{failure}"))
}

fn compile_err(source: &str, dims: usize) -> evochora::CompileFailure {
    let mut diags = CollectDiagnostics::new();
    match compile_source(source, "test.s", &CompileOptions::new(dims), &mut diags) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(failure) => failure,
    }
}

fn instructions(output: &evochora::CompileOutput) -> Vec<&evochora::compiler::ir::IrInstruction> {
    output
        .ir
        .iter()
        .filter_map(|item| match item {
            IrItem::Instruction(instr) => Some(instr),
            _ => None,
        })
        .collect()
}

// === Scenario S1: alias and constant resolution ===

#[test]
fn alias_and_constant_resolve_to_register_and_immediate() {
    let output = compile_ok(".REG %COUNTER %DR0\n.DEFINE MAX DATA:10\nSETI %COUNTER MAX\n", 2);
    let instrs = instructions(&output);
    assert_eq!(instrs.len(), 1);
    assert_eq!(
        instrs[0].operands,
        vec![IrOperand::Reg(0), IrOperand::Imm(Molecule::data(10))]
    );
}

// === Scenario S2: label rewrite in 2-D ===

#[test]
fn label_reference_links_to_its_coordinate() {
    let output = compile_ok(".ORG 0|0\nL: NOP\nJMPI L\n", 2);
    let instrs = instructions(&output);
    let jmpi = instrs.last().unwrap();
    assert_eq!(jmpi.operands, vec![IrOperand::Vec(Vector::from([0, 0]))]);
    assert_eq!(output.artifact.label_coord("L"), Some(&Vector::from([0, 0])));
}

#[test]
fn forward_references_link_too() {
    let output = compile_ok("JMPI END\nNOP\nEND: NOP\n", 2);
    let instrs = instructions(&output);
    // JMPI occupies cells 0..=2, NOP cell 3, END labels cell 4 at (4, 0).
    assert_eq!(instrs[0].operands, vec![IrOperand::Vec(Vector::from([4, 0]))]);
}

// === Property: label resolution completeness ===

#[test]
fn no_label_refs_survive_linking() {
    let source = "\
JMPI MAIN
.PROC ADD REF A VAL B
ADDR A B
RET
.ENDP
MAIN:
SETI %DR0 DATA:1
CALL ADD REF %DR0 VAL %DR0
JMPI MAIN
";
    let output = compile_ok(source, 2);
    for instr in instructions(&output) {
        for operand in &instr.operands {
            assert!(
                !matches!(operand, IrOperand::LabelRef(_)),
                "unlinked operand {operand} in {:?}",
                instr.opcode
            );
        }
        for operand in &instr.operands {
            if let IrOperand::Vec(v) = operand {
                assert_eq!(v.dims(), 2);
            }
        }
    }
}

#[test]
fn missing_label_is_a_link_error() {
    let failure = compile_err("JMPI NOWHERE\n", 2);
    assert!(failure.diagnostics.iter().any(|d| d.message.contains("NOWHERE")));
}

// === Property: legacy WITH rejection ===

#[test]
fn legacy_with_is_rejected_with_a_message_naming_the_token() {
    let failure = compile_err(".PROC P VAL X\nRET\n.ENDP\nCALL P WITH %DR0\n", 2);
    assert!(
        failure.diagnostics.iter().any(|d| d.message.contains("WITH")),
        "diagnostics must reference the WITH token: {failure}"
    );
}

#[test]
fn with_in_plain_argument_position_is_rejected() {
    let failure = compile_err("SETR %DR0 WITH\n", 2);
    assert!(failure.diagnostics.iter().any(|d| d.message.contains("WITH")));
}

// === Property: compile determinism ===

#[test]
fn identical_source_compiles_to_identical_artifact_bytes() {
    let source = "\
.SCOPE LIB
.PROC DOUBLE EXPORT REF X
ADDR X X
RET
.ENDP
.ENDS
MAIN:
SETI %DR0 DATA:21
CALL LIB.DOUBLE REF %DR0
JMPI MAIN
";
    let first = compile_ok(source, 2).artifact.dump().unwrap();
    let second = compile_ok(source, 2).artifact.dump().unwrap();
    assert_eq!(first, second);
}

// === Includes ===

#[test]
fn including_a_file_twice_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.s"), ".DEFINE TEN DATA:10\n").unwrap();
    std::fs::write(
        dir.path().join("once.s"),
        ".INCLUDE \"lib.s\"\nSETI %DR0 TEN\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("twice.s"),
        ".INCLUDE \"lib.s\"\n.INCLUDE \"lib.s\"\nSETI %DR0 TEN\n",
    )
    .unwrap();

    let options = CompileOptions::new(2);
    let mut diags = CollectDiagnostics::new();
    let once = compile_file(&dir.path().join("once.s"), &options, &mut diags).unwrap();
    let twice = compile_file(&dir.path().join("twice.s"), &options, &mut diags).unwrap();
    assert_eq!(once.artifact.cells, twice.artifact.cells);
}

#[test]
fn unreadable_include_reports_at_the_include_site() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.s"), "NOP\n.INCLUDE \"missing.s\"\n").unwrap();
    let options = CompileOptions::new(2);
    let mut diags = CollectDiagnostics::new();
    let failure = compile_file(&dir.path().join("main.s"), &options, &mut diags).unwrap_err();
    let diag = &failure.diagnostics[0];
    assert_eq!(diag.line, 2);
    assert!(diag.message.contains("missing.s"));
}

// === Macros ===

#[test]
fn macro_labels_stay_distinct_across_expansions() {
    let source = "\
.MACRO SPIN
AGAIN: NOP
JMPI AGAIN
.ENDM
SPIN
SPIN
HLT
";
    // Two expansions each define a loop label; hygiene keeps them apart, so
    // this compiles and links without duplicate-symbol errors.
    let output = compile_ok(source, 2);
    assert_eq!(output.artifact.label_to_addr.len(), 2);
}

#[test]
fn recursive_macro_is_rejected() {
    let failure = compile_err(".MACRO LOOP\nLOOP\n.ENDM\nLOOP\n", 2);
    assert!(failure.diagnostics.iter().any(|d| d.message.contains("recursively")));
}

// === Layout ===

#[test]
fn org_and_dir_shape_the_layout() {
    let output = compile_ok(".ORG 2|3\n.DIR 0|1\nNOP\nNOP\n", 2);
    assert_eq!(output.artifact.cells[0].0, Vector::from([2, 3]));
    assert_eq!(output.artifact.cells[1].0, Vector::from([2, 4]));
}

#[test]
fn place_emits_a_cell_off_the_cursor_path() {
    let output = compile_ok("NOP\n.PLACE ENERGY:50 @ 3|3\nNOP\n", 2);
    assert_eq!(output.artifact.cells[1].0, Vector::from([3, 3]));
    assert_eq!(output.artifact.cells[1].1, Molecule::energy(50));
    // The cursor is unaffected by the placement.
    assert_eq!(output.artifact.cells[2].0, Vector::from([1, 0]));
}

#[test]
fn call_cells_carry_target_counts_and_actuals() {
    let source = "\
.PROC P REF A VAL B
RET
.ENDP
CALL P REF %DR1 VAL %DR2
";
    let output = compile_ok(source, 2);
    let cells = &output.artifact.cells;
    // RET is cell 0; CALL starts at cell 1: opcode, target x2, counts x2, regs x2.
    assert_eq!(cells.len(), 8);
    assert_eq!(cells[4].1, Molecule::data(1), "one REF actual");
    assert_eq!(cells[5].1, Molecule::data(1), "one VAL actual");
    assert_eq!(cells[6].1, Molecule::data(1), "%DR1");
    assert_eq!(cells[7].1, Molecule::data(2), "%DR2");
    let sig = output.artifact.proc_signatures.get("P").unwrap();
    assert_eq!(sig.ref_params, vec!["A".to_owned()]);
    assert_eq!(sig.val_params, vec!["B".to_owned()]);
}

#[test]
fn call_arity_mismatch_is_a_link_error() {
    let failure = compile_err(".PROC P REF A\nRET\n.ENDP\nCALL P REF %DR0 %DR1\n", 2);
    assert!(failure.diagnostics.iter().any(|d| d.message.contains("REF")));
}

// === Dimensionality ===

#[test]
fn vector_dimensionality_must_match_the_world() {
    let failure = compile_err("SETV %DR0 1|2|3\n", 2);
    assert!(failure
        .diagnostics
        .iter()
        .any(|d| d.message.contains("dimensionality")));
}

#[test]
fn multiple_errors_surface_in_one_compile() {
    let failure = compile_err("SETI %DR0 MISSING\nSETI %DR1 ALSOMISSING\n", 2);
    assert!(failure.diagnostics.len() >= 2);
}
