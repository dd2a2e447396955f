//! Tests for binary serialization of program artifacts.
//!
//! The artifact must round-trip losslessly through `dump()`/`load()` so
//! compiled programs can be cached and shipped between processes.

use evochora::{compile_source, CollectDiagnostics, CompileOptions, ProgramArtifact, Vector};
use pretty_assertions::assert_eq;

fn compile(source: &str) -> ProgramArtifact {
    let mut diags = CollectDiagnostics::new();
    compile_source(source, "test.s", &CompileOptions::new(2), &mut diags)
        .expect("compile should succeed")
        .artifact
}

#[test]
fn artifact_dump_load_round_trips() {
    let artifact = compile(
        "\
JMPI MAIN
.PROC ADD EXPORT REF A VAL B
ADDR A B
RET
.ENDP
MAIN:
SETI %DR0 DATA:1
CALL ADD REF %DR0 VAL %DR0
HLT
",
    );
    let bytes = artifact.dump().unwrap();
    let loaded = ProgramArtifact::load(&bytes).unwrap();
    assert_eq!(loaded, artifact);
}

#[test]
fn loaded_artifact_preserves_all_tables() {
    let artifact = compile(".ORG 1|1\nSTART: NOP\n.PLACE ENERGY:9 @ 3|3\nJMPI START\n");
    let loaded = ProgramArtifact::load(&artifact.dump().unwrap()).unwrap();

    assert_eq!(loaded.dimensions, 2);
    assert_eq!(loaded.entry_point, Vector::from([1, 1]));
    assert_eq!(loaded.label_coord("START"), Some(&Vector::from([1, 1])));
    assert_eq!(loaded.cells, artifact.cells);
    assert_eq!(loaded.linear_to_coord, artifact.linear_to_coord);
}

#[test]
fn dump_is_stable_across_round_trips() {
    let artifact = compile("L: SETI %DR0 DATA:5\nJMPI L\n");
    let bytes = artifact.dump().unwrap();
    let again = ProgramArtifact::load(&bytes).unwrap().dump().unwrap();
    assert_eq!(bytes, again);
}

#[test]
fn proc_signatures_survive_the_round_trip() {
    let artifact = compile(".PROC COPY REF DST VAL SRC\nSETR DST SRC\nRET\n.ENDP\nHLT\n");
    let loaded = ProgramArtifact::load(&artifact.dump().unwrap()).unwrap();
    let sig = loaded.proc_signatures.get("COPY").unwrap();
    assert_eq!(sig.ref_params, vec!["DST".to_owned()]);
    assert_eq!(sig.val_params, vec!["SRC".to_owned()]);
}
