//! End-to-end tests of the simulation kernel: compiled programs placed into
//! worlds, ticked, and observed through snapshots.

use evochora::{
    compile_source, CollectDiagnostics, CollectSnapshots, CompileOptions, NoSnapshots, ProgramArtifact, Simulation,
    SimulationConfig, Vector, WorldStateMessage,
};
use pretty_assertions::assert_eq;

fn compile(source: &str, dims: usize) -> ProgramArtifact {
    let mut diags = CollectDiagnostics::new();
    compile_source(source, "test.s", &CompileOptions::new(dims), &mut diags)
        .unwrap_or_else(|failure| panic!("expected successful compile:\n{failure}"))
        .artifact
}

fn small_world(axes: &[i64]) -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.world.dimensions = axes.to_vec();
    config
}

fn run_ticks(sim: &mut Simulation, ticks: u64) -> Vec<WorldStateMessage> {
    let mut sink = CollectSnapshots::new();
    sim.run(ticks, &mut sink);
    sink.into_snapshots()
}

fn cell<'a>(message: &'a WorldStateMessage, position: &str) -> &'a evochora::CellState {
    message
        .cell_states
        .iter()
        .find(|c| c.position == position)
        .unwrap_or_else(|| panic!("no cell at {position}"))
}

// === Scenario S3: REF vs VAL procedure parameters ===

#[test]
fn ref_writes_back_val_does_not_and_frames_balance() {
    let source = "\
JMPI MAIN
.PROC ADD REF A VAL B
SETI %PR0 DATA:99
PUSH B
POP B
ADDR A B
RET
.ENDP
MAIN:
SETI %PR0 DATA:7
SETI %DR0 DATA:1
SETI %DR1 DATA:2
CALL ADD REF %DR0 VAL %DR1
SPIN: JMPI SPIN
";
    let artifact = compile(source, 2);
    let mut sim = Simulation::new(SimulationConfig::default());
    sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();
    let snapshots = run_ticks(&mut sim, 15);
    let org = &snapshots.last().unwrap().organism_states[0];

    assert_eq!(org.data_registers[0], "DATA:3", "REF actual received the sum");
    assert_eq!(org.data_registers[1], "DATA:2", "VAL actual is untouched");
    assert_eq!(org.er, 0);
    // Stack balance: depths equal their pre-CALL values, PR* bit-identical.
    assert_eq!(org.proc_registers[0], "DATA:7");
    assert!(org.data_stack.is_empty());
    assert!(org.call_stack.is_empty());
    assert!(org.location_stack.is_empty());
    assert!(org.formal_parameters.is_empty());
    // Energy monotonicity: nothing here touches the world.
    assert!(snapshots.iter().all(|s| s.organism_states[0].energy == 1000));
}

// === Scenario S4: id-ordered conflict resolution ===

#[test]
fn later_id_wins_same_tick_write_conflicts() {
    let config = small_world(&[8, 8]);
    let first = compile("POKI DATA:1 0|2\nSPIN: JMPI SPIN\n", 2);
    let second = compile("POKI DATA:2 0|-2\nSPIN: JMPI SPIN\n", 2);

    let mut sim = Simulation::new(config);
    let id_a = sim.place_program(&first, &Vector::from([0, 0])).unwrap();
    let id_b = sim.place_program(&second, &Vector::from([0, 4])).unwrap();
    assert!(id_b > id_a);

    let snapshots = run_ticks(&mut sim, 1);
    let contested = cell(&snapshots[0], "0|2");
    assert_eq!(contested.value, 2, "the higher id wrote last");
    assert_eq!(contested.owner_id, id_b);
}

// === Scenario S5: toroidal wrap ===

#[test]
fn seek_wraps_around_the_torus() {
    let artifact = compile("SEEK 1|0\n", 2);
    let mut sim = Simulation::new(small_world(&[4, 4]));
    sim.place_program(&artifact, &Vector::from([3, 1])).unwrap();
    let snapshots = run_ticks(&mut sim, 1);
    assert_eq!(snapshots[0].organism_states[0].position, "0|1");
}

#[test]
fn seek_wraps_in_three_dimensions() {
    let artifact = compile("SEEK 0|0|-1\n", 3);
    let mut sim = Simulation::new(small_world(&[4, 4, 4]));
    sim.place_program(&artifact, &Vector::from([0, 0, 0])).unwrap();
    let snapshots = run_ticks(&mut sim, 1);
    assert_eq!(snapshots[0].organism_states[0].position, "0|0|3");
}

// === Scenario S6: insufficient energy on overwrite ===

#[test]
fn poke_over_foreign_cell_without_energy_traps_and_leaves_cell() {
    let mut config = small_world(&[8, 8]);
    config.organism.initial_energy = 10;

    let owner = compile("SPIN: JMPI SPIN\n.PLACE STRUCTURE:50 @ 0|2\n", 2);
    let raider = compile("POKI DATA:9 0|-2\nSPIN: JMPI SPIN\n", 2);

    let mut sim = Simulation::new(config);
    let owner_id = sim.place_program(&owner, &Vector::from([0, 0])).unwrap();
    sim.place_program(&raider, &Vector::from([0, 4])).unwrap();

    let snapshots = run_ticks(&mut sim, 1);
    let contested = cell(&snapshots[0], "0|2");
    assert_eq!(contested.molecule_type, "STRUCTURE");
    assert_eq!(contested.value, 50);
    assert_eq!(contested.owner_id, owner_id);

    let raider_state = &snapshots[0].organism_states[1];
    assert_eq!(raider_state.last_trap.as_deref(), Some("insufficient_energy"));
    assert_ne!(raider_state.er, 0);
    assert_eq!(raider_state.energy, 10, "a failed overwrite costs nothing");
}

#[test]
fn poke_over_foreign_cell_with_energy_pays_its_payload() {
    let config = small_world(&[8, 8]);
    let owner = compile("SPIN: JMPI SPIN\n.PLACE STRUCTURE:50 @ 0|2\n", 2);
    let raider = compile("POKI DATA:9 0|-2\nSPIN: JMPI SPIN\n", 2);

    let mut sim = Simulation::new(config);
    sim.place_program(&owner, &Vector::from([0, 0])).unwrap();
    let raider_id = sim.place_program(&raider, &Vector::from([0, 4])).unwrap();

    let snapshots = run_ticks(&mut sim, 1);
    let contested = cell(&snapshots[0], "0|2");
    assert_eq!(contested.value, 9);
    assert_eq!(contested.owner_id, raider_id);
    assert_eq!(snapshots[0].organism_states[1].energy, 1000 - 50);
}

// === Property: ownership invariant ===

#[test]
fn every_non_empty_cell_has_an_owner() {
    let config = small_world(&[8, 8]);
    let first = compile("POKI DATA:1 0|2\nSPIN: JMPI SPIN\n", 2);
    let second = compile("POKI DATA:2 0|-2\nSPIN: JMPI SPIN\n", 2);
    let mut sim = Simulation::new(config);
    sim.place_program(&first, &Vector::from([0, 0])).unwrap();
    sim.place_program(&second, &Vector::from([0, 4])).unwrap();

    for message in run_ticks(&mut sim, 5) {
        for cell in &message.cell_states {
            assert_ne!(cell.owner_id, 0, "cell {} has no owner", cell.position);
        }
    }
}

// === Property: scheduler determinism ===

#[test]
fn equal_seed_and_placements_replay_identical_snapshots() {
    let source = "SPIN: RNDI %DR0 DATA:100\nSNTI %DR1 DATA:0\nJMPI SPIN\n";
    let run = || {
        let mut config = small_world(&[16, 16]);
        config.world.seed = 1234;
        let artifact = compile(source, 2);
        let mut sim = Simulation::new(config);
        sim.place_program(&artifact, &Vector::from([2, 2])).unwrap();
        let mut snapshots = run_ticks(&mut sim, 20);
        // Wall-clock timestamps are the one intentionally nondeterministic field.
        for message in &mut snapshots {
            message.timestamp_us = 0;
        }
        snapshots
    };
    assert_eq!(run(), run());
}

// === Conditional skip ===

#[test]
fn false_predicate_skips_one_whole_instruction() {
    let source = "\
SETI %DR0 DATA:1
IFI %DR0 DATA:2
SETI %DR1 DATA:9
SETI %DR2 DATA:7
SPIN: JMPI SPIN
";
    let artifact = compile(source, 2);
    let mut sim = Simulation::new(SimulationConfig::default());
    sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();
    let snapshots = run_ticks(&mut sim, 6);
    let org = &snapshots.last().unwrap().organism_states[0];
    assert_eq!(org.data_registers[1], "DATA:0", "guarded instruction was skipped");
    assert_eq!(org.data_registers[2], "DATA:7");
}

#[test]
fn true_predicate_runs_the_next_instruction() {
    let source = "\
SETI %DR0 DATA:2
IFI %DR0 DATA:2
SETI %DR1 DATA:9
SPIN: JMPI SPIN
";
    let artifact = compile(source, 2);
    let mut sim = Simulation::new(SimulationConfig::default());
    sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();
    let snapshots = run_ticks(&mut sim, 5);
    assert_eq!(snapshots.last().unwrap().organism_states[0].data_registers[1], "DATA:9");
}

// === Energy harvesting ===

#[test]
fn peeking_an_energy_molecule_credits_the_organism() {
    let source = "PEEK %DR0 0|1\nSPIN: JMPI SPIN\n.PLACE ENERGY:25 @ 0|1\n";
    let artifact = compile(source, 2);
    let mut sim = Simulation::new(small_world(&[8, 8]));
    sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();
    let snapshots = run_ticks(&mut sim, 2);
    let org = &snapshots.last().unwrap().organism_states[0];
    assert_eq!(org.energy, 1025);
    assert_eq!(org.data_registers[0], "ENERGY:25");
    // The harvested cell is empty now, so it no longer appears.
    assert!(snapshots.last().unwrap().cell_states.iter().all(|c| c.position != "0|1"));
}

// === Reproduction ===

#[test]
fn fork_spawns_a_child_that_acts_next_tick() {
    let source = "\
SETI %DR1 DATA:100
SETV %DR2 0|3
FORK %DR1 %DR2
SPIN: JMPI SPIN
";
    let artifact = compile(source, 2);
    let mut sim = Simulation::new(SimulationConfig::default());
    let parent_id = sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();

    let snapshots = run_ticks(&mut sim, 4);
    let at_fork = &snapshots[2];
    assert_eq!(at_fork.organism_states.len(), 2, "child exists after the FORK tick");
    let child = &at_fork.organism_states[1];
    assert_eq!(child.parent_id, Some(parent_id));
    assert_eq!(child.birth_tick, 2);
    assert_eq!(child.energy, 100);
    assert_eq!(at_fork.organism_states[0].energy, 900);

    // The child's entry points at an empty cell, so its first step halts it.
    assert_eq!(snapshots[3].organism_states.len(), 1);
}

// === Halting ===

#[test]
fn hlt_removes_the_organism_but_keeps_its_cells() {
    let artifact = compile("HLT\n", 2);
    let mut sim = Simulation::new(small_world(&[4, 4]));
    sim.place_program(&artifact, &Vector::from([1, 1])).unwrap();
    let snapshots = run_ticks(&mut sim, 3);
    assert!(snapshots[0].organism_states.is_empty());
    assert_eq!(cell(&snapshots[0], "1|1").molecule_type, "CODE");
    // Extinction ends the run early.
    assert_eq!(snapshots.len(), 1);
}

#[test]
fn stack_overflow_policy_is_configurable() {
    let mut config = small_world(&[16, 16]);
    config.stacks.max_depth = 4;
    config.stacks.on_overflow = evochora::OverflowPolicy::Trap;
    let artifact = compile("SPIN: PUSH %DR0\nJMPI SPIN\n", 2);
    let mut sim = Simulation::new(config);
    sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();
    let snapshots = run_ticks(&mut sim, 12);
    let org = &snapshots.last().unwrap().organism_states[0];
    assert_eq!(org.data_stack.len(), 4, "stack stays at its bound");
    assert_eq!(org.last_trap.as_deref(), Some("stack_overflow"));
}

// === Shutdown ===

#[test]
fn shutdown_finishes_the_inflight_tick_then_stops() {
    let artifact = compile("SPIN: JMPI SPIN\n", 2);
    let mut sim = Simulation::new(small_world(&[8, 8]));
    sim.place_program(&artifact, &Vector::from([0, 0])).unwrap();
    sim.shutdown_handle().store(true, std::sync::atomic::Ordering::Relaxed);
    let mut sink = NoSnapshots;
    sim.run(100, &mut sink);
    assert_eq!(sim.tick_number(), 0, "no tick starts after shutdown");
}
