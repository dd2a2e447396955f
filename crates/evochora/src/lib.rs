#![doc = include_str!("../../../README.md")]

pub mod artifact;
pub mod compiler;
pub mod config;
pub mod diag;
pub mod isa;
pub mod molecule;
pub mod organism;
pub mod registers;
pub mod rng;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod vector;
pub mod world;

pub use crate::{
    artifact::{ProcSignature, ProgramArtifact},
    compiler::{compile_file, compile_source, CompileOptions, CompileOutput},
    config::{Backpressure, OverflowPolicy, SimulationConfig},
    diag::{
        CollectDiagnostics, CompileFailure, Diagnostic, DiagnosticKind, DiagnosticsSink, NoDiagnostics, Severity,
        StderrDiagnostics,
    },
    molecule::{Molecule, MoleculeTag, RegValue},
    organism::{HaltKind, Organism, StepOutcome, TrapKind},
    registers::RegisterRef,
    scheduler::{PlacementError, Simulation},
    snapshot::{
        CellState, CollectSnapshots, NoSnapshots, OrganismState, QueueSink, SnapshotSink, WorldStateMessage,
    },
    vector::Vector,
    world::World,
};
