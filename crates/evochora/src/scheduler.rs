//! The simulation kernel: world ownership, placement, and the tick loop.
//!
//! Single-threaded and cooperative: within a tick, organisms run one
//! instruction each in ascending id order, and writes by organism `i` are
//! visible to every organism `j > i` in the same tick. Organisms born during
//! a tick first act on the next one.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    artifact::ProgramArtifact,
    config::SimulationConfig,
    organism::{Organism, SpawnRequest},
    rng::TickRng,
    snapshot::{SnapshotSink, WorldStateMessage},
    vector::Vector,
    world::World,
};

/// Why a program could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementError {
    /// Artifact was compiled for a different dimensionality.
    DimensionMismatch { artifact: usize, world: usize },
    /// An emplacement cell is already occupied.
    Occupied(Vector),
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionMismatch { artifact, world } => {
                write!(f, "program compiled for {artifact} dimension(s), world has {world}")
            }
            Self::Occupied(coord) => write!(f, "cell {coord} is already occupied"),
        }
    }
}

impl std::error::Error for PlacementError {}

/// The simulation: one world, its organisms, and the tick counter.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    world: World,
    organisms: Vec<Organism>,
    next_id: u64,
    next_program_id: u64,
    tick: u64,
    shutdown: Arc<AtomicBool>,
}

impl Simulation {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        let world = World::new(&config.world.dimensions);
        Self {
            config,
            world,
            organisms: Vec::new(),
            next_id: 1,
            next_program_id: 1,
            tick: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[must_use]
    pub fn organisms(&self) -> &[Organism] {
        &self.organisms
    }

    #[must_use]
    pub fn tick_number(&self) -> u64 {
        self.tick
    }

    /// A flag that makes [`Simulation::run`] stop after the in-flight tick.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Writes a compiled program into the world and spawns its organism.
    ///
    /// Every emplacement cell becomes owned by the new organism; the organism
    /// starts at `origin + entry_point`, facing the first axis, with the
    /// configured initial energy. Returns the organism id.
    pub fn place_program(&mut self, artifact: &ProgramArtifact, origin: &Vector) -> Result<u64, PlacementError> {
        if artifact.dimensions != self.world.dims() {
            return Err(PlacementError::DimensionMismatch {
                artifact: artifact.dimensions,
                world: self.world.dims(),
            });
        }
        for (offset, _) in &artifact.cells {
            let coord = self.world.wrap(&origin.add(offset));
            if !self.world.get(&coord).is_empty() {
                return Err(PlacementError::Occupied(coord));
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let program_id = self.next_program_id;
        self.next_program_id += 1;

        for (offset, molecule) in &artifact.cells {
            let coord = self.world.wrap(&origin.add(offset));
            self.world.set(&coord, *molecule, id);
        }

        let ip = self.world.wrap(&origin.add(&artifact.entry_point));
        let dv = Vector::unit(self.world.dims(), 0, false);
        self.organisms.push(Organism::new(
            id,
            None,
            program_id,
            self.tick,
            origin.clone(),
            ip,
            dv,
            self.config.organism.initial_energy,
            &self.config.organism,
            &self.config.stacks,
        ));
        tracing::info!(id, program_id, cells = artifact.cells.len(), "placed program");
        Ok(id)
    }

    /// Runs one tick: one instruction per live organism, id order, then
    /// removal of the halted and one snapshot.
    pub fn step_tick(&mut self, sink: &mut dyn SnapshotSink) {
        let mut rng = TickRng::new(self.config.world.seed, self.tick);
        let mut spawned: Vec<SpawnRequest> = Vec::new();

        // Freeze the roster: organisms born this tick wait for the next one.
        let frozen = self.organisms.len();
        for index in 0..frozen {
            let organism = &mut self.organisms[index];
            if organism.is_halted() {
                continue;
            }
            let outcome = organism.step(&mut self.world, &mut rng, &mut spawned);
            if let crate::organism::StepOutcome::Halted(kind) = outcome {
                tracing::debug!(id = organism.id(), ?kind, "organism halted");
            }
        }

        // Halted organisms leave; their cells keep their owner id.
        self.organisms.retain(|org| !org.is_halted());

        for request in spawned {
            let id = self.next_id;
            self.next_id += 1;
            self.organisms.push(Organism::new(
                id,
                Some(request.parent_id),
                request.program_id,
                self.tick,
                request.origin,
                request.ip,
                request.dv,
                request.energy,
                &self.config.organism,
                &self.config.stacks,
            ));
        }

        sink.submit(WorldStateMessage::capture(self.tick, &self.world, &self.organisms));
        self.tick += 1;
    }

    /// Runs up to `ticks` ticks, stopping early on shutdown or extinction.
    ///
    /// A shutdown request takes effect between ticks: the in-flight tick
    /// finishes and emits its snapshot before the loop exits.
    pub fn run(&mut self, ticks: u64, sink: &mut dyn SnapshotSink) {
        for _ in 0..ticks {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!(tick = self.tick, "shutdown requested, stopping");
                break;
            }
            self.step_tick(sink);
            if self.organisms.is_empty() {
                tracing::info!(tick = self.tick, "no live organisms, stopping");
                break;
            }
        }
    }
}
