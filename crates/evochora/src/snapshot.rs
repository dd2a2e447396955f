//! Per-tick snapshots and the sinks that consume them.
//!
//! The scheduler publishes one immutable [`WorldStateMessage`] per completed
//! tick. Sinks decide their own delivery policy; the bounded [`QueueSink`]
//! implements the configurable block/drop backpressure.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::{
    config::Backpressure,
    isa,
    organism::{FprBinding, Organism, RegTarget},
    world::World,
};

/// State of one organism at the end of a tick, rendered for transport.
///
/// Vectors render as `a|b|c`, molecules as `TAG:value`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OrganismState {
    pub id: u64,
    pub program_id: u64,
    pub parent_id: Option<u64>,
    pub birth_tick: u64,
    pub energy: u64,
    pub position: String,
    pub ip: String,
    pub return_ip: String,
    pub dv: String,
    pub dps: Vec<String>,
    pub er: u64,
    pub data_registers: Vec<String>,
    pub proc_registers: Vec<String>,
    pub fprs: Vec<String>,
    pub location_registers: Vec<String>,
    pub data_stack: Vec<String>,
    pub call_stack: Vec<String>,
    pub location_stack: Vec<String>,
    pub formal_parameters: Vec<Vec<String>>,
    pub last_trap: Option<String>,
    /// The instruction under `ip`, disassembled, when it decodes.
    pub next_instruction: Option<String>,
}

/// One non-empty cell.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CellState {
    pub position: String,
    #[serde(rename = "type")]
    pub molecule_type: String,
    pub value: i64,
    pub owner_id: u64,
}

/// Everything observable about the simulation after one tick.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorldStateMessage {
    pub tick_number: u64,
    pub timestamp_us: i64,
    pub organism_states: Vec<OrganismState>,
    pub cell_states: Vec<CellState>,
}

impl WorldStateMessage {
    /// Captures the current world and organisms.
    #[must_use]
    pub fn capture(tick_number: u64, world: &World, organisms: &[Organism]) -> Self {
        let organism_states = organisms.iter().map(|org| organism_state(org, world)).collect();
        let cell_states = world
            .occupied_cells()
            .map(|(coord, cell)| CellState {
                position: coord.to_string(),
                molecule_type: cell.molecule.tag.to_string(),
                value: cell.molecule.value,
                owner_id: cell.owner,
            })
            .collect();
        Self {
            tick_number,
            timestamp_us: chrono::Utc::now().timestamp_micros(),
            organism_states,
            cell_states,
        }
    }

    /// Renders the snapshot as a single JSON document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn organism_state(org: &Organism, world: &World) -> OrganismState {
    OrganismState {
        id: org.id,
        program_id: org.program_id,
        parent_id: org.parent_id,
        birth_tick: org.birth_tick,
        energy: org.energy,
        position: org.ip.to_string(),
        ip: org.ip.to_string(),
        return_ip: org.return_ip.to_string(),
        dv: org.dv.to_string(),
        dps: org.dps.iter().map(ToString::to_string).collect(),
        er: org.er,
        data_registers: org.data_regs.iter().map(ToString::to_string).collect(),
        proc_registers: org.proc_regs.iter().map(ToString::to_string).collect(),
        fprs: org
            .formal_parameters
            .last()
            .map(|frame| frame.iter().map(render_binding).collect())
            .unwrap_or_default(),
        location_registers: org.loc_regs.iter().map(ToString::to_string).collect(),
        data_stack: org.data_stack.iter().map(ToString::to_string).collect(),
        call_stack: org.call_stack.iter().map(|f| f.return_ip.to_string()).collect(),
        location_stack: org.location_stack.iter().map(ToString::to_string).collect(),
        formal_parameters: org
            .formal_parameters
            .iter()
            .map(|frame| frame.iter().map(render_binding).collect())
            .collect(),
        last_trap: org.last_trap.map(|t| t.to_string()),
        next_instruction: isa::disassemble(world, &org.ip, &org.dv),
    }
}

fn render_binding(binding: &FprBinding) -> String {
    match binding {
        FprBinding::Val(value) => value.to_string(),
        FprBinding::Ref(RegTarget::Data(n)) => format!("&%DR{n}"),
        FprBinding::Ref(RegTarget::Proc(n)) => format!("&%PR{n}"),
        FprBinding::Ref(RegTarget::Location(n)) => format!("&%LR{n}"),
        FprBinding::Ref(RegTarget::FrameVal { frame, slot }) => format!("&frame[{frame}][{slot}]"),
    }
}

/// Receiver of per-tick snapshots.
pub trait SnapshotSink {
    /// Called once per completed tick, in tick order.
    fn submit(&mut self, message: WorldStateMessage);
}

/// Sink that keeps every snapshot in memory; used by tests and tools.
#[derive(Debug, Default)]
pub struct CollectSnapshots(Vec<WorldStateMessage>);

impl CollectSnapshots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshots(&self) -> &[WorldStateMessage] {
        &self.0
    }

    #[must_use]
    pub fn into_snapshots(self) -> Vec<WorldStateMessage> {
        self.0
    }
}

impl SnapshotSink for CollectSnapshots {
    fn submit(&mut self, message: WorldStateMessage) {
        self.0.push(message);
    }
}

/// Sink that ignores all snapshots.
#[derive(Debug, Default)]
pub struct NoSnapshots;

impl SnapshotSink for NoSnapshots {
    fn submit(&mut self, _message: WorldStateMessage) {}
}

/// Sink backed by a bounded queue to a consumer thread.
///
/// Under `Backpressure::Block` a full queue blocks the scheduler; under
/// `Backpressure::Drop` the snapshot is dropped (the tick itself never is).
#[derive(Debug)]
pub struct QueueSink {
    sender: Sender<WorldStateMessage>,
    backpressure: Backpressure,
    dropped: u64,
}

impl QueueSink {
    /// Creates the sink and its consumer end.
    #[must_use]
    pub fn bounded(capacity: usize, backpressure: Backpressure) -> (Self, Receiver<WorldStateMessage>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                sender,
                backpressure,
                dropped: 0,
            },
            receiver,
        )
    }

    /// Snapshots dropped so far under `Backpressure::Drop`.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SnapshotSink for QueueSink {
    fn submit(&mut self, message: WorldStateMessage) {
        match self.backpressure {
            Backpressure::Block => {
                // A disconnected consumer is a shutdown, not an error.
                let _ = self.sender.send(message);
            }
            Backpressure::Drop => match self.sender.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                    tracing::debug!(dropped = self.dropped, "snapshot queue full, dropping");
                }
                Err(TrySendError::Disconnected(_)) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(tick: u64) -> WorldStateMessage {
        WorldStateMessage::capture(tick, &World::new(&[2, 2]), &[])
    }

    #[test]
    fn drop_mode_discards_when_the_queue_is_full() {
        let (mut sink, receiver) = QueueSink::bounded(1, Backpressure::Drop);
        sink.submit(message(0));
        sink.submit(message(1));
        sink.submit(message(2));
        assert_eq!(sink.dropped(), 2);
        assert_eq!(receiver.recv().unwrap().tick_number, 0);
    }

    #[test]
    fn block_mode_delivers_every_snapshot() {
        let (mut sink, receiver) = QueueSink::bounded(1, Backpressure::Block);
        let consumer = std::thread::spawn(move || {
            let mut ticks = Vec::new();
            for msg in receiver {
                ticks.push(msg.tick_number);
            }
            ticks
        });
        for tick in 0..8 {
            sink.submit(message(tick));
        }
        drop(sink);
        assert_eq!(consumer.join().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn block_mode_ignores_a_disconnected_consumer() {
        let (mut sink, receiver) = QueueSink::bounded(1, Backpressure::Block);
        drop(receiver);
        sink.submit(message(0));
    }

    #[test]
    fn collect_sink_keeps_tick_order() {
        let mut sink = CollectSnapshots::new();
        sink.submit(message(0));
        sink.submit(message(1));
        let ticks: Vec<_> = sink.snapshots().iter().map(|m| m.tick_number).collect();
        assert_eq!(ticks, vec![0, 1]);
    }
}
