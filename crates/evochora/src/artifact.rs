//! The program artifact: the compiler's output and the runtime's input.

use indexmap::IndexMap;

use crate::{molecule::Molecule, vector::Vector};

/// A procedure's declared parameters, in binding order (REF before VAL).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcSignature {
    pub ref_params: Vec<String>,
    pub val_params: Vec<String>,
}

/// A compiled, linked, placeable program.
///
/// Coordinates are relative to the program frame with origin `(0,…,0)`; the
/// runtime adds the placement origin when writing cells and dispatching
/// jumps. Field order is part of the binary encoding; identical source
/// compiles to byte-identical `dump()` output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgramArtifact {
    /// World dimensionality this program was compiled for.
    pub dimensions: usize,
    /// Ordered cell emplacements: (relative coordinate, molecule).
    pub cells: Vec<(Vector, Molecule)>,
    /// Label name (canonical dotted path) → linear address.
    pub label_to_addr: IndexMap<String, usize>,
    /// Linear address → relative coordinate.
    pub linear_to_coord: Vec<Vector>,
    /// Procedure name (canonical dotted path) → signature.
    pub proc_signatures: IndexMap<String, ProcSignature>,
    /// Where a spawned organism starts executing, program-relative.
    pub entry_point: Vector,
}

impl ProgramArtifact {
    /// Serializes the artifact to its binary form.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores an artifact from `dump()` output.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// The relative coordinate of a label, if it is defined and placed.
    #[must_use]
    pub fn label_coord(&self, name: &str) -> Option<&Vector> {
        self.linear_to_coord.get(*self.label_to_addr.get(name)?)
    }
}
