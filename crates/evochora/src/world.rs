//! The world: a dense n-dimensional toroidal grid of owned, typed cells.

use crate::{molecule::Molecule, vector::Vector};

/// Owner id meaning "no owner". Organism ids start at 1.
pub const NO_OWNER: u64 = 0;

/// One grid position: a molecule plus the id of the organism that wrote it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cell {
    pub molecule: Molecule,
    pub owner: u64,
}

/// A finite n-dimensional grid with modular addressing on every axis.
///
/// Only the scheduler mutates the world; organisms reach it through the
/// instruction handlers, which enforce ownership and energy rules.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct World {
    shape: Vec<i64>,
    strides: Vec<usize>,
    cells: Vec<Cell>,
}

impl World {
    /// Creates an empty world with the given axis sizes.
    ///
    /// # Panics
    /// Panics if `shape` is empty or any axis size is not positive.
    #[must_use]
    pub fn new(shape: &[i64]) -> Self {
        assert!(!shape.is_empty(), "world needs at least one axis");
        assert!(shape.iter().all(|&s| s > 0), "axis sizes must be positive");
        let mut strides = vec![0usize; shape.len()];
        let mut stride = 1usize;
        for axis in (0..shape.len()).rev() {
            strides[axis] = stride;
            stride *= usize::try_from(shape[axis]).expect("axis size fits usize");
        }
        Self {
            shape: shape.to_vec(),
            strides,
            cells: vec![Cell::default(); stride],
        }
    }

    #[inline]
    #[must_use]
    pub fn dims(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Wraps a coordinate onto the torus.
    #[must_use]
    pub fn wrap(&self, coord: &Vector) -> Vector {
        coord.wrapped(&self.shape)
    }

    fn index(&self, coord: &Vector) -> usize {
        debug_assert_eq!(coord.dims(), self.dims());
        let wrapped = self.wrap(coord);
        wrapped
            .components()
            .iter()
            .zip(&self.strides)
            .map(|(&c, &s)| (c as usize) * s)
            .sum()
    }

    fn coord_of(&self, mut index: usize) -> Vector {
        let mut components = vec![0i64; self.dims()];
        for axis in 0..self.dims() {
            components[axis] = (index / self.strides[axis]) as i64;
            index %= self.strides[axis];
        }
        Vector::new(components)
    }

    #[must_use]
    pub fn get(&self, coord: &Vector) -> Molecule {
        self.cells[self.index(coord)].molecule
    }

    #[must_use]
    pub fn owner(&self, coord: &Vector) -> u64 {
        self.cells[self.index(coord)].owner
    }

    /// Writes a molecule, recording the writer as owner.
    ///
    /// Writing `EMPTY` clears the cell's owner regardless of `owner`.
    pub fn set(&mut self, coord: &Vector, molecule: Molecule, owner: u64) {
        let index = self.index(coord);
        self.cells[index] = if molecule.is_empty() {
            Cell::default()
        } else {
            Cell { molecule, owner }
        };
    }

    /// A cell is passable for an organism when it is empty or its own.
    #[must_use]
    pub fn is_passable(&self, coord: &Vector, id: u64) -> bool {
        let cell = self.cells[self.index(coord)];
        cell.molecule.is_empty() || cell.owner == id
    }

    /// The 2n neighbor directions, ordered `+axis0, -axis0, +axis1, …`.
    ///
    /// The position of a direction in this ordering is its bit index in
    /// neighborhood bitmasks (`SNTI`, `B2VR`).
    #[must_use]
    pub fn directions(dims: usize) -> Vec<Vector> {
        let mut dirs = Vec::with_capacity(dims * 2);
        for axis in 0..dims {
            dirs.push(Vector::unit(dims, axis, false));
            dirs.push(Vector::unit(dims, axis, true));
        }
        dirs
    }

    /// Neighbor cells of a coordinate as `(direction, wrapped coordinate)`.
    #[must_use]
    pub fn neighbors(&self, coord: &Vector) -> Vec<(Vector, Vector)> {
        Self::directions(self.dims())
            .into_iter()
            .map(|dir| {
                let neighbor = self.wrap(&coord.add(&dir));
                (dir, neighbor)
            })
            .collect()
    }

    /// Iterates all non-empty cells as `(coordinate, cell)`.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (Vector, Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.molecule.is_empty())
            .map(|(index, cell)| (self.coord_of(index), *cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_round_trip() {
        let mut world = World::new(&[4, 4]);
        let coord = Vector::from([1, 2]);
        world.set(&coord, Molecule::data(7), 3);
        assert_eq!(world.get(&coord), Molecule::data(7));
        assert_eq!(world.owner(&coord), 3);
    }

    #[test]
    fn coordinates_wrap_on_every_axis() {
        let mut world = World::new(&[4, 3]);
        world.set(&Vector::from([5, -1]), Molecule::data(1), 1);
        assert_eq!(world.get(&Vector::from([1, 2])), Molecule::data(1));
    }

    #[test]
    fn setting_empty_clears_owner() {
        let mut world = World::new(&[4, 4]);
        let coord = Vector::from([0, 0]);
        world.set(&coord, Molecule::data(1), 9);
        world.set(&coord, Molecule::EMPTY, 9);
        assert_eq!(world.owner(&coord), NO_OWNER);
    }

    #[test]
    fn passability_is_empty_or_own() {
        let mut world = World::new(&[4, 4]);
        let coord = Vector::from([2, 2]);
        assert!(world.is_passable(&coord, 1));
        world.set(&coord, Molecule::structure(1), 2);
        assert!(world.is_passable(&coord, 2));
        assert!(!world.is_passable(&coord, 1));
    }

    #[test]
    fn occupied_cells_skips_empties() {
        let mut world = World::new(&[3, 3]);
        world.set(&Vector::from([1, 1]), Molecule::energy(5), 1);
        let occupied: Vec<_> = world.occupied_cells().collect();
        assert_eq!(occupied.len(), 1);
        assert_eq!(occupied[0].0, Vector::from([1, 1]));
    }

    #[test]
    fn neighbor_ordering_matches_bitmask_layout() {
        let dirs = World::directions(2);
        assert_eq!(dirs[0], Vector::from([1, 0]));
        assert_eq!(dirs[1], Vector::from([-1, 0]));
        assert_eq!(dirs[2], Vector::from([0, 1]));
        assert_eq!(dirs[3], Vector::from([0, -1]));
    }
}
