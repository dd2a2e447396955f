//! N-dimensional integer vectors used for coordinates and directions.

use std::fmt;

use smallvec::SmallVec;

/// Component storage; worlds rarely exceed four axes, so components stay inline.
type Components = SmallVec<[i64; 4]>;

/// An n-dimensional integer vector.
///
/// Used both for relative offsets (directions, label targets) and absolute
/// world coordinates. All world-coordinate arithmetic goes through
/// [`Vector::wrapped`] so positions stay inside the torus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Vector(Components);

impl Vector {
    #[must_use]
    pub fn new(components: impl Into<Components>) -> Self {
        Self(components.into())
    }

    /// The zero vector of the given dimensionality.
    #[must_use]
    pub fn zero(dims: usize) -> Self {
        Self(std::iter::repeat(0).take(dims).collect())
    }

    /// The unit vector along `axis`, with the given sign.
    ///
    /// # Panics
    /// Panics if `axis >= dims`.
    #[must_use]
    pub fn unit(dims: usize, axis: usize, negative: bool) -> Self {
        assert!(axis < dims, "axis out of range");
        let mut v = Self::zero(dims);
        v.0[axis] = if negative { -1 } else { 1 };
        v
    }

    #[inline]
    #[must_use]
    pub fn dims(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn components(&self) -> &[i64] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn get(&self, axis: usize) -> i64 {
        self.0[axis]
    }

    pub fn set(&mut self, axis: usize, value: i64) {
        self.0[axis] = value;
    }

    /// Component-wise sum. Both vectors must have equal dimensionality.
    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        debug_assert_eq!(self.dims(), other.dims());
        Self(self.0.iter().zip(&other.0).map(|(a, b)| a + b).collect())
    }

    /// Component-wise scale by an integer factor.
    #[must_use]
    pub fn scaled(&self, factor: i64) -> Self {
        Self(self.0.iter().map(|c| c * factor).collect())
    }

    /// Wraps each component into `[0, shape[axis])` (Euclidean remainder).
    #[must_use]
    pub fn wrapped(&self, shape: &[i64]) -> Self {
        debug_assert_eq!(self.dims(), shape.len());
        Self(
            self.0
                .iter()
                .zip(shape)
                .map(|(c, s)| c.rem_euclid(*s))
                .collect(),
        )
    }

    /// Returns `Some((axis, negative))` when this is an axis-aligned unit
    /// vector, which is the only legal shape for a direction vector.
    #[must_use]
    pub fn as_unit_axis(&self) -> Option<(usize, bool)> {
        let mut found = None;
        for (axis, &c) in self.0.iter().enumerate() {
            match c {
                0 => {}
                1 | -1 if found.is_none() => found = Some((axis, c < 0)),
                _ => return None,
            }
        }
        found
    }

    /// Swaps the components on the two given axes.
    ///
    /// This is the `RTRR` rotation primitive; out-of-range axes are the
    /// caller's responsibility to reject.
    pub fn rotate(&mut self, a: usize, b: usize) {
        self.0.swap(a, b);
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl From<&[i64]> for Vector {
    fn from(components: &[i64]) -> Self {
        Self(components.iter().copied().collect())
    }
}

impl<const N: usize> From<[i64; N]> for Vector {
    fn from(components: [i64; N]) -> Self {
        Self(components.as_slice().iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_is_toroidal_on_negative_components() {
        let v = Vector::from([-1, 5]);
        assert_eq!(v.wrapped(&[4, 4]), Vector::from([3, 1]));
    }

    #[test]
    fn unit_axis_detection() {
        assert_eq!(Vector::from([0, -1]).as_unit_axis(), Some((1, true)));
        assert_eq!(Vector::from([1, 1]).as_unit_axis(), None);
        assert_eq!(Vector::from([0, 0]).as_unit_axis(), None);
        assert_eq!(Vector::from([2, 0]).as_unit_axis(), None);
    }

    #[test]
    fn display_uses_pipe_separators() {
        assert_eq!(Vector::from([1, 0, -1]).to_string(), "1|0|-1");
    }
}
