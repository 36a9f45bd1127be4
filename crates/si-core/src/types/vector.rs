//! Tolerant floating-point vectors for orientation and position.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::name::Orientation;

/// Component-wise tolerance for vector equality.
pub const VECTOR_EPSILON: f64 = 1e-4;

/// Grid used for hashing and grouping keys.
const KEY_GRID: f64 = 2.0 * VECTOR_EPSILON;

/// A short list of floats compared with [`VECTOR_EPSILON`] tolerance.
///
/// Holds either six direction cosines (row then column) or a four-value
/// angulation plus plane code.
///
/// # Examples
///
/// ```
/// use si_core::{ApproxVector, Orientation};
///
/// let a = ApproxVector::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
/// let b = ApproxVector::new([1.0, 0.00005, 0.0, 0.0, 1.0, 0.0]);
/// assert_eq!(a, b);
/// assert_eq!(a.plane(), Orientation::Axial);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApproxVector(SmallVec<[f64; 6]>);

impl ApproxVector {
    /// Creates a vector from its components.
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self(values.into_iter().collect())
    }

    /// Returns the components.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Returns the component at `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Returns the number of components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the vector has no components.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the components snapped to the key grid.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // grid indices of direction cosines and mm positions
    pub fn quantized(&self) -> SmallVec<[i64; 6]> {
        self.0.iter().map(|v| (v / KEY_GRID).round() as i64).collect()
    }

    /// Derives the acquisition plane.
    ///
    /// Six values: the slice normal is the cross product of the row and column
    /// cosines, and its dominant axis picks the plane (x sagittal, y coronal,
    /// z axial; the first maximum wins a tie). Four values: the last one is a
    /// plane code (1 axial, 2 sagittal, 3 coronal). Anything else is
    /// [`Orientation::Unspecified`].
    #[must_use]
    pub fn plane(&self) -> Orientation {
        match self.0.as_slice() {
            [r0, r1, r2, c0, c1, c2] => {
                let normal = [r1 * c2 - r2 * c1, r2 * c0 - r0 * c2, r0 * c1 - r1 * c0];
                let mut best = 0;
                for (i, value) in normal.iter().enumerate().skip(1) {
                    if value.abs() > normal[best].abs() {
                        best = i;
                    }
                }
                match best {
                    0 => Orientation::Sagittal,
                    1 => Orientation::Coronal,
                    _ => Orientation::Axial,
                }
            }
            [_, _, _, code] => {
                if (code - 1.0).abs() < f64::EPSILON {
                    Orientation::Axial
                } else if (code - 2.0).abs() < f64::EPSILON {
                    Orientation::Sagittal
                } else if (code - 3.0).abs() < f64::EPSILON {
                    Orientation::Coronal
                } else {
                    Orientation::Unspecified
                }
            }
            _ => Orientation::Unspecified,
        }
    }
}

impl PartialEq for ApproxVector {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| (a - b).abs() <= VECTOR_EPSILON)
    }
}

impl<const N: usize> From<[f64; N]> for ApproxVector {
    fn from(values: [f64; N]) -> Self {
        Self::new(values)
    }
}
