use std::fmt;

use crate::error::{Error, Result};

// Shape: immutable dimension vector
//
//   Shape([])        scalar, 1 element
//   Shape([5])       vector, 5 elements
//   Shape([2, 3, 4]) 24 elements, row-major strides [12, 4, 1]
//
// The element count is computed once at construction. A tensor never mutates
// its shape; reshape, squeeze and friends build a new one.

/// N-dimensional shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
    size: usize,
}

impl Shape {
    /// Creates a shape from its dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        let size = dims.iter().product();
        Shape { dims, size }
    }

    /// The dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Number of elements; `1` for the scalar shape.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Size of one axis, accepting negative positions.
    pub fn dim(&self, axis: isize) -> Result<usize> {
        Ok(self.dims[self.axis(axis)?])
    }

    /// Normalizes a signed axis into `0..rank`.
    pub fn axis(&self, axis: isize) -> Result<usize> {
        normalize_index(axis, self.rank())
    }

    /// Row-major strides: `[2, 3, 4]` gives `[12, 4, 1]`.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.rank()];
        let mut stride = 1;
        for i in (0..self.rank()).rev() {
            strides[i] = stride;
            stride *= self.dims[i];
        }
        strides
    }

    /// Flat offset of a full, already normalized multi-index.
    pub fn flat_index(&self, idx: &[usize]) -> usize {
        idx.iter()
            .zip(&self.dims)
            .fold(0, |flat, (&i, &d)| flat * d + i)
    }

    /// Multi-index of a flat offset.
    pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
        let mut idx = vec![0usize; self.rank()];
        for i in (0..self.rank()).rev() {
            let d = self.dims[i];
            if d > 0 {
                idx[i] = flat % d;
                flat /= d;
            }
        }
        idx
    }

    /// This shape with `1`s prepended until it has `rank` axes.
    pub fn padded_left(&self, rank: usize) -> Shape {
        if self.rank() >= rank {
            return self.clone();
        }
        let mut dims = vec![1; rank - self.rank()];
        dims.extend_from_slice(&self.dims);
        Shape::new(dims)
    }

    /// Replaces the size of one (normalized) axis.
    pub(crate) fn with_dim(&self, axis: usize, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims[axis] = size;
        Shape::new(dims)
    }

    /// Inserts a new axis of size `size` at a (normalized) position.
    pub(crate) fn inserted(&self, axis: usize, size: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.insert(axis, size);
        Shape::new(dims)
    }

    /// Removes one (normalized) axis.
    pub(crate) fn removed(&self, axis: usize) -> Shape {
        let mut dims = self.dims.clone();
        dims.remove(axis);
        Shape::new(dims)
    }
}

/// Maps a signed position into `0..len`.
///
/// Negative positions count from the end, so `-1` is `len - 1`. Positions
/// outside `[-len, len)` fail with [`Error::IndexOutOfRange`].
pub fn normalize_index(index: isize, len: usize) -> Result<usize> {
    let err = || Error::IndexOutOfRange { index, len };
    let len_i = isize::try_from(len).map_err(|_| err())?;
    let idx = if index < 0 { len_i + index } else { index };
    if idx < 0 || idx >= len_i {
        return Err(err());
    }
    usize::try_from(idx).map_err(|_| err())
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape::new(vec![])
    }
}

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape::new(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape::new(vec![d0, d1])
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((d0, d1, d2): (usize, usize, usize)) -> Self {
        Shape::new(vec![d0, d1, d2])
    }
}

impl From<(usize, usize, usize, usize)> for Shape {
    fn from((d0, d1, d2, d3): (usize, usize, usize, usize)) -> Self {
        Shape::new(vec![d0, d1, d2, d3])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape::new(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape::new(s.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(s: [usize; N]) -> Self {
        Shape::new(s.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(s: &Shape) -> Self {
        s.clone()
    }
}
