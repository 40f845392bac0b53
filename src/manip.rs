//! Tensor utilities outside the graph.
//!
//! Everything here reads values and returns fresh leaves. No operation is
//! recorded, so gradients do not flow through these helpers.

use rand::Rng;

use crate::broadcast::{broadcast_data, broadcast_shapes};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::cpu;
use crate::shape::Shape;
use crate::tensors::Tensor;

impl<T: Element> Tensor<T> {
    fn extreme_along(&self, dim: isize, keep_dim: bool, max: bool) -> Result<Tensor<T>> {
        let (shape, data) = self.snapshot();
        let axis = shape.axis(dim)?;
        let picks = cpu::arg_extreme_axis(&data, &shape, axis, max);
        let (_, d, inner) = cpu::axis_extents(&shape, axis);
        let out = picks
            .iter()
            .enumerate()
            .map(|(j, &k)| {
                let (o, i) = (j / inner.max(1), j % inner.max(1));
                data[o * d * inner + k * inner + i]
            })
            .collect();
        let out_shape = if keep_dim {
            shape.with_dim(axis, 1)
        } else {
            shape.removed(axis)
        };
        Ok(Self::leaf(out_shape, out))
    }

    /// Largest value along `dim`.
    ///
    /// # Errors
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    /// - [`Error::ShapeMismatch`] if the axis is empty.
    pub fn max_along(&self, dim: isize, keep_dim: bool) -> Result<Tensor<T>> {
        self.check_lane("max_along", dim)?;
        self.extreme_along(dim, keep_dim, true)
    }

    /// Smallest value along `dim`.
    ///
    /// # Errors
    /// As [`Tensor::max_along`].
    pub fn min_along(&self, dim: isize, keep_dim: bool) -> Result<Tensor<T>> {
        self.check_lane("min_along", dim)?;
        self.extreme_along(dim, keep_dim, false)
    }

    fn check_lane(&self, op: &'static str, dim: isize) -> Result<()> {
        let shape = self.shape();
        if shape.dim(dim)? == 0 {
            return Err(Error::shape(op, format!("axis {dim} of {shape} is empty")));
        }
        Ok(())
    }

    fn pick(&self, other: &Tensor<T>, op: &'static str, larger: bool) -> Result<Tensor<T>> {
        let (sa, da) = self.snapshot();
        let (sb, db) = other.snapshot();
        let shape = broadcast_shapes(&sa, &sb).map_err(|_| {
            Error::shape(op, format!("{sa} and {sb} do not broadcast"))
        })?;
        let a = broadcast_data(&da, &sa, &shape)?;
        let b = broadcast_data(&db, &sb, &shape)?;
        let out = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| if (x < y) == larger { y } else { x })
            .collect();
        Ok(Self::leaf(shape, out))
    }

    /// Elementwise maximum of two broadcast-compatible tensors.
    pub fn maximum(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.pick(other, "maximum", true)
    }

    /// Elementwise minimum of two broadcast-compatible tensors.
    pub fn minimum(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.pick(other, "minimum", false)
    }

    /// The largest element, `None` for an empty tensor.
    pub fn max_value(&self) -> Option<T> {
        self.data()
            .iter()
            .copied()
            .reduce(|a, b| if b > a { b } else { a })
    }

    /// The smallest element, `None` for an empty tensor.
    pub fn min_value(&self) -> Option<T> {
        self.data()
            .iter()
            .copied()
            .reduce(|a, b| if b < a { b } else { a })
    }

    /// Flat position of the first element equal to `value`.
    pub fn index_of(&self, value: T) -> Option<usize> {
        self.data().iter().position(|&v| v == value)
    }

    /// Multi-index of the first element equal to `value`.
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::<i32>::arange((2, 3));
    /// assert_eq!(t.multi_index_of(4), Some(vec![1, 1]));
    /// assert_eq!(t.multi_index_of(9), None);
    /// ```
    pub fn multi_index_of(&self, value: T) -> Option<Vec<usize>> {
        let shape = self.shape();
        self.index_of(value).map(|flat| shape.unravel(flat))
    }

    /// Splits along `dim` into consecutive pieces of the given sizes.
    ///
    /// # Errors
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    /// - [`Error::ShapeMismatch`] unless the sizes add up to the axis size.
    pub fn split(&self, dim: isize, sizes: &[usize]) -> Result<Vec<Tensor<T>>> {
        let shape = self.shape();
        let d = shape.dim(dim)?;
        let total: usize = sizes.iter().sum();
        if total != d {
            return Err(Error::shape(
                "split",
                format!("sizes {sizes:?} cover {total} of {d} positions along axis {dim} of {shape}"),
            ));
        }
        let mut start = 0;
        let mut pieces = Vec::with_capacity(sizes.len());
        for &len in sizes {
            pieces.push(self.narrow(dim, start, len)?);
            start += len;
        }
        Ok(pieces)
    }

    /// Splits along `dim` into pieces of `size`; the last piece holds the
    /// remainder.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `size` is zero.
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let parts = Tensor::<i32>::arange(5).chunk(0, 2).unwrap();
    /// let sizes: Vec<usize> = parts.iter().map(|p| p.size()).collect();
    /// assert_eq!(sizes, vec![2, 2, 1]);
    /// ```
    pub fn chunk(&self, dim: isize, size: usize) -> Result<Vec<Tensor<T>>> {
        if size == 0 {
            return Err(Error::argument("chunk", "chunk size must be positive"));
        }
        let d = self.shape().dim(dim)?;
        let mut sizes = vec![size; d / size];
        if d % size != 0 {
            sizes.push(d % size);
        }
        self.split(dim, &sizes)
    }

    /// Stacks equally shaped tensors along a new axis `dim`.
    ///
    /// `dim` may address any position in `0..=rank`.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for an empty list.
    /// - [`Error::ShapeMismatch`] if the shapes differ.
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    pub fn stack(tensors: &[Tensor<T>], dim: isize) -> Result<Tensor<T>> {
        let Some(first) = tensors.first() else {
            return Err(Error::argument("stack", "nothing to stack"));
        };
        let shape = first.shape();
        let axis = crate::shape::normalize_index(dim, shape.rank() + 1)?;
        let parts: Vec<_> = tensors.iter().map(Tensor::snapshot).collect();
        if let Some((other, _)) = parts.iter().find(|(s, _)| *s != shape) {
            return Err(Error::shape(
                "stack",
                format!("cannot stack {other} with {shape}"),
            ));
        }
        let inner: usize = shape.dims()[axis..].iter().product();
        let outer: usize = shape.dims()[..axis].iter().product();
        let mut out = Vec::with_capacity(shape.size() * parts.len());
        for o in 0..outer {
            for (_, data) in &parts {
                out.extend_from_slice(&data[o * inner..(o + 1) * inner]);
            }
        }
        Ok(Self::leaf(shape.inserted(axis, parts.len()), out))
    }

    /// Copy of a matrix with every element above the diagonal set to `fill`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless the tensor has rank two.
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::<i32>::ones((2, 2)).tril(0).unwrap();
    /// assert_eq!(t.to_vec(), vec![1, 0, 1, 1]);
    /// ```
    pub fn tril(&self, fill: T) -> Result<Tensor<T>> {
        let (shape, data) = self.snapshot();
        let &[rows, cols] = shape.dims() else {
            return Err(Error::shape("tril", format!("expected a matrix, got {shape}")));
        };
        let mut out = data.as_ref().clone();
        for i in 0..rows {
            for v in &mut out[i * cols + (i + 1).min(cols)..(i + 1) * cols] {
                *v = fill;
            }
        }
        Ok(Self::leaf(shape, out))
    }

    /// Copy with every element whose mask entry equals `check` set to
    /// `value`. The mask is broadcast to the shape of `self`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the mask does not broadcast to `self`.
    pub fn masked_fill<U: Element>(&self, mask: &Tensor<U>, check: U, value: T) -> Result<Tensor<T>> {
        let (shape, data) = self.snapshot();
        let (mask_shape, mask_data) = mask.snapshot();
        let mask = broadcast_data(&mask_data, &mask_shape, &shape)?;
        let out = data
            .iter()
            .zip(&mask)
            .map(|(&v, &m)| if m == check { value } else { v })
            .collect();
        Ok(Self::leaf(shape, out))
    }

    /// Draws `num_samples` category indices per row, with replacement.
    ///
    /// Each row holds unnormalized non-negative weights. A rank-1 tensor is a
    /// single row and yields shape `[num_samples]`; a matrix yields
    /// `[rows, num_samples]`.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] unless the tensor has rank one or two.
    /// - [`Error::InvalidArgument`] for negative weights or a row summing to
    ///   zero.
    pub fn multinomial(&self, num_samples: usize) -> Result<Tensor<i64>> {
        let (shape, data) = self.snapshot();
        let (rows, cols) = match *shape.dims() {
            [n] => (1, n),
            [r, n] => (r, n),
            _ => {
                return Err(Error::shape(
                    "multinomial",
                    format!("expected a vector or matrix, got {shape}"),
                ));
            }
        };
        if cols == 0 {
            return Err(Error::argument("multinomial", "no categories to draw from"));
        }
        let mut rng = rand::rng();
        let mut out = Vec::with_capacity(rows * num_samples);
        for row in data.chunks(cols) {
            let weights: Vec<f64> = row.iter().map(|v| v.to_f64()).collect();
            if weights.iter().any(|w| *w < 0.0 || w.is_nan()) {
                return Err(Error::argument("multinomial", "weights must be non-negative"));
            }
            let total: f64 = weights.iter().sum();
            if !(total > 0.0) {
                return Err(Error::argument("multinomial", "a row has no positive weight"));
            }
            for _ in 0..num_samples {
                let target = rng.random::<f64>() * total;
                let mut acc = 0.0;
                // rounding can leave `target` past the last bucket
                let mut pick = cols - 1;
                for (i, w) in weights.iter().enumerate() {
                    acc += w;
                    if target < acc {
                        pick = i;
                        break;
                    }
                }
                #[allow(clippy::cast_possible_wrap)]
                out.push(pick as i64);
            }
        }
        let out_shape = if shape.rank() == 1 {
            Shape::from(num_samples)
        } else {
            Shape::from((rows, num_samples))
        };
        Ok(Tensor::leaf(out_shape, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_and_min_along_axis() {
        let t = Tensor::<f64>::from_array([[1.0, 5.0, 3.0], [4.0, 2.0, 6.0]]);
        assert_eq!(t.max_along(1, false).unwrap().to_vec(), vec![5.0, 6.0]);
        assert_eq!(t.min_along(0, true).unwrap().dims(), vec![1, 3]);
        assert_eq!(t.min_along(0, true).unwrap().to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(t.max_along(2, false).is_err());
        assert!(t.max_along(-1, true).unwrap().is_leaf());
    }

    #[test]
    fn elementwise_extremes_broadcast() {
        let a = Tensor::<i32>::from_array([[1, 5], [7, 2]]);
        let b = Tensor::<i32>::of([3, 3]);
        assert_eq!(a.maximum(&b).unwrap().to_vec(), vec![3, 5, 7, 3]);
        assert_eq!(a.minimum(&b).unwrap().to_vec(), vec![1, 3, 3, 2]);
        assert_eq!(a.max_value(), Some(7));
        assert_eq!(a.min_value(), Some(1));
        assert_eq!(Tensor::<i32>::zeros(0).max_value(), None);
    }

    #[test]
    fn split_and_chunk() {
        let t = Tensor::<i32>::arange((2, 5));
        let parts = t.split(1, &[1, 4]).unwrap();
        assert_eq!(parts[0].to_vec(), vec![0, 5]);
        assert_eq!(parts[1].dims(), vec![2, 4]);
        assert!(t.split(1, &[2, 2]).is_err());
        assert!(matches!(t.chunk(0, 0), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn stack_inserts_axis() {
        let a = Tensor::<i32>::of([1, 2]);
        let b = Tensor::<i32>::of([3, 4]);
        let s0 = Tensor::stack(&[a.clone(), b.clone()], 0).unwrap();
        assert_eq!(s0.dims(), vec![2, 2]);
        assert_eq!(s0.to_vec(), vec![1, 2, 3, 4]);
        let s1 = Tensor::stack(&[a.clone(), b], -1).unwrap();
        assert_eq!(s1.to_vec(), vec![1, 3, 2, 4]);
        assert!(Tensor::stack(&[a, Tensor::of([1])], 0).is_err());
    }

    #[test]
    fn tril_masks_upper_triangle() {
        let t = Tensor::<f64>::ones((3, 3)).tril(f64::NEG_INFINITY).unwrap();
        let inf = f64::NEG_INFINITY;
        assert_eq!(t.to_vec(), vec![1.0, inf, inf, 1.0, 1.0, inf, 1.0, 1.0, 1.0]);
        assert!(Tensor::<f64>::ones(3).tril(0.0).is_err());
    }

    #[test]
    fn masked_fill_broadcasts_mask() {
        let t = Tensor::<f64>::zeros((2, 2));
        let mask = Tensor::<bool>::of([true, false]);
        let f = t.masked_fill(&mask, true, 9.0).unwrap();
        assert_eq!(f.to_vec(), vec![9.0, 0.0, 9.0, 0.0]);
    }

    #[test]
    fn multinomial_respects_zero_weights() {
        let probs = Tensor::<f64>::from_array([[0.0, 1.0, 0.0], [0.0, 0.0, 2.0]]);
        let s = probs.multinomial(5).unwrap();
        assert_eq!(s.dims(), vec![2, 5]);
        assert_eq!(s.to_vec(), vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2]);
        assert!(Tensor::<f64>::zeros(3).multinomial(1).is_err());
    }
}
