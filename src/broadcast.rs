//! Shape unification and its inverse.
//!
//! Shapes are right-aligned and the shorter one is padded with leading `1`s.
//! Each resulting axis is the larger of the two sizes, and the sizes must be
//! equal or one of them must be `1`.
//!
//! ```text
//!   [   3, 1]        [2, 3, 4]
//!   [2, 1, 4]   ->   broadcast result
//! ```
//!
//! [`broadcast_data`] repeats values along the padded axes, and
//! [`reduce_to_shape`] sums them back. Every backward pass of an operation
//! that broadcasts its operands runs its gradient through [`reduce_to_shape`],
//! so stored gradients always have the shape of the tensor that owns them.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::cpu;
use crate::shape::Shape;

/// Computes the common shape of `a` and `b`.
///
/// # Errors
/// [`Error::ShapeMismatch`] when an axis has two different sizes, neither `1`.
///
/// # Example
/// ```
/// use tensorgrad::{broadcast::broadcast_shapes, Shape};
/// let s = broadcast_shapes(&Shape::from((3, 1)), &Shape::from((2, 1, 4))).unwrap();
/// assert_eq!(s.dims(), &[2, 3, 4]);
/// ```
pub fn broadcast_shapes(a: &Shape, b: &Shape) -> Result<Shape> {
    let rank = a.rank().max(b.rank());
    let pa = a.padded_left(rank);
    let pb = b.padded_left(rank);
    let mut dims = Vec::with_capacity(rank);
    for (&x, &y) in pa.dims().iter().zip(pb.dims()) {
        if x != y && x != 1 && y != 1 {
            return Err(Error::shape(
                "broadcast",
                format!("{a} and {b} are not compatible"),
            ));
        }
        dims.push(if x == 1 { y } else { x });
    }
    Ok(Shape::new(dims))
}

/// Expands `data` of shape `from` to shape `to`.
///
/// Every output position is unraveled and mapped back to a source position,
/// with padded axes of size one contributing no offset.
///
/// # Errors
/// [`Error::ShapeMismatch`] if `from` does not broadcast to exactly `to`.
pub fn broadcast_data<T: Copy + Send + Sync>(data: &[T], from: &Shape, to: &Shape) -> Result<Vec<T>> {
    if from == to {
        return Ok(data.to_vec());
    }
    if to.rank() < from.rank() || broadcast_shapes(from, to)? != *to {
        return Err(Error::shape(
            "broadcast",
            format!("cannot expand {from} to {to}"),
        ));
    }
    let padded = from.padded_left(to.rank());
    let strides: Vec<usize> = padded
        .strides()
        .into_iter()
        .zip(padded.dims())
        .map(|(s, &d)| if d == 1 { 0 } else { s })
        .collect();
    Ok(cpu::generate(to.size(), |flat| {
        let src: usize = to
            .unravel(flat)
            .iter()
            .zip(&strides)
            .map(|(i, s)| i * s)
            .sum();
        data[src]
    }))
}

/// Sums `data` of shape `from` down to shape `to`, undoing a broadcast.
///
/// Leading axes that `to` lacks are summed away. Then every axis where `to`
/// has size one but `from` does not is summed with the axis kept.
///
/// # Errors
/// [`Error::ShapeMismatch`] if `to` cannot broadcast to `from`.
pub fn reduce_to_shape<T: Element>(data: &[T], from: &Shape, to: &Shape) -> Result<Vec<T>> {
    if from == to {
        return Ok(data.to_vec());
    }
    let mismatch = || Error::shape("reduce", format!("cannot reduce {from} to {to}"));
    if to.rank() > from.rank() {
        return Err(mismatch());
    }

    let mut cur = data.to_vec();
    let mut shape = from.clone();
    while shape.rank() > to.rank() {
        cur = cpu::sum_axis(&cur, &shape, 0);
        shape = shape.removed(0);
    }
    for axis in 0..to.rank() {
        let (want, have) = (to.dims()[axis], shape.dims()[axis]);
        if want == have {
            continue;
        }
        if want != 1 {
            return Err(mismatch());
        }
        cur = cpu::sum_axis(&cur, &shape, axis);
        shape = shape.with_dim(axis, 1);
    }
    if shape != *to {
        return Err(mismatch());
    }
    Ok(cur)
}
