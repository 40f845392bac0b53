//! Operations that move elements without changing their values.

use log::warn;

use crate::broadcast::{broadcast_data, broadcast_shapes, reduce_to_shape};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::{Cache, Operation, apply, cpu};
use crate::shape::{Shape, normalize_index};
use crate::tensors::Tensor;

/// Gives the buffer a new shape of the same size.
pub struct Reshape<T: Element> {
    inputs: [Tensor<T>; 1],
    target: Shape,
    cache: Cache<T>,
}

impl<T: Element> Operation<T> for Reshape<T> {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let (shape, data) = self.inputs[0].snapshot();
        if shape.size() != self.target.size() {
            return Err(Error::shape(
                "reshape",
                format!(
                    "{shape} has {} elements, {} has {}",
                    shape.size(),
                    self.target,
                    self.target.size()
                ),
            ));
        }
        self.cache.save_shape("shape", shape);
        Ok(Tensor::constant(self.target.clone(), data.as_ref().clone()))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [input] = &self.inputs;
        if !input.requires_grad() {
            return Ok(());
        }
        let shape = self.cache.shape("shape")?;
        input.accumulate_grad(&Tensor::constant(shape, grad_output.to_vec()))
    }
}

/// Gives the buffer a new shape of any size, truncating or filling.
///
/// The gradient is truncated or zero-padded back to the original size.
pub struct Resize<T: Element> {
    inputs: [Tensor<T>; 1],
    target: Shape,
    fill: T,
    cache: Cache<T>,
}

fn resized<T: Element>(data: &[T], len: usize, fill: T) -> Vec<T> {
    let mut out: Vec<T> = data.iter().copied().take(len).collect();
    out.resize(len, fill);
    out
}

impl<T: Element> Operation<T> for Resize<T> {
    fn name(&self) -> &'static str {
        "resize"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let (shape, data) = self.inputs[0].snapshot();
        if shape.size() != self.target.size() {
            warn!(
                "resize {shape} -> {} changes the element count from {} to {}",
                self.target,
                shape.size(),
                self.target.size()
            );
        }
        self.cache.save_shape("shape", shape);
        Ok(Tensor::constant(
            self.target.clone(),
            resized(&data, self.target.size(), self.fill),
        ))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [input] = &self.inputs;
        if !input.requires_grad() {
            return Ok(());
        }
        let shape = self.cache.shape("shape")?;
        let g = resized(&grad_output.data(), shape.size(), T::zero());
        input.accumulate_grad(&Tensor::constant(shape, g))
    }
}

/// Swaps two axes, materializing the result.
pub struct Transpose<T: Element> {
    inputs: [Tensor<T>; 1],
    dims: (usize, usize),
}

impl<T: Element> Operation<T> for Transpose<T> {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let (shape, data) = self.inputs[0].snapshot();
        let (out, out_shape) = cpu::transpose(&data, &shape, self.dims.0, self.dims.1);
        Ok(Tensor::constant(out_shape, out))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [input] = &self.inputs;
        if !input.requires_grad() {
            return Ok(());
        }
        let (shape, g) = grad_output.snapshot();
        let (back, back_shape) = cpu::transpose(&g, &shape, self.dims.0, self.dims.1);
        input.accumulate_grad(&Tensor::constant(back_shape, back))
    }
}

/// Expands a tensor to a larger shape by repeating values.
pub struct Broadcast<T: Element> {
    inputs: [Tensor<T>; 1],
    target: Shape,
    cache: Cache<T>,
}

impl<T: Element> Operation<T> for Broadcast<T> {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let (shape, data) = self.inputs[0].snapshot();
        let out_shape = broadcast_shapes(&shape, &self.target)?;
        let out = broadcast_data(&data, &shape, &out_shape)?;
        self.cache.save_shape("shape", shape);
        Ok(Tensor::constant(out_shape, out))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [input] = &self.inputs;
        if !input.requires_grad() {
            return Ok(());
        }
        let shape = self.cache.shape("shape")?;
        let (gs, g) = grad_output.snapshot();
        let back = reduce_to_shape(&g, &gs, &shape)?;
        input.accumulate_grad(&Tensor::constant(shape, back))
    }
}

impl<T: Element> Tensor<T> {
    /// Same elements, new shape.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the sizes differ; use [`Tensor::resize`]
    /// to change the element count.
    pub fn reshape(&self, shape: impl Into<Shape>) -> Result<Tensor<T>> {
        apply(Reshape {
            inputs: [self.clone()],
            target: shape.into(),
            cache: Cache::new(),
        })
    }

    /// Reshapes to a possibly different element count.
    ///
    /// Extra elements are dropped from the end; missing ones are set to
    /// `fill`. Logs a warning whenever the count changes.
    pub fn resize(&self, shape: impl Into<Shape>, fill: T) -> Result<Tensor<T>> {
        apply(Resize {
            inputs: [self.clone()],
            target: shape.into(),
            fill,
            cache: Cache::new(),
        })
    }

    /// Inserts an axis of size one. `dim` may be negative and is taken
    /// relative to the new rank, so `-1` appends an axis.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] unless `dim` lies in `[-(rank+1), rank]`.
    pub fn unsqueeze(&self, dim: isize) -> Result<Tensor<T>> {
        let shape = self.shape();
        let axis = normalize_index(dim, shape.rank() + 1)?;
        self.reshape(shape.inserted(axis, 1))
    }

    /// Removes an axis of size one.
    ///
    /// # Errors
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    /// - [`Error::ShapeMismatch`] if the axis is not of size one.
    pub fn squeeze(&self, dim: isize) -> Result<Tensor<T>> {
        let shape = self.shape();
        let axis = shape.axis(dim)?;
        if shape.dims()[axis] != 1 {
            return Err(Error::shape(
                "squeeze",
                format!("axis {axis} of {shape} is not of size 1"),
            ));
        }
        self.reshape(shape.removed(axis))
    }

    /// Removes every axis of size one.
    pub fn squeeze_all(&self) -> Result<Tensor<T>> {
        let shape = self.shape();
        let dims: Vec<usize> = shape.dims().iter().copied().filter(|&d| d != 1).collect();
        self.reshape(dims)
    }

    /// Reshapes to one dimension.
    pub fn flatten(&self) -> Result<Tensor<T>> {
        let size = self.size();
        self.reshape(size)
    }

    /// Swaps axes `dim0` and `dim1`. The result is a new buffer, not a view.
    ///
    /// # Errors
    /// [`Error::IndexOutOfRange`] for an invalid axis.
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Result<Tensor<T>> {
        let shape = self.shape();
        let dims = (shape.axis(dim0)?, shape.axis(dim1)?);
        apply(Transpose {
            inputs: [self.clone()],
            dims,
        })
    }

    /// Swaps the last two axes.
    pub fn t(&self) -> Result<Tensor<T>> {
        self.transpose(-2, -1)
    }

    /// Expands to the broadcast of this tensor's shape with `shape`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes do not broadcast.
    pub fn broadcast_to(&self, shape: impl Into<Shape>) -> Result<Tensor<T>> {
        apply(Broadcast {
            inputs: [self.clone()],
            target: shape.into(),
            cache: Cache::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_requires_same_size() {
        let t = Tensor::<f64>::arange((2, 3));
        assert_eq!(t.reshape((3, 2)).unwrap().dims(), vec![3, 2]);
        assert!(matches!(t.reshape(4), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn resize_pads_and_truncates() {
        let t = Tensor::<f64>::of([1.0, 2.0, 3.0]);
        let r = t.resize((2, 2), 9.0).unwrap();
        assert_eq!(r.to_vec(), vec![1.0, 2.0, 3.0, 9.0]);
        r.sum_all().unwrap().backward().unwrap();
        assert_eq!(t.grad().unwrap().to_vec(), vec![1.0, 1.0, 1.0]);
        assert_eq!(t.resize(2, 0.0).unwrap().to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn unsqueeze_and_squeeze_positions() {
        let t = Tensor::<f64>::zeros((2, 3));
        assert_eq!(t.unsqueeze(0).unwrap().dims(), vec![1, 2, 3]);
        assert_eq!(t.unsqueeze(-1).unwrap().dims(), vec![2, 3, 1]);
        assert_eq!(t.unsqueeze(1).unwrap().dims(), vec![2, 1, 3]);
        let u = t.unsqueeze(1).unwrap();
        assert_eq!(u.squeeze(-2).unwrap().dims(), vec![2, 3]);
        assert!(u.squeeze(0).is_err());
        assert!(t.unsqueeze(4).is_err());
    }

    #[test]
    fn transpose_gradient_is_transposed_back() {
        let t = Tensor::<f64>::arange((2, 3));
        let w = Tensor::<f64>::arange((3, 2));
        let y = t.transpose(0, 1).unwrap();
        assert_eq!(y.to_vec(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        y.mul(&w).unwrap().sum_all().unwrap().backward().unwrap();
        let g = t.grad().unwrap();
        assert_eq!(g.dims(), vec![2, 3]);
        assert_eq!(g.to_vec(), vec![0.0, 2.0, 4.0, 1.0, 3.0, 5.0]);
    }

    #[test]
    fn broadcast_gradient_is_summed() {
        let t = Tensor::<f64>::of([1.0, 2.0]);
        let b = t.broadcast_to((3, 2)).unwrap();
        assert_eq!(b.dims(), vec![3, 2]);
        b.sum_all().unwrap().backward().unwrap();
        assert_eq!(t.grad().unwrap().to_vec(), vec![3.0, 3.0]);
    }
}
