//! Reductions along one axis.

use crate::broadcast::broadcast_data;
use crate::dtype::Element;
use crate::error::Result;
use crate::ops::{Cache, Operation, apply, cpu};
use crate::shape::Shape;
use crate::tensors::Tensor;

/// Sum or mean along an axis.
pub struct Reduce<T: Element> {
    inputs: [Tensor<T>; 1],
    axis: usize,
    keep_dim: bool,
    mean: bool,
    cache: Cache<T>,
}

impl<T: Element> Operation<T> for Reduce<T> {
    fn name(&self) -> &'static str {
        if self.mean { "mean" } else { "sum" }
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let (shape, data) = self.inputs[0].snapshot();
        #[allow(clippy::cast_precision_loss)]
        let n = shape.dims()[self.axis] as f64;
        let out = if self.mean {
            cpu::reduce_axis(&data, &shape, self.axis, |lane| lane.sum::<f64>() / n)
        } else {
            cpu::sum_axis(&data, &shape, self.axis)
        };
        let out_shape = if self.keep_dim {
            shape.with_dim(self.axis, 1)
        } else {
            shape.removed(self.axis)
        };
        self.cache.save_shape("shape", shape);
        Ok(Tensor::constant(out_shape, out))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [input] = &self.inputs;
        if !input.requires_grad() {
            return Ok(());
        }
        let shape = self.cache.shape("shape")?;
        // the gradient always has the kept-dim layout; only the shape differs
        let kept: Shape = shape.with_dim(self.axis, 1);
        let g = grad_output.data();
        let mut spread = broadcast_data(&g, &kept, &shape)?;
        if self.mean {
            #[allow(clippy::cast_precision_loss)]
            let n = shape.dims()[self.axis] as f64;
            spread = cpu::map(&spread, |v| v / n);
        }
        input.accumulate_grad(&Tensor::constant(shape, spread))
    }
}

impl<T: Element> Tensor<T> {
    fn reduce(&self, dim: isize, keep_dim: bool, mean: bool) -> Result<Tensor<T>> {
        let axis = self.shape().axis(dim)?;
        apply(Reduce {
            inputs: [self.clone()],
            axis,
            keep_dim,
            mean,
            cache: Cache::new(),
        })
    }

    /// Sums along `dim`, keeping it as a size-one axis if `keep_dim`.
    ///
    /// # Errors
    /// [`crate::Error::IndexOutOfRange`] for an invalid axis.
    ///
    /// # Example
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::from_array([[1.0, 2.0], [3.0, 4.0]]);
    /// assert_eq!(t.sum(0, false).unwrap().to_vec(), vec![4.0, 6.0]);
    /// assert_eq!(t.sum(-1, true).unwrap().dims(), vec![2, 1]);
    /// ```
    pub fn sum(&self, dim: isize, keep_dim: bool) -> Result<Tensor<T>> {
        self.reduce(dim, keep_dim, false)
    }

    /// Averages along `dim`, keeping it as a size-one axis if `keep_dim`.
    pub fn mean(&self, dim: isize, keep_dim: bool) -> Result<Tensor<T>> {
        self.reduce(dim, keep_dim, true)
    }

    /// Sum of all elements as a rank-0 tensor.
    pub fn sum_all(&self) -> Result<Tensor<T>> {
        self.flatten()?.sum(0, false)
    }

    /// Mean of all elements as a rank-0 tensor.
    pub fn mean_all(&self) -> Result<Tensor<T>> {
        self.flatten()?.mean(0, false)
    }
}
