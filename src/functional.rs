//! Differentiable helpers composed from the primitive operations.
//!
//! Nothing here defines its own backward pass; gradients flow through the
//! operations each helper is built from.

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tensors::Tensor;

impl<T: Element> Tensor<T> {
    /// Softmax along `dim`, with logits divided by `temperature` first.
    ///
    /// The maximum along `dim` is subtracted before exponentiating. It is
    /// taken from a detached copy, which leaves the result unchanged but keeps
    /// it out of the gradient.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] unless `temperature > 0`.
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    ///
    /// # Example
    /// ```
    /// use tensorgrad::Tensor;
    /// let p = Tensor::of([1.0, 1.0]).softmax(-1, 1.0).unwrap();
    /// assert_eq!(p.to_vec(), vec![0.5, 0.5]);
    /// ```
    pub fn softmax(&self, dim: isize, temperature: f64) -> Result<Tensor<T>> {
        if !(temperature > 0.0) {
            return Err(Error::argument(
                "softmax",
                format!("temperature must be positive, got {temperature}"),
            ));
        }
        let scaled = if temperature == 1.0 {
            self.clone()
        } else {
            self.div_scalar(T::from_f64(temperature))?
        };
        let max = scaled.max_along(dim, true)?.detach();
        let e = scaled.sub(&max)?.exp()?;
        let total = e.sum(dim, true)?;
        e.div(&total)
    }

    /// Population variance along `dim`.
    pub fn variance(&self, dim: isize, keep_dim: bool) -> Result<Tensor<T>> {
        let mean = self.mean(dim, true)?;
        let centered = self.sub(&mean)?;
        centered.mul(&centered)?.mean(dim, keep_dim)
    }
}
