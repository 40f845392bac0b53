//! # Operation Layer
//!
//! Every differentiable tensor method is backed by an [`Operation`]. The
//! operation captures its operands when it is built, computes the result in
//! [`Operation::forward`], and knows how to push a gradient back to each
//! operand in [`Operation::backward`].
//!
//! ## Recording
//!
//! Tensor methods never call `forward` directly. They hand the operation to
//! [`apply`], which runs `forward` and stamps the output:
//!
//! - `requires_grad` is true if any operand requires it
//! - `parents` are the operands, `operation` is the op itself
//! - `is_leaf` is false
//!
//! Repeated calls build the graph with no extra bookkeeping on the caller's
//! side.
//!
//! ## Backward Contract
//!
//! `backward(grad_output)` computes the local derivative at the broadcast
//! shape of the forward pass, reduces it to each operand's original shape
//! with [`crate::broadcast::reduce_to_shape`], and adds it into the operand
//! with [`Tensor::accumulate_grad`]. Gradients are only ever added, never
//! overwritten, so a tensor used twice receives both contributions.
//!
//! Operand values needed by `backward` are kept in a [`Cache`] as detached
//! snapshots taken during `forward`; a later [`Tensor::update`] of an operand
//! does not change what `backward` sees.
//!
//! ## Submodules
//!
//! - [`arith`]: add, sub, mul, div, pow and their scalar forms
//! - [`unary`]: exp, log, root, clip and the activation functions
//! - [`shape`]: reshape, resize, transpose, broadcast
//! - [`reduce`]: sum and mean along an axis
//! - [`matmul`]: batched matrix product, built on [`block`]
//! - [`loss`]: cross-entropy and mean squared error
//! - [`cpu`]: parallel kernels shared by all of the above

pub mod arith;
pub mod block;
pub mod cpu;
pub mod loss;
pub mod matmul;
pub mod reduce;
pub mod shape;
pub mod unary;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::broadcast;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensors::Tensor;

/// A differentiable computation producing exactly one tensor.
pub trait Operation<T: Element>: Send + Sync {
    /// Short lowercase name, used in logs and [`Tensor::operation_name`].
    fn name(&self) -> &'static str;

    /// The operands, in the order they become the output's parents.
    fn inputs(&self) -> &[Tensor<T>];

    /// Computes the output value.
    ///
    /// Must not touch gradient state; [`apply`] records the graph edges.
    fn forward(&self) -> Result<Tensor<T>>;

    /// Adds the gradient of each operand, given the gradient of the output.
    fn backward(&self, grad_output: &Tensor<T>) -> Result<()>;
}

/// Runs `op` and records it as the producer of its output.
pub fn apply<T: Element, O: Operation<T> + 'static>(op: O) -> Result<Tensor<T>> {
    let out = op.forward()?;
    let parents = op.inputs().to_vec();
    let requires_grad = parents.iter().any(Tensor::requires_grad);
    out.stamp(requires_grad, parents, Arc::new(op));
    Ok(out)
}

/// A value saved during forward for use in backward.
#[derive(Clone)]
pub enum Saved<T: Element> {
    Shape(Shape),
    Tensor(Tensor<T>),
    Scalar(f64),
}

/// String-keyed store of [`Saved`] values, one per operation.
pub struct Cache<T: Element> {
    entries: Mutex<HashMap<&'static str, Saved<T>>>,
}

impl<T: Element> Default for Cache<T> {
    fn default() -> Self {
        Cache {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Element> Cache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, key: &'static str, value: Saved<T>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    fn take(&self, key: &'static str) -> Result<Saved<T>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::autograd(format!("`{key}` was not saved for backward")))
    }

    pub fn save_shape(&self, key: &'static str, shape: Shape) {
        self.put(key, Saved::Shape(shape));
    }

    /// Saves a detached snapshot of `tensor`.
    pub fn save_tensor(&self, key: &'static str, tensor: &Tensor<T>) {
        self.put(key, Saved::Tensor(tensor.detach()));
    }

    pub fn save_scalar(&self, key: &'static str, value: f64) {
        self.put(key, Saved::Scalar(value));
    }

    /// # Errors
    /// [`Error::InvalidAutogradState`] if no shape was saved under `key`.
    pub fn shape(&self, key: &'static str) -> Result<Shape> {
        match self.take(key)? {
            Saved::Shape(s) => Ok(s),
            _ => Err(Error::autograd(format!("`{key}` is not a saved shape"))),
        }
    }

    /// # Errors
    /// [`Error::InvalidAutogradState`] if no tensor was saved under `key`.
    pub fn tensor(&self, key: &'static str) -> Result<Tensor<T>> {
        match self.take(key)? {
            Saved::Tensor(t) => Ok(t),
            _ => Err(Error::autograd(format!("`{key}` is not a saved tensor"))),
        }
    }

    /// # Errors
    /// [`Error::InvalidAutogradState`] if no scalar was saved under `key`.
    pub fn scalar(&self, key: &'static str) -> Result<f64> {
        match self.take(key)? {
            Saved::Scalar(v) => Ok(v),
            _ => Err(Error::autograd(format!("`{key}` is not a saved scalar"))),
        }
    }
}

/// Reduces a local gradient of shape `from` to `input`'s pre-broadcast shape
/// `to` and adds it into `input`.
pub(crate) fn accumulate_reduced<T: Element>(
    input: &Tensor<T>,
    local: &[T],
    from: &Shape,
    to: &Shape,
) -> Result<()> {
    if !input.requires_grad() {
        return Ok(());
    }
    let reduced = broadcast::reduce_to_shape(local, from, to)?;
    input.accumulate_grad(&Tensor::constant(to.clone(), reduced))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cache_entry_is_an_autograd_error() {
        let cache = Cache::<f64>::new();
        assert!(matches!(
            cache.tensor("a"),
            Err(Error::InvalidAutogradState(_))
        ));
        cache.save_scalar("a", 1.0);
        assert!(cache.tensor("a").is_err());
        assert_eq!(cache.scalar("a").unwrap(), 1.0);
    }

    #[test]
    fn snapshots_survive_updates() {
        let cache = Cache::new();
        let x = Tensor::<f64>::of([1.0, 2.0]);
        cache.save_tensor("x", &x);
        x.update(&Tensor::of([5.0, 6.0]), true).unwrap();
        assert_eq!(cache.tensor("x").unwrap().to_vec(), vec![1.0, 2.0]);
    }
}
