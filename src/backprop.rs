//! Reverse-mode automatic differentiation.
//!
//! # Backward Pass
//!
//! Tensor methods record a graph as they run: every output knows its parents
//! and the operation that produced it. [`Tensor::backward`] walks that graph
//! from the output back to the leaves:
//!
//! 1. **Order** the reachable nodes with a depth-first postorder, so every
//!    node comes after all of its parents.
//! 2. **Seed** the starting tensor with a gradient of ones, unless it already
//!    holds one.
//! 3. **Propagate** in reverse order: every node that has an operation and a
//!    gradient hands that gradient to [`Operation::backward`], which adds the
//!    operands' shares with [`Tensor::accumulate_grad`].
//!
//! Nodes are identified by [`TensorId`], never by value, so a tensor reached
//! along two paths (a diamond) is processed once, after both contributions
//! have been added to it.
//!
//! ## Gradients
//!
//! - Gradients always have the shape of the tensor that owns them.
//! - Incoming gradients are added, never overwritten.
//! - Gradients never require gradients themselves; there is no second-order
//!   differentiation.
//!
//! A failed backward pass leaves the gradients of the traversal undefined.
//! Discard the graph, call [`Tensor::zero_grad`] and rebuild.
//!
//! ## Example
//!
//! ```rust
//! use tensorgrad::Tensor;
//!
//! let a = Tensor::of([2.0, 3.0]);
//! let c = a.mul(&a).unwrap().sum_all().unwrap();
//! c.backward().unwrap();
//! assert_eq!(a.grad().unwrap().to_vec(), vec![4.0, 6.0]);
//! ```

use std::collections::HashSet;

use log::{debug, trace};

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::{Operation, cpu};
use crate::tensors::{Tensor, TensorId};

/// All tensors reachable from `root` through parent links, each after its
/// parents. `root` comes last.
///
/// The walk is iterative, so deep graphs do not exhaust the stack.
pub fn topological_order<T: Element>(root: &Tensor<T>) -> Vec<Tensor<T>> {
    let mut visited: HashSet<TensorId> = HashSet::new();
    let mut order = Vec::new();
    // (node, parents already pushed)
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        let parents = node.parents();
        stack.push((node, true));
        for parent in parents.into_iter().rev() {
            if !visited.contains(&parent.id()) {
                stack.push((parent, false));
            }
        }
    }
    order
}

impl<T: Element> Tensor<T> {
    /// Computes the gradient of this tensor with respect to every tensor it
    /// was computed from.
    ///
    /// If this tensor has no gradient yet it is seeded with ones of its own
    /// shape, so for a scalar loss the result is `d loss / d x` in `x.grad()`.
    ///
    /// # Errors
    /// - [`Error::InvalidAutogradState`] if this tensor does not require
    ///   gradients, or an operation misses a value saved during forward.
    /// - Any error raised by an operation's backward pass.
    pub fn backward(&self) -> Result<()> {
        if !self.requires_grad() {
            return Err(Error::autograd(
                "cannot backpropagate from a tensor that does not require gradients",
            ));
        }
        {
            let mut st = self.write();
            if st.grad.is_none() {
                let ones = vec![T::one(); st.shape.size()];
                st.grad = Some(Tensor::constant(st.shape.clone(), ones));
            }
        }
        self.propagate()
    }

    /// Like [`Tensor::backward`], but seeds with `grad` instead of ones.
    ///
    /// The seed is added to any gradient this tensor already holds.
    ///
    /// # Errors
    /// As [`Tensor::backward`], plus [`Error::ShapeMismatch`] if `grad` does
    /// not have this tensor's shape.
    pub fn backward_with_grad(&self, grad: &Tensor<T>) -> Result<()> {
        if !self.requires_grad() {
            return Err(Error::autograd(
                "cannot backpropagate from a tensor that does not require gradients",
            ));
        }
        self.accumulate_grad(grad)?;
        self.propagate()
    }

    fn propagate(&self) -> Result<()> {
        let order = topological_order(self);
        debug!("backward from {} over {} nodes", self.id(), order.len());

        for node in order.iter().rev() {
            let (operation, grad) = {
                let st = node.read();
                (st.operation.clone(), st.grad.clone())
            };
            let (Some(operation), Some(grad)) = (operation, grad) else {
                continue;
            };
            trace!("backward through {} at {}", operation.name(), node.id());
            operation.backward(&grad)?;
        }
        Ok(())
    }

    /// Adds `grad` into this tensor's gradient slot.
    ///
    /// Does nothing if this tensor does not require gradients. The stored
    /// gradient is a detached copy that never requires gradients; `grad`
    /// itself is left untouched.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `grad` does not have this tensor's shape.
    pub fn accumulate_grad(&self, grad: &Tensor<T>) -> Result<()> {
        let (g_shape, g_data) = grad.snapshot();
        let mut st = self.write();
        if !st.requires_grad {
            return Ok(());
        }
        if g_shape != st.shape {
            return Err(Error::shape(
                "accumulate_grad",
                format!("gradient of shape {g_shape} for a tensor of shape {}", st.shape),
            ));
        }
        let sum = match &st.grad {
            None => g_data.as_ref().clone(),
            Some(existing) => cpu::zip_exact(&existing.data(), &g_data, T::acc_add),
        };
        st.grad = Some(Tensor::constant(g_shape, sum));
        Ok(())
    }

    /// Clears the gradient, operation and parents of this tensor and of every
    /// tensor reachable from it.
    ///
    /// This cuts the recorded history so leaves can be reused in the next
    /// step without holding on to the old graph.
    pub fn zero_grad(&self) {
        let order = topological_order(self);
        debug!("zero_grad from {} over {} nodes", self.id(), order.len());
        for node in &order {
            let mut st = node.write();
            st.grad = None;
            st.operation = None;
            st.parents.clear();
        }
    }
}
