//! Loss operations.
//!
//! Both losses record the prediction and the target as parents, but only the
//! prediction receives a gradient. The target is broadcast to the shape of
//! the prediction.

use crate::broadcast::broadcast_data;
use crate::config::CROSS_ENTROPY_EPSILON;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::{Cache, Operation, apply, cpu};
use crate::shape::Shape;
use crate::tensors::Tensor;

/// Softmax over the last axis, in f64.
fn softmax_rows<T: Element>(data: &[T], shape: &Shape) -> Vec<f64> {
    let n = shape.dims().last().copied().unwrap_or(1);
    if n == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks(n) {
        let max = row
            .iter()
            .map(|v| v.to_f64())
            .fold(f64::NEG_INFINITY, f64::max);
        let start = out.len();
        out.extend(row.iter().map(|v| (v.to_f64() - max).exp()));
        let sum: f64 = out[start..].iter().sum();
        for v in &mut out[start..] {
            *v /= sum;
        }
    }
    out
}

/// Prediction and target snapshots with the target expanded to the
/// prediction's shape.
fn operands<T: Element>(cache: &Cache<T>) -> Result<(Shape, Vec<T>, Vec<T>)> {
    let (so, out) = cache.tensor("output")?.snapshot();
    let (st, target) = cache.tensor("target")?.snapshot();
    let target = broadcast_data(&target, &st, &so)?;
    Ok((so, out.as_ref().clone(), target))
}

/// Cross-entropy of `softmax(output)` against a probability target along the
/// last axis: `-sum(target * log(clip(p, eps, 1 - eps)), -1, keep_dim)`.
pub struct CrossEntropyLoss<T: Element> {
    inputs: [Tensor<T>; 2],
    cache: Cache<T>,
}

impl<T: Element> Operation<T> for CrossEntropyLoss<T> {
    fn name(&self) -> &'static str {
        "cross_entropy_loss"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let [output, target] = &self.inputs;
        if output.rank() == 0 {
            return Err(Error::shape(
                "cross_entropy_loss",
                "the prediction needs a class axis",
            ));
        }
        self.cache.save_tensor("output", output);
        self.cache.save_tensor("target", target);
        let (shape, out, target) = operands(&self.cache)?;
        let p = softmax_rows(&out, &shape);

        let terms: Vec<f64> = p
            .iter()
            .zip(&target)
            .map(|(&p, t)| {
                let p = p.clamp(CROSS_ENTROPY_EPSILON, 1.0 - CROSS_ENTROPY_EPSILON);
                -t.to_f64() * p.ln()
            })
            .collect();
        let last = shape.rank() - 1;
        let loss = cpu::sum_axis(&terms, &shape, last);
        Ok(Tensor::constant(
            shape.with_dim(last, 1),
            loss.into_iter().map(T::from_f64).collect(),
        ))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [output, _] = &self.inputs;
        if !output.requires_grad() {
            return Ok(());
        }
        let (shape, out, target) = operands(&self.cache)?;
        let p = softmax_rows(&out, &shape);
        let g = broadcast_data(
            &grad_output.data(),
            &shape.with_dim(shape.rank() - 1, 1),
            &shape,
        )?;
        let local = cpu::generate(p.len(), |i| {
            T::from_f64((p[i] - target[i].to_f64()) * g[i].to_f64())
        });
        output.accumulate_grad(&Tensor::constant(shape, local))
    }
}

/// Squared error summed over the first axis: `sum((output - target)^2, 0,
/// keep_dim)`.
pub struct MseLoss<T: Element> {
    inputs: [Tensor<T>; 2],
    cache: Cache<T>,
}

impl<T: Element> Operation<T> for MseLoss<T> {
    fn name(&self) -> &'static str {
        "mse_loss"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let [output, target] = &self.inputs;
        if output.rank() == 0 {
            return Err(Error::shape("mse_loss", "the prediction needs a batch axis"));
        }
        self.cache.save_tensor("output", output);
        self.cache.save_tensor("target", target);
        let (shape, out, target) = operands(&self.cache)?;
        let sq = cpu::zip(&out, &target, |o, t| (o - t) * (o - t));
        let loss = cpu::sum_axis(&sq, &shape, 0);
        Ok(Tensor::constant(shape.with_dim(0, 1), loss))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [output, _] = &self.inputs;
        if !output.requires_grad() {
            return Ok(());
        }
        let (shape, out, target) = operands(&self.cache)?;
        let g = broadcast_data(&grad_output.data(), &shape.with_dim(0, 1), &shape)?;
        let local = cpu::zip3(&out, &target, &g, |o, t, g| 2.0 * (o - t) * g);
        output.accumulate_grad(&Tensor::constant(shape, local))
    }
}

impl<T: Element> Tensor<T> {
    /// Cross-entropy between `softmax(self)` and `target` along the last axis.
    ///
    /// The result keeps the class axis with size one. The gradient sent to
    /// `self` is `(softmax(self) - target) * g`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] for a rank-0 prediction or a target that does
    /// not broadcast to it.
    pub fn cross_entropy_loss(&self, target: &Tensor<T>) -> Result<Tensor<T>> {
        apply(CrossEntropyLoss {
            inputs: [self.clone(), target.clone()],
            cache: Cache::new(),
        })
    }

    /// Squared error summed over the first axis, kept with size one.
    ///
    /// The gradient sent to `self` is `2 * (self - target) * g`.
    pub fn mse_loss(&self, target: &Tensor<T>) -> Result<Tensor<T>> {
        apply(MseLoss {
            inputs: [self.clone(), target.clone()],
            cache: Cache::new(),
        })
    }
}
