//! Elementwise functions of one tensor.
//!
//! Each [`UnaryOp`] carries its forward function and the derivative used in
//! backward. The backward pass multiplies the upstream gradient by the
//! derivative evaluated at a snapshot of the input.

use crate::config::LOG_EPSILON;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::{Cache, Operation, apply, cpu};
use crate::tensors::Tensor;

const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;
const GELU_COEFF: f64 = 0.044_715;

/// The function applied by a [`Unary`] operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Exp,
    Log,
    /// `x^(1/degree)`
    Root(f64),
    /// Clamp into `[min, max]`; the gradient passes only inside the interval.
    Clip(f64, f64),
    Sigmoid,
    Tanh,
    /// Tanh approximation of the Gaussian error linear unit.
    Gelu,
    /// `x` for positive inputs, `alpha * x` otherwise.
    LeakyRelu(f64),
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl UnaryOp {
    fn name(self) -> &'static str {
        match self {
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Root(_) => "root",
            UnaryOp::Clip(..) => "clip",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Gelu => "gelu",
            UnaryOp::LeakyRelu(_) => "leaky_relu",
        }
    }

    fn eval(self, x: f64) -> f64 {
        match self {
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Root(degree) => x.powf(1.0 / degree),
            UnaryOp::Clip(min, max) => x.max(min).min(max),
            UnaryOp::Sigmoid => sigmoid(x),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Gelu => {
                0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + GELU_COEFF * x.powi(3))).tanh())
            }
            UnaryOp::LeakyRelu(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
        }
    }

    fn derivative(self, x: f64) -> f64 {
        match self {
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => 1.0 / x.max(LOG_EPSILON),
            UnaryOp::Root(degree) => (1.0 / degree) * x.powf(1.0 / degree - 1.0),
            UnaryOp::Clip(min, max) => {
                if (min..=max).contains(&x) {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryOp::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            UnaryOp::Tanh => 1.0 - x.tanh().powi(2),
            UnaryOp::Gelu => {
                let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x.powi(3));
                let t = inner.tanh();
                let d_inner = SQRT_2_OVER_PI * (1.0 + 3.0 * GELU_COEFF * x * x);
                0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * d_inner
            }
            UnaryOp::LeakyRelu(alpha) => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }
}

pub struct Unary<T: Element> {
    op: UnaryOp,
    inputs: [Tensor<T>; 1],
    cache: Cache<T>,
}

impl<T: Element> Unary<T> {
    pub fn new(op: UnaryOp, input: &Tensor<T>) -> Self {
        Unary {
            op,
            inputs: [input.clone()],
            cache: Cache::new(),
        }
    }
}

impl<T: Element> Operation<T> for Unary<T> {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let [x] = &self.inputs;
        let (shape, data) = x.snapshot();
        let op = self.op;
        self.cache.save_tensor("x", x);
        Ok(Tensor::constant(shape, cpu::map(&data, move |v| op.eval(v))))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [input] = &self.inputs;
        if !input.requires_grad() {
            return Ok(());
        }
        let (shape, x) = self.cache.tensor("x")?.snapshot();
        let g = grad_output.data();
        let op = self.op;
        let local = cpu::zip(&g, &x, move |g, x| g * op.derivative(x));
        input.accumulate_grad(&Tensor::constant(shape, local))
    }
}

impl<T: Element> Tensor<T> {
    fn unary(&self, op: UnaryOp) -> Result<Tensor<T>> {
        apply(Unary::new(op, self))
    }

    /// Elementwise `e^x`.
    pub fn exp(&self) -> Result<Tensor<T>> {
        self.unary(UnaryOp::Exp)
    }

    /// Elementwise natural logarithm.
    ///
    /// The derivative clamps its input to at least `1e-7`, so zeros yield a
    /// large but finite gradient.
    pub fn log(&self) -> Result<Tensor<T>> {
        self.unary(UnaryOp::Log)
    }

    /// Elementwise `x^(1/degree)`.
    pub fn root(&self, degree: f64) -> Result<Tensor<T>> {
        self.unary(UnaryOp::Root(degree))
    }

    pub fn sqrt(&self) -> Result<Tensor<T>> {
        self.root(2.0)
    }

    /// Clamps every element into `[min, max]`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `min > max` or either bound is NaN.
    pub fn clip(&self, min: f64, max: f64) -> Result<Tensor<T>> {
        if !(min <= max) {
            return Err(Error::argument(
                "clip",
                format!("lower bound {min} exceeds upper bound {max}"),
            ));
        }
        self.unary(UnaryOp::Clip(min, max))
    }

    /// `max(x, 0)`, expressed as a clip.
    pub fn relu(&self) -> Result<Tensor<T>> {
        self.clip(0.0, f64::INFINITY)
    }

    pub fn leaky_relu(&self, alpha: f64) -> Result<Tensor<T>> {
        self.unary(UnaryOp::LeakyRelu(alpha))
    }

    pub fn sigmoid(&self) -> Result<Tensor<T>> {
        self.unary(UnaryOp::Sigmoid)
    }

    pub fn tanh(&self) -> Result<Tensor<T>> {
        self.unary(UnaryOp::Tanh)
    }

    pub fn gelu(&self) -> Result<Tensor<T>> {
        self.unary(UnaryOp::Gelu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::F64_AVG_ERROR;

    fn grad_of(x: f64, f: impl Fn(&Tensor<f64>) -> Result<Tensor<f64>>) -> f64 {
        let t = Tensor::of([x]);
        f(&t).unwrap().backward().unwrap();
        t.grad().unwrap().item().unwrap()
    }

    #[test]
    fn derivatives_match_closed_forms() {
        assert!((grad_of(1.0, Tensor::exp) - 1f64.exp()).abs() < F64_AVG_ERROR);
        assert!((grad_of(4.0, Tensor::log) - 0.25).abs() < F64_AVG_ERROR);
        assert!((grad_of(4.0, Tensor::sqrt) - 0.25).abs() < F64_AVG_ERROR);
        assert!((grad_of(0.0, Tensor::sigmoid) - 0.25).abs() < F64_AVG_ERROR);
        assert!((grad_of(0.0, Tensor::tanh) - 1.0).abs() < F64_AVG_ERROR);
        assert!((grad_of(0.0, Tensor::gelu) - 0.5).abs() < F64_AVG_ERROR);
    }

    #[test]
    fn log_derivative_is_clamped() {
        assert!((grad_of(0.0, Tensor::log) - 1e7).abs() < 1e-3);
    }

    #[test]
    fn clip_masks_gradient() {
        let t = Tensor::<f64>::of([-2.0, 0.5, 3.0]);
        let c = t.clip(0.0, 1.0).unwrap();
        assert_eq!(c.to_vec(), vec![0.0, 0.5, 1.0]);
        c.sum_all().unwrap().backward().unwrap();
        assert_eq!(t.grad().unwrap().to_vec(), vec![0.0, 1.0, 0.0]);
        assert!(t.clip(1.0, 0.0).is_err());
    }

    #[test]
    fn leaky_relu_slope() {
        let t = Tensor::<f64>::of([-2.0, 3.0]);
        let y = t.leaky_relu(0.1).unwrap();
        assert!(y.allclose(&Tensor::of([-0.2, 3.0]), F64_AVG_ERROR));
        y.sum_all().unwrap().backward().unwrap();
        assert!(t.grad().unwrap().allclose(&Tensor::of([0.1, 1.0]), F64_AVG_ERROR));
    }
}
