//! Broadcasting binary arithmetic.
//!
//! | op  | forward | d/da            | d/db          |
//! |-----|---------|-----------------|---------------|
//! | add | a + b   | g               | g             |
//! | sub | a - b   | g               | -g            |
//! | mul | a * b   | g * b           | g * a         |
//! | div | a / b   | g / b           | -g * a / b^2  |
//! | pow | a ^ b   | g * b * a^(b-1) | g * (-a / b^2) |
//!
//! Derivatives are evaluated at the broadcast shape and then reduced to the
//! shape of each operand. Add, sub and mul run in the exact accumulator of the
//! element type; div and pow run in f64.

use crate::broadcast::{broadcast_data, broadcast_shapes};
use crate::dtype::Element;
use crate::error::Result;
use crate::ops::{Cache, Operation, accumulate_reduced, apply, cpu};
use crate::shape::Shape;
use crate::tensors::Tensor;

/// The arithmetic performed by a [`Binary`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
        }
    }

    /// The exact form, for ops that have one.
    fn exact<T: Element>(self) -> Option<fn(T::Acc, T::Acc) -> T::Acc> {
        let f: fn(T::Acc, T::Acc) -> T::Acc = match self {
            BinaryOp::Add => T::acc_add,
            BinaryOp::Sub => T::acc_sub,
            BinaryOp::Mul => T::acc_mul,
            BinaryOp::Div | BinaryOp::Pow => return None,
        };
        Some(f)
    }

    fn eval(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    /// Gradient with respect to the left operand.
    fn grad_lhs(self, g: f64, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => g,
            BinaryOp::Mul => g * b,
            BinaryOp::Div => g / b,
            BinaryOp::Pow => g * b * a.powf(b - 1.0),
        }
    }

    /// Gradient with respect to the right operand.
    fn grad_rhs(self, g: f64, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => g,
            BinaryOp::Sub => -g,
            BinaryOp::Mul => g * a,
            BinaryOp::Div => -g * a / (b * b),
            BinaryOp::Pow => g * (-a / (b * b)),
        }
    }
}

/// Elementwise `a <op> b` with broadcasting.
pub struct Binary<T: Element> {
    op: BinaryOp,
    inputs: [Tensor<T>; 2],
    cache: Cache<T>,
}

impl<T: Element> Binary<T> {
    pub fn new(op: BinaryOp, a: &Tensor<T>, b: &Tensor<T>) -> Self {
        Binary {
            op,
            inputs: [a.clone(), b.clone()],
            cache: Cache::new(),
        }
    }
}

impl<T: Element> Operation<T> for Binary<T> {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let [a, b] = &self.inputs;
        let (sa, da) = a.snapshot();
        let (sb, db) = b.snapshot();
        let out_shape = broadcast_shapes(&sa, &sb)?;
        let xa = broadcast_data(&da, &sa, &out_shape)?;
        let xb = broadcast_data(&db, &sb, &out_shape)?;
        let op = self.op;
        let out = match op.exact::<T>() {
            Some(f) => cpu::zip_exact(&xa, &xb, f),
            None => cpu::zip(&xa, &xb, move |x, y| op.eval(x, y)),
        };

        self.cache.save_tensor("a", a);
        self.cache.save_tensor("b", b);
        Ok(Tensor::constant(out_shape, out))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let (sg, dg) = grad_output.snapshot();
        let (sa, da) = self.cache.tensor("a")?.snapshot();
        let (sb, db) = self.cache.tensor("b")?.snapshot();
        let xa = broadcast_data(&da, &sa, &sg)?;
        let xb = broadcast_data(&db, &sb, &sg)?;
        let op = self.op;
        let [a, b] = &self.inputs;

        if a.requires_grad() {
            let ga = cpu::zip3(&dg, &xa, &xb, move |g, x, y| op.grad_lhs(g, x, y));
            accumulate_reduced(a, &ga, &sg, &sa)?;
        }
        if b.requires_grad() {
            let gb = cpu::zip3(&dg, &xa, &xb, move |g, x, y| op.grad_rhs(g, x, y));
            accumulate_reduced(b, &gb, &sg, &sb)?;
        }
        Ok(())
    }
}

impl<T: Element> Tensor<T> {
    fn binary(&self, op: BinaryOp, other: &Tensor<T>) -> Result<Tensor<T>> {
        apply(Binary::new(op, self, other))
    }

    fn binary_scalar(&self, op: BinaryOp, value: T) -> Result<Tensor<T>> {
        let rhs = Tensor::constant(Shape::from(()), vec![value]);
        self.binary(op, &rhs)
    }

    /// Elementwise `self + other` with broadcasting.
    ///
    /// # Errors
    /// [`crate::Error::ShapeMismatch`] if the shapes do not broadcast.
    ///
    /// # Example
    /// ```
    /// use tensorgrad::Tensor;
    /// let a = Tensor::from_array([[1.0, 2.0], [3.0, 4.0]]);
    /// let b = Tensor::of([10.0, 20.0]);
    /// assert_eq!(a.add(&b).unwrap().to_vec(), vec![11.0, 22.0, 13.0, 24.0]);
    /// ```
    pub fn add(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(BinaryOp::Add, other)
    }

    /// Elementwise `self - other` with broadcasting.
    pub fn sub(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(BinaryOp::Sub, other)
    }

    /// Elementwise `self * other` with broadcasting.
    pub fn mul(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(BinaryOp::Mul, other)
    }

    /// Elementwise `self / other` with broadcasting.
    pub fn div(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(BinaryOp::Div, other)
    }

    /// Elementwise `self ^ other` with broadcasting.
    ///
    /// The gradient sent to the exponent is `-g * a / b^2`.
    pub fn pow(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        self.binary(BinaryOp::Pow, other)
    }

    pub fn add_scalar(&self, value: T) -> Result<Tensor<T>> {
        self.binary_scalar(BinaryOp::Add, value)
    }

    pub fn sub_scalar(&self, value: T) -> Result<Tensor<T>> {
        self.binary_scalar(BinaryOp::Sub, value)
    }

    pub fn mul_scalar(&self, value: T) -> Result<Tensor<T>> {
        self.binary_scalar(BinaryOp::Mul, value)
    }

    pub fn div_scalar(&self, value: T) -> Result<Tensor<T>> {
        self.binary_scalar(BinaryOp::Div, value)
    }

    /// Raises every element to a constant power.
    pub fn pow_scalar(&self, exponent: T) -> Result<Tensor<T>> {
        self.binary_scalar(BinaryOp::Pow, exponent)
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Result<Tensor<T>> {
        self.mul_scalar(T::from_i64(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_gradients_have_operand_shapes() {
        let a = Tensor::<f64>::ones((2, 3));
        let b = Tensor::<f64>::of([1.0, 2.0, 3.0]);
        let c = a.mul(&b).unwrap().sum_all().unwrap();
        c.backward().unwrap();

        let ga = a.grad().unwrap();
        assert_eq!(ga.dims(), vec![2, 3]);
        assert_eq!(ga.to_vec(), vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);

        let gb = b.grad().unwrap();
        assert_eq!(gb.dims(), vec![3]);
        assert_eq!(gb.to_vec(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn div_rhs_gradient() {
        let a = Tensor::<f64>::of([6.0]);
        let b = Tensor::<f64>::of([2.0]);
        a.div(&b).unwrap().backward().unwrap();
        assert_eq!(a.grad().unwrap().to_vec(), vec![0.5]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![-1.5]);
    }

    #[test]
    fn pow_gradients() {
        let a = Tensor::<f64>::of([3.0]);
        let b = Tensor::<f64>::of([2.0]);
        let c = a.pow(&b).unwrap();
        assert_eq!(c.to_vec(), vec![9.0]);
        c.backward().unwrap();
        assert_eq!(a.grad().unwrap().to_vec(), vec![6.0]);
        assert_eq!(b.grad().unwrap().to_vec(), vec![-0.75]);
    }

    #[test]
    fn wide_integers_stay_exact() {
        let big = (1i64 << 53) + 1;
        let t = Tensor::<i64>::of([big, -big]);
        assert_eq!(t.add_scalar(0).unwrap().to_vec(), vec![big, -big]);
        assert_eq!(t.sub_scalar(1).unwrap().to_vec(), vec![big - 1, 1 - big]);
        assert_eq!(t.mul_scalar(1).unwrap().to_vec(), vec![big, -big]);
        assert_eq!(t.neg().unwrap().to_vec(), vec![-big, big]);
        let max = Tensor::<i64>::of([i64::MAX]);
        assert_eq!(max.add_scalar(1).unwrap().to_vec(), vec![i64::MAX]);
    }

    #[test]
    fn scalar_operand_stays_out_of_the_graph() {
        let a = Tensor::<f64>::of([1.0, 2.0]);
        let c = a.add_scalar(1.0).unwrap();
        assert_eq!(c.operation_name(), Some("add"));
        let parents = c.parents();
        assert_eq!(parents.len(), 2);
        assert!(!parents[1].requires_grad());
        assert_eq!(a.neg().unwrap().to_vec(), vec![-1.0, -2.0]);
    }
}
