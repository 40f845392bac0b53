//! Utilities to approximate equality of floating point values and tensors.

use crate::dtype::Element;
use crate::tensors::Tensor;

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected epsilon accepted on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon accepted on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected epsilon accepted on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon accepted on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// The approximated equality enumerated, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

impl ApproxEquality {
    fn grade(dif: f64, min: f64, avg: f64, max: f64) -> Self {
        if dif < min {
            ApproxEquality::Precise
        } else if dif < avg {
            ApproxEquality::Partial
        } else if dif < max {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }

    /// The worst grade over a sequence; `Precise` when empty.
    fn worst(grades: impl Iterator<Item = ApproxEquality>) -> Self {
        let mut eq = ApproxEquality::Precise;
        for g in grades {
            eq = eq.max(g);
            if eq == ApproxEquality::Scarce {
                break;
            }
        }
        eq
    }
}

/// Grades the distance between two values.
pub trait RelativeEq<Rhs: ?Sized> {
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f32 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        ApproxEquality::grade(
            f64::from((self - rhs).abs()),
            f64::from(F32_MIN_ERROR),
            f64::from(F32_AVG_ERROR),
            f64::from(F32_MAX_ERROR),
        )
    }
}

impl RelativeEq<Self> for f64 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        ApproxEquality::grade((self - rhs).abs(), F64_MIN_ERROR, F64_AVG_ERROR, F64_MAX_ERROR)
    }
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        ApproxEquality::worst(self.iter().zip(rhs).map(|(a, b)| a.approx_eq(b)))
    }
}

/// Tensors are graded element by element in f64; different shapes are
/// `Scarce`.
impl<T: Element> RelativeEq<Tensor<T>> for Tensor<T> {
    fn approx_eq(&self, rhs: &Tensor<T>) -> ApproxEquality {
        if self.shape() != rhs.shape() {
            return ApproxEquality::Scarce;
        }
        let (a, b) = (self.data(), rhs.data());
        ApproxEquality::worst(
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.to_f64().approx_eq(&y.to_f64())),
        )
    }
}

/// Whether `a` and `b` agree within the expected epsilon.
///
/// ```
/// use tensorgrad::{approx::approx_eq, Tensor};
/// let a = Tensor::of([1.0, 2.0]);
/// let b = Tensor::of([1.0 + 1e-9, 2.0]);
/// assert!(approx_eq(&a, &b));
/// assert!(!approx_eq(&a, &Tensor::of([1.0, 2.1])));
/// ```
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) <= ApproxEquality::Partial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_get_worse_with_distance() {
        assert_eq!(1.0f64.approx_eq(&1.0), ApproxEquality::Precise);
        assert_eq!(1.0f64.approx_eq(&(1.0 + 1e-8)), ApproxEquality::Partial);
        assert_eq!(1.0f64.approx_eq(&1.0001), ApproxEquality::Relative);
        assert_eq!(1.0f64.approx_eq(&1.1), ApproxEquality::Scarce);
    }

    #[test]
    fn slices_take_the_worst_element() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [1.0f32, 2.0001, 3.0];
        assert_eq!(a[..].approx_eq(&b[..]), ApproxEquality::Relative);
        assert_eq!(a[..].approx_eq(&b[..2]), ApproxEquality::Scarce);
    }

    #[test]
    fn tensors_compare_shapes() {
        let a = Tensor::<f64>::zeros((2, 2));
        assert!(approx_eq(&a, &Tensor::zeros((2, 2))));
        assert!(!approx_eq(&a, &Tensor::zeros(4)));
    }
}
