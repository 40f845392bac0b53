//! Differentiable matrix product.

use crate::broadcast::{broadcast_shapes, reduce_to_shape};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::ops::{Cache, Operation, apply, block, cpu};
use crate::shape::Shape;
use crate::tensors::Tensor;

/// `a @ b` with batch broadcasting; see [`block::matmul`] for the layout.
pub struct MatMul<T: Element> {
    inputs: [Tensor<T>; 2],
    cache: Cache<T>,
}

/// Lifts a rank-1 operand to a matrix: a row on the left, a column on the
/// right.
fn lifted(shape: &Shape, left: bool) -> Shape {
    match (shape.rank(), left) {
        (1, true) => shape.inserted(0, 1),
        (1, false) => shape.inserted(1, 1),
        _ => shape.clone(),
    }
}

fn transpose_last<T: Element>(data: &[T], shape: &Shape) -> (Vec<T>, Shape) {
    let r = shape.rank();
    cpu::transpose(data, shape, r - 2, r - 1)
}

impl<T: Element> Operation<T> for MatMul<T> {
    fn name(&self) -> &'static str {
        "matmul"
    }

    fn inputs(&self) -> &[Tensor<T>] {
        &self.inputs
    }

    fn forward(&self) -> Result<Tensor<T>> {
        let [a, b] = &self.inputs;
        let (sa, da) = a.snapshot();
        let (sb, db) = b.snapshot();
        let (out, shape) = block::matmul(&da, &sa, &db, &sb)?;
        self.cache.save_tensor("a", a);
        self.cache.save_tensor("b", b);
        Ok(Tensor::constant(shape, out))
    }

    fn backward(&self, grad_output: &Tensor<T>) -> Result<()> {
        let [a, b] = &self.inputs;
        let (sa, da) = self.cache.tensor("a")?.snapshot();
        let (sb, db) = self.cache.tensor("b")?.snapshot();
        let la = lifted(&sa, true);
        let lb = lifted(&sb, false);

        // the gradient laid out as batch + [m, n], undoing the vector squeeze
        let (ra, rb) = (la.rank(), lb.rank());
        let batch = broadcast_shapes(
            &Shape::from(&la.dims()[..ra - 2]),
            &Shape::from(&lb.dims()[..rb - 2]),
        )?;
        let mut dims = batch.dims().to_vec();
        dims.extend([la.dims()[ra - 2], lb.dims()[rb - 1]]);
        let gs = Shape::new(dims);
        let g = grad_output.data();
        if g.len() != gs.size() {
            return Err(Error::shape(
                "matmul",
                format!("gradient of {} elements for a {gs} product", g.len()),
            ));
        }

        if a.requires_grad() {
            let (bt, sbt) = transpose_last(&db, &lb);
            let (ga, s) = block::matmul(&g, &gs, &bt, &sbt)?;
            let ga = reduce_to_shape(&ga, &s, &la)?;
            a.accumulate_grad(&Tensor::constant(sa, ga))?;
        }
        if b.requires_grad() {
            let (at, sat) = transpose_last(&da, &la);
            let (gb, s) = block::matmul(&at, &sat, &g, &gs)?;
            let gb = reduce_to_shape(&gb, &s, &lb)?;
            b.accumulate_grad(&Tensor::constant(sb, gb))?;
        }
        Ok(())
    }
}

impl<T: Element> Tensor<T> {
    /// Matrix product with batch broadcasting.
    ///
    /// Rank-1 operands act as a row vector on the left and a column vector on
    /// the right; their lifted axis is removed from the result.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] for rank-0 operands, different inner
    /// dimensions or batch axes that do not broadcast.
    ///
    /// # Example
    /// ```
    /// use tensorgrad::Tensor;
    /// let a = Tensor::from_array([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    /// let b = Tensor::from_array([[7.0, 8.0], [9.0, 10.0], [11.0, 12.0]]);
    /// let c = a.matmul(&b).unwrap();
    /// assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);
    /// ```
    pub fn matmul(&self, other: &Tensor<T>) -> Result<Tensor<T>> {
        apply(MatMul {
            inputs: [self.clone(), other.clone()],
            cache: Cache::new(),
        })
    }
}
