//! tensorgrad: N-dimensional tensors with reverse-mode automatic
//! differentiation in Rust.
//!
//! Tensors record the operations applied to them. Calling
//! [`Tensor::backward`] on a result walks that record backwards and leaves
//! `d result / d x` in the gradient slot of every tensor `x` it was computed
//! from.
//!
//! # Features
//!
//! - Row-major tensors over `f64`, `f32`, `i64`, `i32` and `bool` elements.
//! - Broadcasting for every elementwise operation, with gradients reduced back
//!   to the operand's shape.
//! - Recursive block matrix multiplication with batch broadcasting, computed
//!   on [`rayon`] for large products.
//! - Scoped no-grad mode, gradient accumulation across backward passes and
//!   value export through [`StateDict`].
//!
//! # Modules
//!
//! - [`tensors`]: tensor storage, constructors, indexing and graph surgery.
//! - [`ops`]: the operation contract and every differentiable operation.
//! - [`backprop`]: topological ordering and the backward pass.
//! - [`grad`]: thread-local gradient mode.
//! - [`broadcast`]: broadcasting rules and their inverse.
//! - [`functional`]: softmax and variance built from the primitive ops.
//! - [`manip`]: non-differentiable utilities (stacking, masking, sampling).
//! - [`state`]: exporting and restoring tensor values.
//!
//! # Example
//!
//! ```rust
//! use tensorgrad::{tensor, Tensor};
//!
//! let x = tensor!([[1.0, 2.0], [3.0, 4.0]]);
//! let w = Tensor::of([0.5, -1.0]);
//! let loss = x.matmul(&w).unwrap().pow_scalar(2.0).unwrap().sum_all().unwrap();
//! loss.backward().unwrap();
//!
//! assert_eq!(w.grad().unwrap().dims(), vec![2]);
//! ```

pub mod approx;
pub mod backprop;
pub mod broadcast;
pub mod config;
pub mod dtype;
pub mod error;
pub mod functional;
pub mod grad;
pub mod manip;
pub mod ops;
pub mod shape;
pub mod state;
pub mod tensors;

pub use dtype::{DType, Element, Scalar};
pub use error::{Error, Result};
pub use shape::Shape;
pub use state::{StateDict, TensorRecord};
pub use tensors::{Tensor, TensorId};
