//! Exporting and restoring tensor values.
//!
//! # Records
//!
//! A [`TensorRecord`] is the plain triple a tensor serializes to:
//!
//! ```text
//!   dtype  "float64"
//!   shape  [2, 3]
//!   data   [0.0, 1.0, 2.0, 3.0, 4.0, 5.0]   row-major, len == product(shape)
//! ```
//!
//! Records carry values only. Gradients and graph history are never exported.
//!
//! # State Dicts
//!
//! Types owning parameters implement [`StateDict`] by listing their tensors
//! under stable dotted paths (`"encoder.0.weight"`). Restoring writes each
//! record back into the existing tensor with [`Tensor::update`], so handles
//! held elsewhere see the new values.
//!
//! # Example
//!
//! ```rust
//! use tensorgrad::{StateDict, Tensor};
//!
//! struct Linear {
//!     weight: Tensor,
//!     bias: Tensor,
//! }
//!
//! impl StateDict<f64> for Linear {
//!     fn named_tensors(&self) -> Vec<(String, Tensor)> {
//!         vec![
//!             ("weight".into(), self.weight.clone()),
//!             ("bias".into(), self.bias.clone()),
//!         ]
//!     }
//! }
//!
//! let a = Linear { weight: Tensor::ones((2, 2)), bias: Tensor::zeros(2) };
//! let b = Linear { weight: Tensor::zeros((2, 2)), bias: Tensor::ones(2) };
//! b.load_state(&a.state_records()).unwrap();
//! assert_eq!(b.weight, a.weight);
//! ```

use log::debug;

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensors::Tensor;

/// Serializable value of one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorRecord<T: Element> {
    /// Name of the element type, as printed by [`DType`].
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T: Element> TensorRecord<T> {
    /// Checks that the record describes a valid `T` tensor.
    ///
    /// # Errors
    /// - [`Error::UnsupportedDType`] if `dtype` is unknown or is not `T`'s.
    /// - [`Error::ShapeMismatch`] if the element count does not match the
    ///   shape.
    pub fn validate(&self) -> Result<()> {
        let dtype: DType = self.dtype.parse()?;
        if dtype != T::DTYPE {
            return Err(Error::UnsupportedDType {
                value: self.dtype.clone(),
                dtype: T::DTYPE,
            });
        }
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(Error::shape(
                "from_record",
                format!(
                    "shape {:?} needs {expected} elements, record holds {}",
                    self.shape,
                    self.data.len()
                ),
            ));
        }
        Ok(())
    }
}

impl<T: Element> Tensor<T> {
    /// Exports the current values.
    pub fn to_record(&self) -> TensorRecord<T> {
        let (shape, data) = self.snapshot();
        TensorRecord {
            dtype: T::DTYPE.to_string(),
            shape: shape.dims().to_vec(),
            data: data.as_ref().clone(),
        }
    }

    /// Builds a new leaf from a record.
    ///
    /// # Errors
    /// As [`TensorRecord::validate`].
    pub fn from_record(record: &TensorRecord<T>) -> Result<Tensor<T>> {
        record.validate()?;
        Ok(Tensor::leaf(
            Shape::from(record.shape.as_slice()),
            record.data.clone(),
        ))
    }
}

/// Types that own named tensors which can be exported and restored.
pub trait StateDict<T: Element> {
    /// Every owned tensor under its path, in a stable order.
    fn named_tensors(&self) -> Vec<(String, Tensor<T>)>;

    /// Records of every owned tensor, in the order of
    /// [`StateDict::named_tensors`].
    fn state_records(&self) -> Vec<(String, TensorRecord<T>)> {
        self.named_tensors()
            .into_iter()
            .map(|(path, t)| (path, t.to_record()))
            .collect()
    }

    /// Writes records back into the owned tensors.
    ///
    /// Every path of [`StateDict::named_tensors`] needs a record; extra records
    /// are ignored. All records are validated before the first tensor is
    /// written, so a failed load leaves every tensor untouched.
    ///
    /// # Errors
    /// - [`Error::MissingState`] if a path has no record.
    /// - Any error of [`TensorRecord::validate`].
    fn load_state(&self, records: &[(String, TensorRecord<T>)]) -> Result<()> {
        let mut staged = Vec::new();
        for (path, tensor) in self.named_tensors() {
            let Some((_, record)) = records.iter().find(|(p, _)| *p == path) else {
                return Err(Error::MissingState { path });
            };
            staged.push((tensor, Tensor::from_record(record)?));
        }
        debug!("loading {} tensors", staged.len());
        for (tensor, value) in &staged {
            tensor.update(value, true)?;
        }
        Ok(())
    }
}
