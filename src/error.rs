//! Error taxonomy shared by every tensor and autograd operation.
//!
//! All failures are caller errors raised synchronously at the point of misuse.
//! Nothing here is retried, and no operation returns a sentinel value instead
//! of an error.

use crate::dtype::DType;

/// All errors raised by `tensorgrad`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Shapes are incompatible: broadcasting, reshape element counts,
    /// matmul inner dimensions or a slice window that does not fit.
    #[error("shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// An element position or axis lies outside `[-len, len)`.
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// The graph cannot be differentiated in its current state.
    #[error("invalid autograd state: {0}")]
    InvalidAutogradState(String),

    /// A value could not be parsed into the requested dtype.
    #[error("cannot represent {value:?} as {dtype}")]
    UnsupportedDType { value: String, dtype: DType },

    /// A scalar argument lies outside its domain: an empty range, a zero
    /// step or a non-positive temperature.
    #[error("invalid argument to {op}: {detail}")]
    InvalidArgument { op: &'static str, detail: String },

    /// A state import found no record for a declared tensor path.
    #[error("no state record for `{path}`")]
    MissingState { path: String },
}

impl Error {
    /// Shorthand for [`Error::ShapeMismatch`].
    pub fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn argument(op: &'static str, detail: impl Into<String>) -> Self {
        Error::InvalidArgument {
            op,
            detail: detail.into(),
        }
    }

    /// Shorthand for [`Error::InvalidAutogradState`].
    pub fn autograd(msg: impl Into<String>) -> Self {
        Error::InvalidAutogradState(msg.into())
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = Error::shape("reshape", "[2, 3] has 6 elements, [4] has 4");
        assert_eq!(
            e.to_string(),
            "shape mismatch in reshape: [2, 3] has 6 elements, [4] has 4"
        );

        let e = Error::IndexOutOfRange { index: -4, len: 3 };
        assert_eq!(e.to_string(), "index -4 is out of range for length 3");

        let e = Error::UnsupportedDType {
            value: "abc".into(),
            dtype: DType::Int32,
        };
        assert_eq!(e.to_string(), "cannot represent \"abc\" as int32");
    }
}
