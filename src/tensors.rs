//! Core tensor data structure.
//!
//! # Tensor Storage
//!
//! A [`Tensor`] is a shared handle to one node of the computation graph. The
//! node owns:
//! - a [`Shape`] and a flat row-major buffer of `T` (`len == shape.size()`)
//! - the autograd bookkeeping: `requires_grad`, `is_leaf`, the accumulated
//!   `grad`, the `parents` that produced it and the producing operation
//!
//! Cloning a `Tensor` is cheap and yields another handle to the *same* node.
//! Graph traversal is keyed by [`TensorId`], never by value: two tensors with
//! identical shape and data are still distinct nodes.
//!
//! ## Value Semantics
//! Operations never modify their inputs. Indexing helpers such as
//! [`Tensor::set`] and [`Tensor::narrow_set`] return new tensors. The one
//! mutation point is [`Tensor::update`], which commits new values into an
//! existing node (e.g. after an optimizer step).
//!
//! ## Example
//!
//! ```rust
//! use tensorgrad::{tensor, Tensor};
//! let t = tensor!([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
//! assert_eq!(t.dims(), vec![2, 3]);
//! assert_eq!(t.at(&[1, -1]).unwrap(), 6.0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;

use crate::broadcast;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::grad;
use crate::ops::{Operation, cpu};
use crate::shape::{Shape, normalize_index};

/// Stable identity of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(u64);

impl TensorId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TensorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mutable part of a graph node.
pub(crate) struct NodeState<T: Element> {
    pub(crate) shape: Shape,
    pub(crate) data: Arc<Vec<T>>,
    pub(crate) requires_grad: bool,
    pub(crate) is_leaf: bool,
    pub(crate) grad: Option<Tensor<T>>,
    pub(crate) parents: Vec<Tensor<T>>,
    pub(crate) operation: Option<Arc<dyn Operation<T>>>,
}

struct Node<T: Element> {
    id: TensorId,
    state: RwLock<NodeState<T>>,
}

/// An N-dimensional array that records the operations applied to it.
///
/// The element type defaults to `f64`, matching [`DType::DEFAULT`].
pub struct Tensor<T: Element = f64> {
    inner: Arc<Node<T>>,
}

impl<T: Element> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

// construction

impl<T: Element> Tensor<T> {
    pub(crate) fn from_parts(shape: Shape, data: Vec<T>, requires_grad: bool) -> Self {
        debug_assert_eq!(shape.size(), data.len());
        Tensor {
            inner: Arc::new(Node {
                id: TensorId::next(),
                state: RwLock::new(NodeState {
                    shape,
                    data: Arc::new(data),
                    requires_grad,
                    is_leaf: true,
                    grad: None,
                    parents: Vec::new(),
                    operation: None,
                }),
            }),
        }
    }

    /// A tensor that never joins the graph: gradients, saved snapshots and
    /// constant operands.
    pub(crate) fn constant(shape: Shape, data: Vec<T>) -> Self {
        Self::from_parts(shape, data, false)
    }

    /// A user-facing leaf whose `requires_grad` follows the grad mode.
    pub(crate) fn leaf(shape: Shape, data: Vec<T>) -> Self {
        Self::from_parts(shape, data, grad::is_grad_enabled())
    }

    /// Creates a tensor from a flat row-major buffer.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `data.len()` differs from the shape's size.
    pub fn from_vec(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if shape.size() != data.len() {
            return Err(Error::shape(
                "from_vec",
                format!("{shape} needs {} elements, got {}", shape.size(), data.len()),
            ));
        }
        Ok(Self::leaf(shape, data))
    }

    /// Creates a tensor from (possibly nested) fixed-size arrays.
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::from_array([[1, 2], [3, 4], [5, 6]]);
    /// assert_eq!(t.dims(), vec![3, 2]);
    /// ```
    pub fn from_array<A: NestedArray<Elem = T>>(array: A) -> Self {
        let mut dims = Vec::new();
        A::collect_dims(&mut dims);
        let mut data = Vec::new();
        array.flatten_into(&mut data);
        Self::leaf(Shape::new(dims), data)
    }

    /// Creates a one-dimensional tensor.
    pub fn of(data: impl Into<Vec<T>>) -> Self {
        let data = data.into();
        Self::leaf(Shape::from(data.len()), data)
    }

    /// Creates a rank-0 tensor holding one value.
    pub fn scalar(value: T) -> Self {
        Self::leaf(Shape::from(()), vec![value])
    }

    /// Creates a tensor where every element is `value`.
    pub fn full(shape: impl Into<Shape>, value: T) -> Self {
        let shape = shape.into();
        let data = vec![value; shape.size()];
        Self::leaf(shape, data)
    }

    pub fn zeros(shape: impl Into<Shape>) -> Self {
        Self::full(shape, T::zero())
    }

    pub fn ones(shape: impl Into<Shape>) -> Self {
        Self::full(shape, T::one())
    }

    /// Zeros with the shape of `self`.
    pub fn zeros_like(&self) -> Self {
        Self::zeros(self.shape())
    }

    /// Ones with the shape of `self`.
    pub fn ones_like(&self) -> Self {
        Self::ones(self.shape())
    }

    /// Samples every element uniformly from `[0, 1)`.
    pub fn random(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let mut rng = rand::rng();
        let data = (0..shape.size())
            .map(|_| T::from_f64(rng.random::<f64>()))
            .collect();
        Self::leaf(shape, data)
    }

    /// Samples every element uniformly from `[low, high)`.
    ///
    /// Integer and bool tensors receive the sample truncated toward zero.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] unless `low < high`.
    pub fn random_range(shape: impl Into<Shape>, low: f64, high: f64) -> Result<Self> {
        if !(low < high) {
            return Err(Error::argument(
                "random_range",
                format!("empty interval [{low}, {high})"),
            ));
        }
        let shape = shape.into();
        let mut rng = rand::rng();
        let data = (0..shape.size())
            .map(|_| T::from_f64(rng.random_range(low..high)))
            .collect();
        Ok(Self::leaf(shape, data))
    }

    /// Samples whole numbers uniformly from `[low, high)`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] unless `low < high`.
    pub fn randint(shape: impl Into<Shape>, low: i64, high: i64) -> Result<Self> {
        if low >= high {
            return Err(Error::argument(
                "randint",
                format!("empty interval [{low}, {high})"),
            ));
        }
        let shape = shape.into();
        let mut rng = rand::rng();
        let data = (0..shape.size())
            .map(|_| T::from_i64(rng.random_range(low..high)))
            .collect();
        Ok(Self::leaf(shape, data))
    }

    /// A one-dimensional tensor `start, start + step, ...` stopping before `end`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `start >= end` or `step == 0`.
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::<i32>::range(2, 9, 3).unwrap();
    /// assert_eq!(t.to_vec(), vec![2, 5, 8]);
    /// ```
    pub fn range(start: i64, end: i64, step: usize) -> Result<Self> {
        if start >= end {
            return Err(Error::argument(
                "range",
                format!("start {start} must be smaller than end {end}"),
            ));
        }
        if step == 0 {
            return Err(Error::argument("range", "step must be positive"));
        }
        let too_long = || Error::argument("range", format!("{start}..{end} is too long"));
        let span = usize::try_from(end.abs_diff(start)).map_err(|_| too_long())?;
        let len = span.div_ceil(step);
        if len > isize::MAX as usize / size_of::<T>().max(1) {
            return Err(too_long());
        }
        // (len - 1) * step < span, so neither the offset nor the value overflows
        let data = (0..len)
            .map(|i| {
                let v = i128::from(start) + i128::try_from(i * step).unwrap_or(i128::MAX);
                T::from_i64(i64::try_from(v).unwrap_or(end))
            })
            .collect();
        Ok(Self::leaf(Shape::from(len), data))
    }

    /// The values `0..size` laid out in `shape`.
    pub fn arange(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        let data = (0..shape.size())
            .map(|i| T::from_i64(i64::try_from(i).unwrap_or(i64::MAX)))
            .collect();
        Self::leaf(shape, data)
    }
}

// node access

impl<T: Element> Tensor<T> {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, NodeState<T>> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, NodeState<T>> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records how this tensor was produced.
    pub(crate) fn stamp(
        &self,
        requires_grad: bool,
        parents: Vec<Tensor<T>>,
        operation: Arc<dyn Operation<T>>,
    ) {
        let mut st = self.write();
        st.requires_grad = requires_grad;
        st.parents = parents;
        st.operation = Some(operation);
        st.is_leaf = false;
    }

    /// Shape and buffer read under one lock.
    pub(crate) fn snapshot(&self) -> (Shape, Arc<Vec<T>>) {
        let st = self.read();
        (st.shape.clone(), Arc::clone(&st.data))
    }

    /// Identity of the graph node behind this handle.
    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    /// Whether both handles point to the same graph node.
    pub fn same_node(&self, other: &Tensor<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn shape(&self) -> Shape {
        self.read().shape.clone()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.read().shape.dims().to_vec()
    }

    pub fn rank(&self) -> usize {
        self.read().shape.rank()
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        self.read().shape.size()
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// The flat row-major buffer, shared with the tensor.
    pub fn data(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.read().data)
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.read().data.as_ref().clone()
    }

    pub fn requires_grad(&self) -> bool {
        self.read().requires_grad
    }

    /// Turns gradient tracking on or off for this node.
    ///
    /// Affects operations applied afterwards, not the already recorded graph.
    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.write().requires_grad = requires_grad;
    }

    pub fn is_leaf(&self) -> bool {
        self.read().is_leaf
    }

    /// The gradient accumulated by the last backward passes, if any.
    pub fn grad(&self) -> Option<Tensor<T>> {
        self.read().grad.clone()
    }

    /// The operands this tensor was computed from.
    pub fn parents(&self) -> Vec<Tensor<T>> {
        self.read().parents.clone()
    }

    pub(crate) fn operation(&self) -> Option<Arc<dyn Operation<T>>> {
        self.read().operation.clone()
    }

    /// Name of the operation that produced this tensor, `None` for leaves.
    pub fn operation_name(&self) -> Option<&'static str> {
        self.read().operation.as_ref().map(|op| op.name())
    }
}

// element access

impl<T: Element> Tensor<T> {
    /// The single value of a one-element tensor.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the tensor holds more or fewer elements.
    pub fn item(&self) -> Result<T> {
        let st = self.read();
        match st.data.as_slice() {
            [v] => Ok(*v),
            _ => Err(Error::shape(
                "item",
                format!("{} holds {} elements", st.shape, st.shape.size()),
            )),
        }
    }

    /// Reads one element by full multi-index. Negative positions count from
    /// the end of their axis.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if `idx.len()` differs from the rank.
    /// - [`Error::IndexOutOfRange`] for positions outside an axis.
    pub fn at(&self, idx: &[isize]) -> Result<T> {
        let st = self.read();
        if idx.len() != st.shape.rank() {
            return Err(Error::shape(
                "at",
                format!("{} indices for shape {}", idx.len(), st.shape),
            ));
        }
        let mut pos = Vec::with_capacity(idx.len());
        for (&i, &d) in idx.iter().zip(st.shape.dims()) {
            pos.push(normalize_index(i, d)?);
        }
        Ok(st.data[st.shape.flat_index(&pos)])
    }

    /// Resolves a partial index into the selected region.
    ///
    /// Returns the shape of the region (`[1]` when every axis is fixed) and
    /// the flat source offset of each of its elements.
    fn selection(&self, idx: &[Option<isize>], op: &'static str) -> Result<(Shape, Vec<usize>)> {
        let shape = self.shape();
        if idx.len() > shape.rank() {
            return Err(Error::shape(
                op,
                format!("{} indices for shape {shape}", idx.len()),
            ));
        }
        let strides = shape.strides();
        let mut base = 0;
        let mut kept_axes = Vec::new();
        for (axis, &d) in shape.dims().iter().enumerate() {
            match idx.get(axis).copied().flatten() {
                Some(p) => base += normalize_index(p, d)? * strides[axis],
                None => kept_axes.push(axis),
            }
        }
        let kept = Shape::new(kept_axes.iter().map(|&a| shape.dims()[a]).collect());
        let offsets = (0..kept.size())
            .map(|flat| {
                kept.unravel(flat)
                    .iter()
                    .zip(&kept_axes)
                    .fold(base, |off, (i, &a)| off + i * strides[a])
            })
            .collect();
        let region = if kept.rank() == 0 { Shape::from(1) } else { kept };
        Ok((region, offsets))
    }

    /// Selects a sub-tensor.
    ///
    /// `Some(p)` fixes axis `i` at position `p` and removes it from the
    /// result, `None` keeps the whole axis. Axes beyond `idx.len()` are kept.
    /// When every axis is fixed the result has shape `[1]`.
    ///
    /// The result is a new leaf; no graph edge is recorded.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] for more indices than axes.
    /// - [`Error::IndexOutOfRange`] for positions outside an axis.
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::<i32>::arange((2, 3));
    /// assert_eq!(t.get(&[Some(1)]).unwrap().to_vec(), vec![3, 4, 5]);
    /// assert_eq!(t.get(&[None, Some(0)]).unwrap().to_vec(), vec![0, 3]);
    /// ```
    pub fn get(&self, idx: &[Option<isize>]) -> Result<Tensor<T>> {
        let (region, offsets) = self.selection(idx, "get")?;
        let data = self.data();
        Ok(Self::leaf(region, offsets.iter().map(|&o| data[o]).collect()))
    }

    /// Returns a copy of `self` with the region selected by `idx` replaced.
    ///
    /// Indices follow [`Tensor::get`]; `value` is broadcast to the region.
    ///
    /// # Errors
    /// As [`Tensor::get`], plus [`Error::ShapeMismatch`] if `value` does not
    /// broadcast to the region.
    pub fn set(&self, value: &Tensor<T>, idx: &[Option<isize>]) -> Result<Tensor<T>> {
        let (region, offsets) = self.selection(idx, "set")?;
        let (value_shape, value_data) = value.snapshot();
        let fill = broadcast::broadcast_data(&value_data, &value_shape, &region)?;
        let (shape, data) = self.snapshot();
        let mut out = data.as_ref().clone();
        for (&o, v) in offsets.iter().zip(fill) {
            out[o] = v;
        }
        Ok(Self::leaf(shape, out))
    }

    /// Copies `length` positions of axis `dim`, starting at `start`.
    ///
    /// # Errors
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    /// - [`Error::ShapeMismatch`] if the window runs past the axis.
    pub fn narrow(&self, dim: isize, start: usize, length: usize) -> Result<Tensor<T>> {
        let (shape, data) = self.snapshot();
        let axis = shape.axis(dim)?;
        let (outer, d, inner) = cpu::axis_extents(&shape, axis);
        if start.checked_add(length).is_none_or(|end| end > d) {
            return Err(Error::shape(
                "narrow",
                format!("window of {length} at {start} exceeds axis {axis} of {shape}"),
            ));
        }
        let mut out = Vec::with_capacity(outer * length * inner);
        for o in 0..outer {
            let from = (o * d + start) * inner;
            out.extend_from_slice(&data[from..from + length * inner]);
        }
        Ok(Self::leaf(shape.with_dim(axis, length), out))
    }

    /// Returns a copy of `self` with a window of axis `dim` overwritten by
    /// `value`. The window starts at `start` and spans `value`'s size along
    /// that axis.
    ///
    /// # Errors
    /// - [`Error::IndexOutOfRange`] for an invalid axis.
    /// - [`Error::ShapeMismatch`] if `value` differs from `self` on another
    ///   axis or the window runs past the axis.
    pub fn narrow_set(&self, dim: isize, start: usize, value: &Tensor<T>) -> Result<Tensor<T>> {
        let (shape, data) = self.snapshot();
        let (value_shape, value_data) = value.snapshot();
        let axis = shape.axis(dim)?;
        let length = match value_shape.dims().get(axis) {
            Some(&l) if value_shape.rank() == shape.rank() => l,
            _ => {
                return Err(Error::shape(
                    "narrow_set",
                    format!("cannot write {value_shape} into axis {axis} of {shape}"),
                ));
            }
        };
        let fits = start
            .checked_add(length)
            .is_some_and(|end| end <= shape.dims()[axis]);
        if value_shape != shape.with_dim(axis, length) || !fits {
            return Err(Error::shape(
                "narrow_set",
                format!("cannot write {value_shape} at {start} along axis {axis} of {shape}"),
            ));
        }
        let (outer, d, inner) = cpu::axis_extents(&shape, axis);
        let mut out = data.as_ref().clone();
        let chunk = length * inner;
        for o in 0..outer {
            let to = (o * d + start) * inner;
            out[to..to + chunk].copy_from_slice(&value_data[o * chunk..(o + 1) * chunk]);
        }
        Ok(Self::leaf(shape, out))
    }
}

// graph surgery

impl<T: Element> Tensor<T> {
    /// A copy cut from the graph that does not require gradients.
    ///
    /// The buffer is shared, not copied; buffers are never written in place.
    pub fn detach(&self) -> Tensor<T> {
        self.detach_with_grad(false)
    }

    /// A copy cut from the graph with the given `requires_grad`.
    pub fn detach_with_grad(&self, requires_grad: bool) -> Tensor<T> {
        let (shape, data) = self.snapshot();
        Tensor {
            inner: Arc::new(Node {
                id: TensorId::next(),
                state: RwLock::new(NodeState {
                    shape,
                    data,
                    requires_grad,
                    is_leaf: true,
                    grad: None,
                    parents: Vec::new(),
                    operation: None,
                }),
            }),
        }
    }

    /// Commits the values of `new` into this node.
    ///
    /// With `detach`, only the shape and data are taken over and this node is
    /// cut from its graph: its gradient, operation and parents are cleared and
    /// it becomes a leaf again. This is how optimizer steps write weights.
    ///
    /// Without `detach`, the node also adopts `new`'s gradient, operation,
    /// parents and `requires_grad`, taking `new`'s place in the graph.
    ///
    /// # Errors
    /// [`Error::InvalidAutogradState`] if, without `detach`, this node is an
    /// ancestor of `new`, which would close a cycle.
    pub fn update(&self, new: &Tensor<T>, detach: bool) -> Result<()> {
        if !detach && !self.same_node(new) {
            let id = self.id();
            if crate::backprop::topological_order(new).iter().any(|t| t.id() == id) {
                return Err(Error::autograd(format!(
                    "tensor {id} cannot adopt the graph of its own descendant"
                )));
            }
        }
        let (shape, data, requires_grad, grad, parents, operation) = {
            let src = new.read();
            (
                src.shape.clone(),
                Arc::clone(&src.data),
                src.requires_grad,
                src.grad.clone(),
                src.parents.clone(),
                src.operation.clone(),
            )
        };
        let mut st = self.write();
        st.shape = shape;
        st.data = data;
        if detach {
            st.grad = None;
            st.parents.clear();
            st.operation = None;
            st.is_leaf = true;
        } else {
            st.requires_grad = requires_grad;
            st.grad = grad;
            st.is_leaf = operation.is_none();
            st.parents = parents;
            st.operation = operation;
        }
        Ok(())
    }

    /// Converts every element to another element type.
    ///
    /// The result is a new leaf. Float sources cast through
    /// [`Element::from_f64`], integral sources through [`Element::from_i64`].
    ///
    /// ```
    /// use tensorgrad::Tensor;
    /// let t = Tensor::of([-1.5, 0.0, 0.7, 2.9]);
    /// assert_eq!(t.as_dtype::<i32>().to_vec(), vec![-1, 0, 0, 2]);
    /// assert_eq!(t.as_dtype::<bool>().to_vec(), vec![false, false, false, true]);
    /// ```
    pub fn as_dtype<U: Element>(&self) -> Tensor<U> {
        let (shape, data) = self.snapshot();
        let out = if T::DTYPE.is_float() {
            data.iter().map(|v| U::from_f64(v.to_f64())).collect()
        } else {
            data.iter().map(|v| U::from_i64(v.to_i64())).collect()
        };
        Tensor::leaf(shape, out)
    }

    /// Whether both tensors have the same shape and every pair of elements
    /// differs by at most `tolerance`.
    pub fn allclose(&self, other: &Tensor<T>, tolerance: f64) -> bool {
        let (sa, da) = self.snapshot();
        let (sb, db) = other.snapshot();
        sa == sb
            && da
                .iter()
                .zip(db.iter())
                .all(|(a, b)| (a.to_f64() - b.to_f64()).abs() <= tolerance)
    }
}

/// Structural equality: same shape and same elements. Graph identity is
/// compared with [`Tensor::same_node`].
impl<T: Element> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.same_node(other) {
            return true;
        }
        let (sa, da) = self.snapshot();
        let (sb, db) = other.snapshot();
        sa == sb && da == db
    }
}

impl<T: Element> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.read();
        f.debug_struct("Tensor")
            .field("id", &self.inner.id)
            .field("shape", &st.shape.dims())
            .field("dtype", &T::DTYPE)
            .field("requires_grad", &st.requires_grad)
            .field("is_leaf", &st.is_leaf)
            .field("operation", &st.operation.as_ref().map(|op| op.name()))
            .field("data", &st.data)
            .finish()
    }
}

impl<T: Element> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn rows<T: fmt::Debug>(f: &mut fmt::Formatter<'_>, dims: &[usize], data: &[T]) -> fmt::Result {
            match dims {
                [] => write!(f, "{:?}", data[0]),
                [_] => {
                    write!(f, "[")?;
                    for (i, v) in data.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{v:?}")?;
                    }
                    write!(f, "]")
                }
                [n, rest @ ..] => {
                    let step = rest.iter().product::<usize>();
                    write!(f, "[")?;
                    for i in 0..*n {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        rows(f, rest, &data[i * step..(i + 1) * step])?;
                    }
                    write!(f, "]")
                }
            }
        }
        let st = self.read();
        rows(f, st.shape.dims(), &st.data)
    }
}

/// Nested fixed-size arrays accepted by [`Tensor::from_array`].
pub trait NestedArray {
    type Elem: Element;
    /// Appends the sizes of this level and every level below it.
    ///
    /// Sizes come from the type, so an empty outer level keeps its inner axes.
    fn collect_dims(dims: &mut Vec<usize>);
    /// Appends all elements in row-major order.
    fn flatten_into(&self, out: &mut Vec<Self::Elem>);
}

macro_rules! nested_scalar {
    ($($t:ty),*) => {
        $(impl NestedArray for $t {
            type Elem = $t;
            fn collect_dims(_dims: &mut Vec<usize>) {}
            fn flatten_into(&self, out: &mut Vec<$t>) {
                out.push(*self);
            }
        })*
    };
}

nested_scalar!(f64, f32, i64, i32, bool);

impl<A: NestedArray, const N: usize> NestedArray for [A; N] {
    type Elem = A::Elem;

    fn collect_dims(dims: &mut Vec<usize>) {
        dims.push(N);
        A::collect_dims(dims);
    }

    fn flatten_into(&self, out: &mut Vec<Self::Elem>) {
        for a in self {
            a.flatten_into(out);
        }
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Rows are fixed-size arrays, so ragged literals are rejected at compile time.
///
/// # Example
/// ```
/// use tensorgrad::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, -4.0]]);
/// assert_eq!(t.dims(), vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($($array:tt)+) => {
        $crate::tensors::Tensor::from_array($($array)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_node() {
        let a = Tensor::<f64>::zeros((2, 2));
        let b = a.clone();
        assert!(a.same_node(&b));
        assert_eq!(a.id(), b.id());
        let c = Tensor::<f64>::zeros((2, 2));
        assert_eq!(a, c);
        assert!(!a.same_node(&c));
    }

    #[test]
    fn get_removes_fixed_axes() {
        let t = Tensor::<i64>::arange((2, 3, 4));
        let row = t.get(&[Some(1), Some(-1)]).unwrap();
        assert_eq!(row.dims(), vec![4]);
        assert_eq!(row.to_vec(), vec![20, 21, 22, 23]);
        let one = t.get(&[Some(0), Some(1), Some(2)]).unwrap();
        assert_eq!(one.dims(), vec![1]);
        assert_eq!(one.item().unwrap(), 6);
        assert!(matches!(
            t.get(&[Some(2)]),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn set_leaves_the_original() {
        let t = Tensor::<i32>::zeros((2, 2));
        let u = t.set(&Tensor::scalar(7), &[None, Some(1)]).unwrap();
        assert_eq!(u.to_vec(), vec![0, 7, 0, 7]);
        assert_eq!(t.to_vec(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn narrow_and_write_back() {
        let t = Tensor::<i32>::arange((3, 4));
        let mid = t.narrow(1, 1, 2).unwrap();
        assert_eq!(mid.dims(), vec![3, 2]);
        assert_eq!(mid.to_vec(), vec![1, 2, 5, 6, 9, 10]);

        let w = t.narrow_set(1, 2, &Tensor::zeros((3, 2))).unwrap();
        assert_eq!(w.to_vec(), vec![0, 1, 0, 0, 4, 5, 0, 0, 8, 9, 0, 0]);

        assert!(matches!(t.narrow(2, 0, 1), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(t.narrow(1, 3, 2), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(t.narrow(1, usize::MAX, 2), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(
            t.narrow_set(1, usize::MAX, &Tensor::zeros((3, 1))),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn range_stops_before_end() {
        let t = Tensor::<f64>::range(0, 10, 4).unwrap();
        assert_eq!(t.to_vec(), vec![0.0, 4.0, 8.0]);
        assert!(Tensor::<f64>::range(3, 3, 1).is_err());
        assert!(Tensor::<f64>::range(0, 3, 0).is_err());
    }

    #[test]
    fn range_spans_the_whole_i64_line() {
        let t = Tensor::<i64>::range(i64::MIN, i64::MAX, usize::MAX).unwrap();
        assert_eq!(t.to_vec(), vec![i64::MIN]);
        let t = Tensor::<i64>::range(i64::MAX - 2, i64::MAX, 1).unwrap();
        assert_eq!(t.to_vec(), vec![i64::MAX - 2, i64::MAX - 1]);
        assert!(matches!(
            Tensor::<f64>::range(i64::MIN, i64::MAX, 1),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn integer_casts_keep_every_digit() {
        let big = (1i64 << 53) + 1;
        let t = Tensor::<i64>::of([big, -big]);
        assert_eq!(t.as_dtype::<i64>().to_vec(), vec![big, -big]);
        assert_eq!(t.as_dtype::<i32>().to_vec(), vec![i32::MAX, i32::MIN]);
    }

    #[test]
    fn empty_outer_array_keeps_inner_axes() {
        let t = Tensor::<f64>::from_array([[0.0f64; 2]; 0]);
        assert_eq!(t.dims(), vec![0, 2]);
        assert!(t.to_vec().is_empty());
        let t = Tensor::<i32>::from_array([[[0i32; 3]; 0]; 2]);
        assert_eq!(t.dims(), vec![2, 0, 3]);
    }

    #[test]
    fn random_stays_in_interval() {
        let t = Tensor::<f64>::random_range((4, 4), -2.0, 2.0).unwrap();
        assert!(t.data().iter().all(|v| (-2.0..2.0).contains(v)));
        let i = Tensor::<i32>::randint(100, 3, 5).unwrap();
        assert!(i.data().iter().all(|v| (3..5).contains(v)));
    }

    #[test]
    fn detach_update_cuts_history() {
        let w = Tensor::<f64>::ones(3);
        let y = w.mul_scalar(2.0).unwrap();
        assert!(!y.is_leaf());
        y.update(&Tensor::of([1.0, 2.0, 3.0]), true).unwrap();
        assert!(y.is_leaf());
        assert!(y.parents().is_empty());
        assert!(y.operation_name().is_none());
        assert_eq!(y.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn update_refuses_cycles() {
        let w = Tensor::<f64>::ones(3);
        let y = w.add_scalar(1.0).unwrap();
        assert!(matches!(
            w.update(&y, false),
            Err(Error::InvalidAutogradState(_))
        ));
        w.update(&y, true).unwrap();
        assert_eq!(w.to_vec(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn display_nests_rows() {
        let t = Tensor::from_array([[1, 2], [3, 4]]);
        assert_eq!(t.to_string(), "[[1, 2], [3, 4]]");
        assert_eq!(Tensor::scalar(true).to_string(), "true");
    }
}
