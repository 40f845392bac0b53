//! Parallel CPU kernels.
//!
//! Every kernel works on flat row-major buffers, so one implementation serves
//! all dtypes. Float math reads elements through [`Element::to_f64`] and
//! converts back with [`Element::from_f64`]; sums and the exact kernels
//! accumulate in [`Element::Acc`] so integers never round through f64.
//!
//! Buffers with at least [`config::parallel_threshold`] elements are processed
//! with [`rayon`]; smaller ones stay on the calling thread, where the cost of
//! spawning work would dominate.
//!
//! Kernels never touch autograd state. Callers wrap their output in a tensor
//! and decide how it joins the graph.

use rayon::prelude::*;

use crate::config;
use crate::dtype::Element;
use crate::shape::Shape;

/// Whether `len` elements are worth handing to rayon.
#[inline]
fn go_parallel(len: usize) -> bool {
    len >= config::parallel_threshold()
}

/// Builds a buffer of `len` elements where element `i` is `f(i)`.
pub fn generate<T, F>(len: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if go_parallel(len) {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}

/// Applies `f` elementwise.
pub fn map<T, F>(src: &[T], f: F) -> Vec<T>
where
    T: Element,
    F: Fn(f64) -> f64 + Sync + Send,
{
    map_on(src, f, go_parallel(src.len()))
}

fn map_on<T, F>(src: &[T], f: F, parallel: bool) -> Vec<T>
where
    T: Element,
    F: Fn(f64) -> f64 + Sync + Send,
{
    if parallel {
        src.par_iter().map(|&x| T::from_f64(f(x.to_f64()))).collect()
    } else {
        src.iter().map(|&x| T::from_f64(f(x.to_f64()))).collect()
    }
}

/// Combines two equally sized buffers elementwise.
///
/// # Panics
/// Debug builds assert that both buffers have the same length.
pub fn zip<T, F>(a: &[T], b: &[T], f: F) -> Vec<T>
where
    T: Element,
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    debug_assert_eq!(a.len(), b.len());
    if go_parallel(a.len()) {
        a.par_iter()
            .zip(b.par_iter())
            .map(|(&x, &y)| T::from_f64(f(x.to_f64(), y.to_f64())))
            .collect()
    } else {
        a.iter()
            .zip(b)
            .map(|(&x, &y)| T::from_f64(f(x.to_f64(), y.to_f64())))
            .collect()
    }
}

/// Combines two equally sized buffers in the exact accumulator.
pub fn zip_exact<T, F>(a: &[T], b: &[T], f: F) -> Vec<T>
where
    T: Element,
    F: Fn(T::Acc, T::Acc) -> T::Acc + Sync + Send,
{
    debug_assert_eq!(a.len(), b.len());
    generate(a.len(), |i| T::narrow(f(a[i].widen(), b[i].widen())))
}

/// Combines three equally sized buffers elementwise.
pub fn zip3<T, F>(a: &[T], b: &[T], c: &[T], f: F) -> Vec<T>
where
    T: Element,
    F: Fn(f64, f64, f64) -> f64 + Sync + Send,
{
    debug_assert!(a.len() == b.len() && b.len() == c.len());
    generate(a.len(), |i| {
        T::from_f64(f(a[i].to_f64(), b[i].to_f64(), c[i].to_f64()))
    })
}

/// Splits `shape` around `axis` into `(outer, dim, inner)` extents.
///
/// Element `(o, k, i)` lives at flat offset `(o * dim + k) * inner + i`.
pub fn axis_extents(shape: &Shape, axis: usize) -> (usize, usize, usize) {
    let dims = shape.dims();
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, dims[axis], inner)
}

/// Folds every lane along `axis` into one value.
///
/// The output has the shape of the input with `axis` removed (or kept as size
/// one; the flat layout is identical). `fold` receives the lane as an iterator
/// of f64 values and must handle an empty lane.
pub fn reduce_axis<T, F>(data: &[T], shape: &Shape, axis: usize, fold: F) -> Vec<T>
where
    T: Element,
    F: Fn(&mut dyn Iterator<Item = f64>) -> f64 + Sync + Send,
{
    let (outer, dim, inner) = axis_extents(shape, axis);
    generate(outer * inner, |j| {
        let (o, i) = (j / inner.max(1), j % inner.max(1));
        let base = o * dim * inner + i;
        let mut lane = (0..dim).map(|k| data[base + k * inner].to_f64());
        T::from_f64(fold(&mut lane))
    })
}

/// Sums along `axis` in the exact accumulator.
pub fn sum_axis<T: Element>(data: &[T], shape: &Shape, axis: usize) -> Vec<T> {
    let (outer, dim, inner) = axis_extents(shape, axis);
    generate(outer * inner, |j| {
        let (o, i) = (j / inner.max(1), j % inner.max(1));
        let base = o * dim * inner + i;
        let sum = (0..dim).fold(T::Acc::default(), |acc, k| {
            T::acc_add(acc, data[base + k * inner].widen())
        });
        T::narrow(sum)
    })
}

/// Position of the maximum (or minimum when `max` is false) in every lane.
///
/// Ties resolve to the first position. Empty lanes report position zero.
pub fn arg_extreme_axis<T: Element>(
    data: &[T],
    shape: &Shape,
    axis: usize,
    max: bool,
) -> Vec<usize> {
    let (outer, dim, inner) = axis_extents(shape, axis);
    generate(outer * inner, |j| {
        let (o, i) = (j / inner.max(1), j % inner.max(1));
        let base = o * dim * inner + i;
        let mut best = 0;
        for k in 1..dim {
            let cand = data[base + k * inner].to_f64();
            let cur = data[base + best * inner].to_f64();
            if (max && cand > cur) || (!max && cand < cur) {
                best = k;
            }
        }
        best
    })
}

/// Sums all elements in f64.
pub fn sum_all<T: Element>(data: &[T]) -> f64 {
    if go_parallel(data.len()) {
        data.par_iter().map(|x| x.to_f64()).sum()
    } else {
        data.iter().map(|x| x.to_f64()).sum()
    }
}

/// Materializes the buffer with axes `d0` and `d1` swapped.
///
/// Returns the new data together with the permuted shape.
pub fn transpose<T: Element>(data: &[T], shape: &Shape, d0: usize, d1: usize) -> (Vec<T>, Shape) {
    let mut dims = shape.dims().to_vec();
    dims.swap(d0, d1);
    let out_shape = Shape::new(dims);
    if d0 == d1 {
        return (data.to_vec(), out_shape);
    }
    let src_strides = shape.strides();
    let out = generate(out_shape.size(), |flat| {
        let mut idx = out_shape.unravel(flat);
        idx.swap(d0, d1);
        let src: usize = idx.iter().zip(&src_strides).map(|(i, s)| i * s).sum();
        data[src]
    });
    (out, out_shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_along_middle_axis() {
        let shape = Shape::from((2, 3, 2));
        let data: Vec<f64> = (0..12).map(f64::from).collect();
        // [[0,1],[2,3],[4,5]] and [[6,7],[8,9],[10,11]]
        assert_eq!(sum_axis(&data, &shape, 1), vec![6.0, 9.0, 24.0, 27.0]);
    }

    #[test]
    fn argmax_first_tie_wins() {
        let shape = Shape::from((2, 3));
        let data = vec![1.0, 5.0, 5.0, 7.0, 2.0, 7.0];
        assert_eq!(arg_extreme_axis(&data, &shape, 1, true), vec![1, 0]);
        assert_eq!(arg_extreme_axis(&data, &shape, 0, false), vec![0, 1, 0]);
    }

    #[test]
    fn transpose_matrix() {
        let shape = Shape::from((2, 3));
        let data = vec![1, 2, 3, 4, 5, 6];
        let (out, s) = transpose(&data, &shape, 0, 1);
        assert_eq!(s.dims(), &[3, 2]);
        assert_eq!(out, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn parallel_path_matches_serial() {
        let data: Vec<f64> = (0..100).map(f64::from).collect();
        let serial = map_on(&data, |x| x * 2.0, false);
        let parallel = map_on(&data, |x| x * 2.0, true);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn exact_kernels_keep_wide_integers() {
        let big = (1i64 << 53) + 1;
        assert_eq!(zip_exact(&[big], &[0], |x: i128, y: i128| x + y), vec![big]);
        let shape = Shape::from((2, 1));
        assert_eq!(sum_axis(&[big, 2], &shape, 0), vec![big + 2]);
        assert_eq!(zip_exact(&[i64::MAX], &[i64::MAX], |x: i128, y: i128| x * y), vec![i64::MAX]);
    }
}
