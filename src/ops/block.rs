//! Recursive block matrix multiplication.
//!
//! # Layout
//!
//! Operands are flat row-major buffers. Rank-1 operands are lifted to
//! matrices (`[k]` on the left becomes `[1, k]`, on the right `[k, 1]`) and
//! the lifted axis is squeezed from the result again. All axes except the last
//! two are batch axes and broadcast against each other:
//!
//! ```text
//!   [2, 1, 3, 4] @ [4, 5]  ->  batch [2, 1], result [2, 1, 3, 5]
//! ```
//!
//! # Blocking
//!
//! Each batch is computed by halving the row, inner and column ranges until
//! one of them fits into [`config::matmul_block_size`], then running the plain
//! triple loop on that block. Products are accumulated in [`Element::Acc`]:
//! `f64` for floats, `i128` for integers, so integer products are exact.
//!
//! The recursion only changes the order in which partial sums are added.
//! Floating point addition is not associative, so float results can differ
//! from a naive product in the last bits; compare with a tolerance.
//!
//! # Parallelism
//!
//! Batches, and bands of rows inside a batch, are computed on [`rayon`] once
//! the product has at least [`config::parallel_threshold`] multiply-adds.

use std::ops::Range;

use log::trace;
use rayon::prelude::*;

use crate::broadcast::{broadcast_data, broadcast_shapes};
use crate::config;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::shape::Shape;

/// Blocking parameters of one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tiling {
    /// Extent at which the recursion stops splitting; `0` acts as `1`.
    pub block: usize,
    /// Multiply-add count at which the product goes parallel.
    pub parallel_threshold: usize,
}

impl Tiling {
    /// The tiling set in [`config`].
    pub fn current() -> Self {
        Tiling {
            block: config::matmul_block_size(),
            parallel_threshold: config::parallel_threshold(),
        }
    }
}

/// One batch of a product `C[m, n] += A[m, k] @ B[k, n]`.
struct Operands<'a, T: Element> {
    a: &'a [T::Acc],
    b: &'a [T::Acc],
    k: usize,
    n: usize,
    block: usize,
}

fn split(r: &Range<usize>) -> [Range<usize>; 2] {
    let mid = r.start + r.len() / 2;
    [r.start..mid, mid..r.end]
}

/// Adds `A[rows, inner] @ B[inner, cols]` into `c`, whose first row is
/// `row0` of the full result.
fn block_multiply<T: Element>(
    ops: &Operands<'_, T>,
    c: &mut [T::Acc],
    row0: usize,
    rows: Range<usize>,
    inner: Range<usize>,
    cols: Range<usize>,
) {
    let block = ops.block;
    if rows.len() <= block || cols.len() <= block || inner.len() <= block {
        for i in rows {
            let c_row = (i - row0) * ops.n;
            for p in inner.clone() {
                let av = ops.a[i * ops.k + p];
                let b_row = p * ops.n;
                for j in cols.clone() {
                    let cell = &mut c[c_row + j];
                    *cell = T::acc_add(*cell, T::acc_mul(av, ops.b[b_row + j]));
                }
            }
        }
        return;
    }
    for r in split(&rows) {
        for q in split(&cols) {
            for p in split(&inner) {
                block_multiply(ops, c, row0, r.clone(), p, q.clone());
            }
        }
    }
}

/// Computes one `m x n` batch into `c`.
#[allow(clippy::too_many_arguments)]
fn multiply_batch<T: Element>(
    a: &[T::Acc],
    b: &[T::Acc],
    c: &mut [T::Acc],
    m: usize,
    k: usize,
    n: usize,
    block: usize,
    parallel: bool,
) {
    let ops = Operands::<T> { a, b, k, n, block };
    if parallel && m > block {
        c.par_chunks_mut(block * n)
            .enumerate()
            .for_each(|(band, c_band)| {
                let row0 = band * block;
                let rows = row0..(row0 + block).min(m);
                block_multiply(&ops, c_band, row0, rows, 0..k, 0..n);
            });
    } else {
        block_multiply(&ops, c, 0, 0..m, 0..k, 0..n);
    }
}

/// Multiplies two buffers with matrix product semantics, tiled as set in
/// [`config`].
///
/// Returns the result buffer and its shape.
///
/// # Errors
/// [`Error::ShapeMismatch`] for rank-0 operands, different inner dimensions
/// or batch axes that do not broadcast.
///
/// # Example
/// ```
/// use tensorgrad::{ops::block::matmul, Shape};
/// let (c, shape) = matmul(
///     &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &Shape::from((2, 3)),
///     &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &Shape::from((3, 2)),
/// ).unwrap();
/// assert_eq!(shape.dims(), &[2, 2]);
/// assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
/// ```
pub fn matmul<T: Element>(a: &[T], sa: &Shape, b: &[T], sb: &Shape) -> Result<(Vec<T>, Shape)> {
    matmul_tiled(a, sa, b, sb, Tiling::current())
}

/// [`matmul`] with explicit blocking parameters.
///
/// # Errors
/// As [`matmul`].
pub fn matmul_tiled<T: Element>(
    a: &[T],
    sa: &Shape,
    b: &[T],
    sb: &Shape,
    tiling: Tiling,
) -> Result<(Vec<T>, Shape)> {
    if sa.rank() == 0 || sb.rank() == 0 {
        return Err(Error::shape(
            "matmul",
            format!("cannot multiply {sa} and {sb}, both operands need at least one axis"),
        ));
    }
    let a_vec = sa.rank() == 1;
    let b_vec = sb.rank() == 1;
    let ma = if a_vec { sa.inserted(0, 1) } else { sa.clone() };
    let mb = if b_vec { sb.inserted(1, 1) } else { sb.clone() };

    let rank = ma.rank().max(mb.rank());
    let pa = ma.padded_left(rank);
    let pb = mb.padded_left(rank);
    let (m, k) = (pa.dims()[rank - 2], pa.dims()[rank - 1]);
    let (k2, n) = (pb.dims()[rank - 2], pb.dims()[rank - 1]);
    if k != k2 {
        return Err(Error::shape(
            "matmul",
            format!("inner dimensions of {sa} and {sb} differ ({k} vs {k2})"),
        ));
    }
    let batch = broadcast_shapes(
        &Shape::from(&pa.dims()[..rank - 2]),
        &Shape::from(&pb.dims()[..rank - 2]),
    )?;

    let mut a_full = batch.dims().to_vec();
    a_full.extend([m, k]);
    let mut b_full = batch.dims().to_vec();
    b_full.extend([k, n]);
    let ea: Vec<T::Acc> = broadcast_data(a, &pa, &Shape::new(a_full))?
        .iter()
        .map(|v| v.widen())
        .collect();
    let eb: Vec<T::Acc> = broadcast_data(b, &pb, &Shape::new(b_full))?
        .iter()
        .map(|v| v.widen())
        .collect();

    let batches = batch.size();
    let block = tiling.block.max(1);
    let mut acc = vec![T::Acc::default(); batches * m * n];
    let parallel = batches * m * n * k >= tiling.parallel_threshold;
    trace!(
        "matmul {sa} @ {sb}: {batches} x [{m}, {k}] @ [{k}, {n}], block {block}, parallel {parallel}"
    );

    if m * n > 0 {
        let run = |(bi, c): (usize, &mut [T::Acc])| {
            multiply_batch::<T>(
                &ea[bi * m * k..(bi + 1) * m * k],
                &eb[bi * k * n..(bi + 1) * k * n],
                c,
                m,
                k,
                n,
                block,
                parallel,
            );
        };
        if parallel && batches > 1 {
            acc.par_chunks_mut(m * n).enumerate().for_each(run);
        } else {
            acc.chunks_mut(m * n).enumerate().for_each(run);
        }
    }

    let mut dims = batch.dims().to_vec();
    if !a_vec {
        dims.push(m);
    }
    if !b_vec {
        dims.push(n);
    }
    Ok((acc.into_iter().map(T::narrow).collect(), Shape::new(dims)))
}
