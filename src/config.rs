//! Process-wide configuration.
//!
//! This module holds the few tunables of the engine and provides functions to
//! set and get them.
//!
//! # Settings
//!
//! - `matmul_block_size`: extent at which the block matmul kernel stops
//!   splitting and multiplies directly (default `32`).
//! - `default_requires_grad`: the grad mode every thread starts in before any
//!   [`crate::grad`] scope is entered (default `true`).
//! - `parallel_threshold`: element count at which elementwise kernels and
//!   batched matmul switch to rayon (default `16384`).
//!
//! Values are stored in atomics with relaxed ordering: they are expected to be
//! set once at startup, not toggled while graphs are being built.
//!
//! # Example
//!
//! ```
//! use tensorgrad::config;
//! config::set_matmul_block_size(64);
//! assert_eq!(config::matmul_block_size(), 64);
//! # config::set_matmul_block_size(config::DEFAULT_MATMUL_BLOCK_SIZE);
//! ```

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Default base-case extent of the block matmul kernel.
pub const DEFAULT_MATMUL_BLOCK_SIZE: usize = 32;

/// Default element count at which kernels go parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1 << 14;

/// Lower clamp applied to the input of `log` when computing its derivative.
pub const LOG_EPSILON: f64 = 1e-7;

/// Probabilities are clipped to `[eps, 1 - eps]` before taking the log in
/// cross-entropy.
pub const CROSS_ENTROPY_EPSILON: f64 = 1e-7;

static MATMUL_BLOCK_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_MATMUL_BLOCK_SIZE);
static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);
static DEFAULT_REQUIRES_GRAD: AtomicBool = AtomicBool::new(true);

/// Sets the base-case extent of the block matmul kernel.
///
/// A value of `0` is clamped to `1`.
pub fn set_matmul_block_size(size: usize) {
    MATMUL_BLOCK_SIZE.store(size.max(1), Ordering::Relaxed);
}

/// Returns the base-case extent of the block matmul kernel.
pub fn matmul_block_size() -> usize {
    MATMUL_BLOCK_SIZE.load(Ordering::Relaxed)
}

/// Sets the element count at which kernels switch to rayon.
pub fn set_parallel_threshold(elements: usize) {
    PARALLEL_THRESHOLD.store(elements, Ordering::Relaxed);
}

/// Returns the element count at which kernels switch to rayon.
pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

/// Sets the grad mode threads start in.
///
/// Threads that already entered a [`crate::grad`] scope or called
/// [`crate::grad::set_grad_enabled`] keep their own state.
pub fn set_default_requires_grad(enabled: bool) {
    DEFAULT_REQUIRES_GRAD.store(enabled, Ordering::Relaxed);
}

/// Returns the grad mode threads start in.
pub fn default_requires_grad() -> bool {
    DEFAULT_REQUIRES_GRAD.load(Ordering::Relaxed)
}
