//! Scoped gradient mode.
//!
//! The grad mode decides the default `requires_grad` of newly constructed leaf
//! tensors. It is stored per thread, so graphs built concurrently on different
//! threads never see each other's scopes.
//!
//! Scopes nest: each guard remembers the mode that was active when it was
//! created and restores it when dropped.
//!
//! ```
//! use tensorgrad::{grad, Tensor};
//!
//! let w = Tensor::<f64>::zeros((2, 2));
//! assert!(w.requires_grad());
//! {
//!     let _guard = grad::no_grad();
//!     assert!(!Tensor::<f64>::zeros((2, 2)).requires_grad());
//!     {
//!         let _inner = grad::enable_grad();
//!         assert!(Tensor::<f64>::zeros((2, 2)).requires_grad());
//!     }
//!     assert!(!grad::is_grad_enabled());
//! }
//! assert!(grad::is_grad_enabled());
//! ```

use std::cell::Cell;
use std::marker::PhantomData;

use crate::config;

thread_local! {
    // `None` until the thread first touches its mode; then seeded from config.
    static GRAD_ENABLED: Cell<Option<bool>> = const { Cell::new(None) };
}

/// Whether leaves created on this thread currently default to
/// `requires_grad = true`.
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(|g| match g.get() {
        Some(enabled) => enabled,
        None => {
            let enabled = config::default_requires_grad();
            g.set(Some(enabled));
            enabled
        }
    })
}

/// Sets the grad mode of this thread without a scope.
pub fn set_grad_enabled(enabled: bool) {
    GRAD_ENABLED.with(|g| g.set(Some(enabled)));
}

/// Restores the previous grad mode when dropped.
///
/// Guards are tied to the thread that created them and cannot be sent
/// elsewhere.
#[must_use = "the grad mode is restored as soon as the guard is dropped"]
pub struct GradModeGuard {
    previous: bool,
    _not_send: PhantomData<*const ()>,
}

impl GradModeGuard {
    fn enter(enabled: bool) -> Self {
        let previous = is_grad_enabled();
        set_grad_enabled(enabled);
        GradModeGuard {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        set_grad_enabled(self.previous);
    }
}

/// Enters a scope where new leaves do not require gradients.
pub fn no_grad() -> GradModeGuard {
    GradModeGuard::enter(false)
}

/// Enters a scope where new leaves require gradients.
pub fn enable_grad() -> GradModeGuard {
    GradModeGuard::enter(true)
}

/// Runs `f` with gradients disabled.
pub fn with_no_grad<R>(f: impl FnOnce() -> R) -> R {
    let _guard = no_grad();
    f()
}
