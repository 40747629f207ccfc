//! Backend selection module.
//!
//! This module defines the available CPU kernels and provides functions to
//! set and get the one [`DispatchKernel`](crate::ops::DispatchKernel) routes to.
//!
//! # Supported Backends
//!
//! - `Reference` — densify, multiply, gather (default).
//! - `Blocked` — skips absent block products.
//!
//! The backend is stored globally using an `AtomicU8`, enabling fast
//! switching at runtime. Operators that were given an explicit kernel are
//! not affected.

use briny::traits::{InteriorImmutable, RawConvert, StableLayout, Unaligned};
use core::convert::TryFrom;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of the built-in kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Backend {
    /// Dense reference kernel (default).
    #[default]
    Reference = 0,
    /// Block-skipping kernel.
    Blocked,
}

unsafe impl StableLayout for Backend {}
unsafe impl RawConvert for Backend {}
unsafe impl Unaligned for Backend {}
unsafe impl InteriorImmutable for Backend {}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Reference),
            1 => Ok(Self::Blocked),
            _ => Err(()),
        }
    }
}

/// Global default backend.
///
/// Changes are rare and not synchronised with in-flight kernel calls; a call
/// already dispatched keeps the kernel it picked.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Reference as u8);

/// Sets the backend used by [`DispatchKernel`](crate::ops::DispatchKernel).
///
/// # Example
///
/// ```
/// use briny_sparse::backend::{set_backend, Backend};
/// set_backend(Backend::Blocked);
/// ```
pub fn set_backend(b: Backend) {
    tracing::debug!(backend = ?b, "selecting sparse kernel backend");
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the currently active backend.
///
/// If the stored value is invalid, defaults to [`Backend::Reference`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}
