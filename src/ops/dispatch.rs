//! Kernel dispatch.
//!
//! [`DispatchKernel`] reads the global [`Backend`] on every call and forwards
//! to the matching CPU kernel, so the choice can be changed between calls
//! without rebuilding operators.
//!
//! # Example
//! ```rust
//! use briny_sparse::backend::{set_backend, Backend};
//! use briny_sparse::mode::SparsityMode;
//! use briny_sparse::ops::{DispatchKernel, SparseKernel};
//! use briny_sparse::tensor;
//!
//! set_backend(Backend::Blocked);
//! let a = tensor!([[1.0, 2.0], [3.0, 4.0]]);
//! let b = tensor!([[1.0, 0.0], [0.0, 1.0]]);
//! let mode: SparsityMode = "ddd".parse().unwrap();
//! let c = DispatchKernel.multiply(&a, &b, mode, None, false, false).unwrap();
//! assert_eq!(c, a);
//! ```

use super::{BlockedKernel, ReferenceKernel, SparseKernel};
use crate::backend::{get_backend, Backend};
use crate::error::KernelError;
use crate::layout::BlockLayout;
use crate::mode::SparsityMode;
use crate::tensors::Ten64;

/// Kernel that forwards to the globally selected backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchKernel;

impl SparseKernel for DispatchKernel {
    fn multiply(
        &self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Ten64, KernelError> {
        let backend = get_backend();
        tracing::trace!(?backend, %mode, trans_a, trans_b, "dispatching sparse multiply");
        match backend {
            Backend::Blocked => BlockedKernel.multiply(a, b, mode, layout, trans_a, trans_b),
            Backend::Reference => ReferenceKernel.multiply(a, b, mode, layout, trans_a, trans_b),
        }
    }
}
