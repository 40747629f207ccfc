//! Differentiable block-sparse matmul.
//!
//! # Operator Lifecycle
//!
//! [`SparseMatMul`] is single-use:
//!
//! 1. **Unarmed** — freshly built. [`forward`](SparseMatMul::forward) runs the
//!    kernel once and saves what the backward pass needs.
//! 2. **Armed** — holds the saved invocation. [`backward`](SparseMatMul::backward)
//!    runs up to two kernel calls built by the [`algebra`](crate::algebra) module.
//! 3. **Consumed** — nothing left to replay. Any further call is an
//!    [`Error::InvalidOperatorState`].
//!
//! Saved inputs share storage with the caller's tensors; only strided views
//! are copied, since kernels need contiguous operands. The layout is borrowed
//! for the operator's lifetime.
//!
//! ## Closure form
//!
//! [`sparse_matmul`] wraps the operator in the crate's usual
//! `(output, back)` shape; `back` is `FnOnce`, so the single-use rule is
//! enforced by the compiler there.
//!
//! ## Example
//!
//! ```rust
//! use briny_sparse::backprop::SparseMatMul;
//! use briny_sparse::layout::BlockLayout;
//! use briny_sparse::mode::TransposeFlags;
//! use briny_sparse::tensors::Ten64;
//!
//! let layout = BlockLayout::from_mask(2, 2, 2, &[true, false, false, true]).unwrap();
//! let a = Ten64::new(vec![2, 2, 2], vec![1.0; 8]).with_requires_grad(true);
//! let b = Ten64::new(vec![4, 3], vec![0.5; 12]);
//!
//! let mut op = SparseMatMul::default();
//! let c = op
//!     .forward(&a, &b, "sdd".parse().unwrap(), Some(&layout), TransposeFlags::NONE)
//!     .unwrap();
//! assert_eq!(c.shape(), &[4, 3]);
//!
//! let grads = op.backward(&Ten64::new(vec![4, 3], vec![1.0; 12])).unwrap();
//! assert_eq!(grads.grad_a.unwrap().shape(), a.shape());
//! assert!(grads.grad_b.is_none());
//! ```

use core::fmt;
use core::mem;

use tracing::{debug, trace, warn};

use crate::algebra::{self, BackwardCall, Operand};
use crate::error::{Error, Result};
use crate::layout::BlockLayout;
use crate::mode::{SparsityMode, TransposeFlags};
use crate::ops::{DispatchKernel, SparseKernel};
use crate::tensors::Ten64;

/// Lifecycle state of a [`SparseMatMul`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Unarmed,
    Armed,
    Consumed,
}

impl fmt::Display for OperatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unarmed => "unarmed",
            Self::Armed => "armed",
            Self::Consumed => "consumed",
        })
    }
}

/// Gradients of the two tensor inputs.
///
/// `None` means the input did not require a gradient and no kernel call was
/// made for it. It is never a stand-in for zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub grad_a: Option<Ten64>,
    pub grad_b: Option<Ten64>,
}

impl Gradients {
    pub fn into_pair(self) -> (Option<Ten64>, Option<Ten64>) {
        (self.grad_a, self.grad_b)
    }
}

/// What forward leaves behind for backward.
#[derive(Debug)]
struct InvocationRecord<'l> {
    a: Ten64,
    b: Ten64,
    mode: SparsityMode,
    layout: Option<&'l BlockLayout>,
    transpose: TransposeFlags,
    needs_grad: [bool; 2],
}

#[derive(Debug)]
enum Slot<'l> {
    Unarmed,
    Armed(InvocationRecord<'l>),
    Consumed,
}

impl Slot<'_> {
    fn state(&self) -> OperatorState {
        match self {
            Self::Unarmed => OperatorState::Unarmed,
            Self::Armed(_) => OperatorState::Armed,
            Self::Consumed => OperatorState::Consumed,
        }
    }
}

/// Single-use differentiable block-sparse matrix multiply.
#[derive(Debug)]
pub struct SparseMatMul<'l, K = DispatchKernel> {
    kernel: K,
    slot: Slot<'l>,
}

impl Default for SparseMatMul<'_, DispatchKernel> {
    fn default() -> Self {
        Self::new(DispatchKernel)
    }
}

impl<'l, K: SparseKernel> SparseMatMul<'l, K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            slot: Slot::Unarmed,
        }
    }

    pub fn state(&self) -> OperatorState {
        self.slot.state()
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Computes `op(a) @ op(b)` and arms the operator.
    ///
    /// Whether each gradient will be computed is decided here, from
    /// [`requires_grad`](Ten64::requires_grad) on `a` and `b`.
    ///
    /// # Errors
    /// - [`Error::InvalidOperatorState`] unless the operator is unarmed.
    /// - [`Error::InvalidLayout`] if the mode names a sparse position and no
    ///   layout is given.
    /// - [`Error::Kernel`] for anything the kernel rejects. The operator stays
    ///   unarmed in that case.
    pub fn forward(
        &mut self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&'l BlockLayout>,
        transpose: TransposeFlags,
    ) -> Result<Ten64> {
        self.expect(OperatorState::Unarmed)?;
        if mode.any_sparse() && layout.is_none() {
            return Err(Error::InvalidLayout(format!(
                "mode `{mode}` has a sparse position but no block layout was given"
            )));
        }
        debug!(%mode, trans_a = transpose.a, trans_b = transpose.b, "sparse matmul forward");

        let a = a.contiguous();
        let b = b.contiguous();
        let out = self
            .kernel
            .multiply(&a, &b, mode, layout, transpose.a, transpose.b)?;

        self.slot = Slot::Armed(InvocationRecord {
            needs_grad: [a.requires_grad(), b.requires_grad()],
            a,
            b,
            mode,
            layout,
            transpose,
        });
        Ok(out)
    }

    /// Computes the gradients of the forward inputs from `grad_c`.
    ///
    /// `grad_c` is copied to contiguous storage first if it is a strided view.
    /// The operator is consumed whether or not the kernel calls succeed.
    ///
    /// # Errors
    /// - [`Error::InvalidOperatorState`] unless the operator is armed.
    /// - [`Error::Kernel`] for anything the kernel rejects.
    pub fn backward(&mut self, grad_c: &Ten64) -> Result<Gradients> {
        let record = match mem::replace(&mut self.slot, Slot::Consumed) {
            Slot::Armed(record) => record,
            other => {
                let found = other.state();
                self.slot = other;
                return Err(Error::InvalidOperatorState {
                    expected: OperatorState::Armed,
                    found,
                });
            }
        };
        debug!(
            mode = %record.mode,
            trans_a = record.transpose.a,
            trans_b = record.transpose.b,
            "sparse matmul backward"
        );

        let grad_c = if grad_c.is_contiguous() {
            grad_c.clone()
        } else {
            warn!(shape = ?grad_c.shape(), "upstream gradient is not contiguous; copying");
            grad_c.contiguous()
        };

        let [call_a, call_b] = algebra::backward_calls(record.mode, record.transpose);
        let grad_a = self.gradient(&record, &grad_c, call_a, record.needs_grad[0], "a")?;
        let grad_b = self.gradient(&record, &grad_c, call_b, record.needs_grad[1], "b")?;

        Ok(Gradients { grad_a, grad_b })
    }

    fn gradient(
        &self,
        record: &InvocationRecord<'l>,
        grad_c: &Ten64,
        call: BackwardCall,
        needed: bool,
        name: &'static str,
    ) -> Result<Option<Ten64>> {
        if !needed {
            trace!(input = name, "gradient not required; skipping");
            return Ok(None);
        }
        let pick = |operand: Operand| match operand {
            Operand::Left => &record.a,
            Operand::Right => &record.b,
            Operand::Grad => grad_c,
        };
        trace!(input = name, mode = %call.mode, operands = ?call.operands, "computing gradient");

        let [first, second] = call.operands;
        let grad = self.kernel.multiply(
            pick(first),
            pick(second),
            call.mode,
            record.layout,
            call.transpose.a,
            call.transpose.b,
        )?;
        Ok(Some(grad))
    }

    fn expect(&self, expected: OperatorState) -> Result<()> {
        let found = self.state();
        if found == expected {
            Ok(())
        } else {
            Err(Error::InvalidOperatorState { expected, found })
        }
    }
}

/// The differentiable op in closure form.
///
/// # Returns
/// - `out`: `op(a) @ op(b)` under `mode`.
/// - `back`: Closure mapping `dL/d(out)` to [`Gradients`]. Callable once.
///
/// # Errors
/// Same as [`SparseMatMul::forward`].
pub fn sparse_matmul_with<'l, K: SparseKernel + 'l>(
    kernel: K,
    a: &Ten64,
    b: &Ten64,
    mode: SparsityMode,
    layout: Option<&'l BlockLayout>,
    transpose: TransposeFlags,
) -> Result<(Ten64, impl FnOnce(&Ten64) -> Result<Gradients> + use<'l, K>)> {
    let mut op = SparseMatMul::new(kernel);
    let out = op.forward(a, b, mode, layout, transpose)?;
    Ok((out, move |grad: &Ten64| op.backward(grad)))
}

/// [`sparse_matmul_with`] on the globally selected backend.
pub fn sparse_matmul<'l>(
    a: &Ten64,
    b: &Ten64,
    mode: SparsityMode,
    layout: Option<&'l BlockLayout>,
    transpose: TransposeFlags,
) -> Result<(Ten64, impl FnOnce(&Ten64) -> Result<Gradients> + use<'l>)> {
    sparse_matmul_with(DispatchKernel, a, b, mode, layout, transpose)
}
