//! # Kernel Layer
//!
//! The operator in [`backprop`](crate::backprop) never does arithmetic
//! itself; every multiply, forward or backward, goes through a
//! [`SparseKernel`]. This module defines that boundary and the CPU kernels
//! that implement it.
//!
//! ## Submodules
//!
//! - [`reference`] — densify, multiply, gather. Simple and obviously correct.
//! - [`blocked`] — walks present blocks only and skips absent block products.
//! - [`dispatch`] — picks one of the above from the global [`Backend`](crate::backend::Backend).
//!
//! ## Kernel contract
//!
//! `multiply(a, b, mode, layout, trans_a, trans_b)` computes
//! `op(a) @ op(b)` where `op` transposes its argument when the flag is set.
//!
//! - Dense operands are `[..batch, rows, cols]`, sparse ones
//!   `[..batch, blocks, bs, bs]` in the layout's slot order.
//! - A transposed sparse operand is the transpose of the stored layout matrix.
//! - A sparse output is never transposed and must match the layout exactly.
//! - Both operands must be contiguous; batch dimensions must be equal.
//!
//! ## Extending
//!
//! Any type implementing [`SparseKernel`] can be plugged into
//! [`SparseMatMul`](crate::backprop::SparseMatMul); foreign failures travel
//! through [`KernelError::Other`].

pub mod blocked;
pub mod dispatch;
pub mod reference;

pub use self::blocked::BlockedKernel;
pub use self::dispatch::DispatchKernel;
pub use self::reference::ReferenceKernel;

use crate::error::KernelError;
use crate::layout::BlockLayout;
use crate::mode::SparsityMode;
use crate::tensors::Ten64;

/// A block-sparse multiply primitive.
pub trait SparseKernel {
    /// Computes `op(a) @ op(b)` under the given sparsity mode.
    ///
    /// # Errors
    /// Implementations report shape, layout and contiguity violations as
    /// [`KernelError`]s; the operator passes them through unchanged.
    fn multiply(
        &self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Ten64, KernelError>;
}

impl<K: SparseKernel + ?Sized> SparseKernel for &K {
    fn multiply(
        &self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Ten64, KernelError> {
        (**self).multiply(a, b, mode, layout, trans_a, trans_b)
    }
}

impl<K: SparseKernel + ?Sized> SparseKernel for Box<K> {
    fn multiply(
        &self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Ten64, KernelError> {
        (**self).multiply(a, b, mode, layout, trans_a, trans_b)
    }
}

/// One operand, resolved against the layout and its transpose flag.
pub(crate) struct Operand<'a> {
    data: &'a [f64],
    layout: Option<&'a BlockLayout>,
    trans: bool,
    /// Logical `(rows, cols)` after the transpose flag is applied.
    rows: usize,
    cols: usize,
    /// Elements per batch entry in storage.
    batch_stride: usize,
}

impl<'a> Operand<'a> {
    fn resolve(
        role: &'static str,
        t: &'a Ten64,
        sparse: bool,
        layout: Option<&'a BlockLayout>,
        trans: bool,
    ) -> Result<(Self, &'a [usize]), KernelError> {
        let data = t.as_slice().ok_or(KernelError::NonContiguous(role))?;
        let shape = t.shape();

        let (batch, stored, layout) = if sparse {
            let layout = layout.ok_or_else(|| KernelError::MissingLayout(format!("{role} sparse")))?;
            if shape.len() < 3 {
                return Err(KernelError::Rank { role, min: 3, shape: shape.to_vec() });
            }
            let bs = layout.block_size();
            let tail = &shape[shape.len() - 3..];
            if tail != [layout.block_count(), bs, bs] {
                return Err(KernelError::LayoutMismatch(format!(
                    "{role} operand ends in {tail:?}, layout has {} blocks of {bs}x{bs}",
                    layout.block_count()
                )));
            }
            (&shape[..shape.len() - 3], layout.dims(), Some(layout))
        } else {
            if shape.len() < 2 {
                return Err(KernelError::Rank { role, min: 2, shape: shape.to_vec() });
            }
            let r = shape.len();
            (&shape[..r - 2], (shape[r - 2], shape[r - 1]), None)
        };

        let (rows, cols) = if trans { (stored.1, stored.0) } else { stored };
        let batch_stride = if sparse {
            shape[shape.len() - 3..].iter().product()
        } else {
            stored.0 * stored.1
        };

        Ok((
            Self { data, layout, trans, rows, cols, batch_stride },
            batch,
        ))
    }

    fn is_sparse(&self) -> bool {
        self.layout.is_some()
    }

    /// Whether the logical block `(br, bc)` can hold non-zeros.
    fn block_present(&self, br: usize, bc: usize) -> bool {
        match self.layout {
            Some(layout) => layout.logical_slot(br, bc, self.trans).is_some(),
            None => true,
        }
    }

    /// Logical element `(i, j)` of batch entry `batch`.
    fn at(&self, batch: usize, i: usize, j: usize) -> f64 {
        let (r, c) = if self.trans { (j, i) } else { (i, j) };
        let base = batch * self.batch_stride;
        match self.layout {
            None => {
                let stored_cols = if self.trans { self.rows } else { self.cols };
                self.data[base + r * stored_cols + c]
            }
            Some(layout) => {
                let bs = layout.block_size();
                match layout.slot(r / bs, c / bs) {
                    Some(slot) => self.data[base + slot * bs * bs + (r % bs) * bs + c % bs],
                    None => 0.0,
                }
            }
        }
    }
}

/// Everything a kernel needs to run one multiply.
pub(crate) struct Plan<'a> {
    a: Operand<'a>,
    b: Operand<'a>,
    layout: Option<&'a BlockLayout>,
    sparse_out: bool,
    batches: usize,
    batch_dims: Vec<usize>,
    m: usize,
    k: usize,
    n: usize,
}

impl<'a> Plan<'a> {
    /// Validates a call against the kernel contract.
    pub(crate) fn new(
        a: &'a Ten64,
        b: &'a Ten64,
        mode: SparsityMode,
        layout: Option<&'a BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Self, KernelError> {
        if mode.any_sparse() && layout.is_none() {
            return Err(KernelError::MissingLayout(mode.to_string()));
        }

        let (a, a_batch) = Operand::resolve("left", a, mode.left().is_sparse(), layout, trans_a)?;
        let (b, b_batch) = Operand::resolve("right", b, mode.right().is_sparse(), layout, trans_b)?;

        if a_batch != b_batch {
            return Err(KernelError::BatchMismatch {
                left: a_batch.to_vec(),
                right: b_batch.to_vec(),
            });
        }
        if a.cols != b.rows {
            return Err(KernelError::ShapeMismatch {
                left: [a.rows, a.cols],
                right: [b.rows, b.cols],
            });
        }

        let sparse_out = mode.output().is_sparse();
        if sparse_out {
            if let Some(layout) = layout {
                if layout.dims() != (a.rows, b.cols) {
                    return Err(KernelError::LayoutMismatch(format!(
                        "sparse output is {}x{}, layout covers {:?}",
                        a.rows,
                        b.cols,
                        layout.dims()
                    )));
                }
            }
        }

        Ok(Self {
            m: a.rows,
            k: a.cols,
            n: b.cols,
            batches: a_batch.iter().product(),
            batch_dims: a_batch.to_vec(),
            a,
            b,
            layout,
            sparse_out,
        })
    }

    fn output_shape(&self) -> Vec<usize> {
        let mut shape = self.batch_dims.clone();
        match (self.sparse_out, self.layout) {
            (true, Some(layout)) => {
                let bs = layout.block_size();
                shape.extend([layout.block_count(), bs, bs]);
            }
            _ => shape.extend([self.m, self.n]),
        }
        shape
    }
}
