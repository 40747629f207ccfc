//! Error types.
//!
//! Two layers: [`KernelError`] is whatever a [`SparseKernel`](crate::ops::SparseKernel)
//! reports, and [`Error`] is what the operator surfaces to its caller. Kernel
//! failures pass through [`Error::Kernel`] unchanged.

use thiserror::Error;

use crate::backprop::OperatorState;

/// Errors raised by a block-sparse multiply kernel.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Inner dimensions of the two logical operands differ.
    #[error("inner dimensions must match for matmul: left is {left:?}, right is {right:?}")]
    ShapeMismatch { left: [usize; 2], right: [usize; 2] },

    /// Leading batch dimensions of the operands differ.
    #[error("batch dimensions must match: {left:?} vs {right:?}")]
    BatchMismatch { left: Vec<usize>, right: Vec<usize> },

    /// A sparse tensor (or a sparse output) does not fit the block layout.
    #[error("tensor does not fit the block layout: {0}")]
    LayoutMismatch(String),

    /// An operand's storage is not contiguous.
    #[error("{0} operand must be contiguous")]
    NonContiguous(&'static str),

    /// The mode names a sparse operand but no layout was supplied.
    #[error("mode `{0}` requires a block layout")]
    MissingLayout(String),

    /// A tensor has too few dimensions for its role.
    #[error("{role} operand needs at least {min} dimensions, got shape {shape:?}")]
    Rank {
        role: &'static str,
        min: usize,
        shape: Vec<usize>,
    },

    /// Failure from a foreign kernel implementation.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors surfaced by the differentiable operator.
#[derive(Error, Debug)]
pub enum Error {
    /// The mode triple is malformed.
    #[error("invalid sparsity mode: {0}")]
    InvalidMode(String),

    /// The layout is malformed or does not agree with the mode.
    #[error("invalid block layout: {0}")]
    InvalidLayout(String),

    /// `forward`/`backward` called out of order.
    #[error("operator is {found}, expected {expected}")]
    InvalidOperatorState {
        expected: OperatorState,
        found: OperatorState,
    },

    /// The kernel failed.
    #[error("kernel failed: {0}")]
    Kernel(#[from] KernelError),
}

pub type Result<T> = std::result::Result<T, Error>;
