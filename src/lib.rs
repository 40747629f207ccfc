//! briny_sparse: differentiable block-sparse matrix multiplication.
//!
//! Multiplies two matrices where any of the left operand, the right operand
//! and the output may be stored block-sparse, and derives the gradients of
//! both inputs by running the same multiply primitive backwards.
//!
//! # Features
//!
//! - Sparsity modes as typed `(left, right, output)` triples.
//! - A pure backward mode algebra: forward mode and transpose flags in, the
//!   two backward kernel calls out.
//! - A single-use differentiable operator with explicit lifecycle states.
//! - Reference and block-skipping CPU kernels behind one kernel trait.
//!
//! # Modules
//!
//! - [`mode`] — Sparsity symbols, mode triples, transpose flags.
//! - [`layout`] — Block layouts and their per-axis lookup tables.
//! - [`algebra`] — Backward call construction.
//! - [`backprop`] — The differentiable operator.
//! - [`ops`] — Kernel trait and CPU kernels.
//! - [`backend`] — Global kernel selection.
//! - [`tensors`] — Strided tensors.
//! - [`approx`], [`gradcheck`] — Tolerance comparisons and finite differences.
//!
//! # Example
//!
//! ```rust
//! use briny_sparse::backprop::sparse_matmul;
//! use briny_sparse::layout::BlockLayout;
//! use briny_sparse::mode::TransposeFlags;
//! use briny_sparse::tensors::Ten64;
//!
//! // 4x4 output, only the two diagonal 2x2 blocks are kept
//! let layout = BlockLayout::from_mask(2, 2, 2, &[true, false, false, true]).unwrap();
//! let a = Ten64::new(vec![4, 3], vec![1.0; 12]).with_requires_grad(true);
//! let b = Ten64::new(vec![3, 4], vec![1.0; 12]).with_requires_grad(true);
//!
//! let (c, back) = sparse_matmul(&a, &b, "dds".parse().unwrap(), Some(&layout), TransposeFlags::NONE).unwrap();
//! assert_eq!(c.shape(), &[2, 2, 2]);
//!
//! let (da, db) = back(&Ten64::new(vec![2, 2, 2], vec![1.0; 8])).unwrap().into_pair();
//! assert_eq!(da.unwrap().shape(), &[4, 3]);
//! assert_eq!(db.unwrap().shape(), &[3, 4]);
//! ```

pub mod algebra;
pub mod approx;
pub mod backend;
pub mod backprop;
pub mod error;
pub mod gradcheck;
pub mod layout;
pub mod mode;
pub mod ops;
pub mod tensors;

pub use crate::error::{Error, KernelError, Result};
