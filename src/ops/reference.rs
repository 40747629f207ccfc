//! Reference CPU kernel.
//!
//! Every operand is expanded to its logical dense matrix, multiplied with a
//! plain row-parallel loop, and the result is gathered back into block form
//! when the output is sparse. Absent blocks cost as much as present ones;
//! this kernel exists to be easy to trust, not fast.

use rayon::prelude::*;

use super::{Plan, SparseKernel};
use crate::error::KernelError;
use crate::layout::BlockLayout;
use crate::mode::SparsityMode;
use crate::tensors::Ten64;

/// Densify-multiply-gather kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKernel;

impl SparseKernel for ReferenceKernel {
    fn multiply(
        &self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Ten64, KernelError> {
        let plan = Plan::new(a, b, mode, layout, trans_a, trans_b)?;
        let (m, k, n) = (plan.m, plan.k, plan.n);

        // logical row-major copies, one [m, k] / [k, n] matrix per batch entry
        let a_dense: Vec<f64> = (0..plan.batches * m * k)
            .map(|i| plan.a.at(i / (m * k), (i / k) % m, i % k))
            .collect();
        let b_dense: Vec<f64> = (0..plan.batches * k * n)
            .map(|i| plan.b.at(i / (k * n), (i / n) % k, i % n))
            .collect();

        let mut out_data = vec![0.0; plan.batches * m * n];
        if n > 0 {
            out_data
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(row_idx, row)| {
                    let batch = row_idx / m.max(1);
                    let a_row = &a_dense[row_idx * k..(row_idx + 1) * k];
                    let b_mat = &b_dense[batch * k * n..(batch + 1) * k * n];
                    for (j, out) in row.iter_mut().enumerate() {
                        let mut sum = 0.0;
                        for l in 0..k {
                            sum += a_row[l] * b_mat[l * n + j];
                        }
                        *out = sum;
                    }
                });
        }

        let mut dense_shape = plan.batch_dims.clone();
        dense_shape.extend([m, n]);
        let dense = Ten64::new(dense_shape, out_data);

        match (plan.sparse_out, plan.layout) {
            (true, Some(layout)) => layout
                .from_dense(&dense)
                .map_err(|e| KernelError::LayoutMismatch(e.to_string())),
            _ => Ok(dense),
        }
    }
}
