//! Block-skipping CPU kernel.
//!
//! The reduction axis is cut into `block_size` chunks. A chunk is skipped
//! for a given output tile when the left operand has no block at
//! `(row-block, chunk)` or the right operand has none at `(chunk, col-block)`.
//! With a sparse output only the present output tiles are computed, and they
//! are written straight into slot order.
//!
//! Dims that only touch dense operands need not be multiples of the block
//! size; the last chunk along such an axis is simply shorter.

use rayon::prelude::*;

use super::{Plan, SparseKernel};
use crate::error::KernelError;
use crate::layout::BlockLayout;
use crate::mode::SparsityMode;
use crate::tensors::Ten64;

/// Kernel that skips products of absent blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockedKernel;

impl BlockedKernel {
    /// Accumulates the `(rows × cols)` output tile at `(i0, j0)` into `tile`,
    /// row-major with row length `cols`.
    #[allow(clippy::too_many_arguments)]
    fn tile(
        plan: &Plan<'_>,
        bs: usize,
        batch: usize,
        i0: usize,
        j0: usize,
        rows: usize,
        cols: usize,
        tile: &mut [f64],
    ) {
        let (br, bc) = (i0 / bs, j0 / bs);
        for kb in 0..plan.k.div_ceil(bs) {
            if !plan.a.block_present(br, kb) || !plan.b.block_present(kb, bc) {
                continue;
            }
            let k0 = kb * bs;
            let k1 = (k0 + bs).min(plan.k);
            for di in 0..rows {
                for l in k0..k1 {
                    let a = plan.a.at(batch, i0 + di, l);
                    let out = &mut tile[di * cols..(di + 1) * cols];
                    for (dj, acc) in out.iter_mut().enumerate() {
                        *acc += a * plan.b.at(batch, l, j0 + dj);
                    }
                }
            }
        }
    }

    fn sparse_output(plan: &Plan<'_>, layout: &BlockLayout) -> Vec<f64> {
        let bs = layout.block_size();
        let per_block = bs * bs;
        let blocks: Vec<(usize, usize)> = layout.blocks().collect();
        let per_batch = blocks.len() * per_block;

        let mut out = vec![0.0; plan.batches * per_batch];
        if per_block == 0 {
            return out;
        }
        out.par_chunks_mut(per_block)
            .enumerate()
            .for_each(|(idx, tile)| {
                let batch = idx / blocks.len();
                let (br, bc) = blocks[idx % blocks.len()];
                Self::tile(plan, bs, batch, br * bs, bc * bs, bs, bs, tile);
            });
        out
    }

    fn dense_output(plan: &Plan<'_>, bs: usize) -> Vec<f64> {
        let (m, n) = (plan.m, plan.n);
        let mut out = vec![0.0; plan.batches * m * n];
        if n == 0 || m == 0 {
            return out;
        }
        // one row-block of one batch entry per task
        let per_batch = m * n;
        out.par_chunks_mut(per_batch)
            .enumerate()
            .for_each(|(batch, mat)| {
                mat.par_chunks_mut(bs * n).enumerate().for_each(|(rb, band)| {
                    let rows = band.len() / n;
                    let mut tile = vec![0.0; rows * bs];
                    for j0 in (0..n).step_by(bs) {
                        let cols = bs.min(n - j0);
                        tile[..rows * cols].fill(0.0);
                        Self::tile(plan, bs, batch, rb * bs, j0, rows, cols, &mut tile[..rows * cols]);
                        for di in 0..rows {
                            band[di * n + j0..di * n + j0 + cols]
                                .copy_from_slice(&tile[di * cols..(di + 1) * cols]);
                        }
                    }
                });
            });
        out
    }
}

impl SparseKernel for BlockedKernel {
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
        let shape = plan.output_shape();

        let data = match plan.layout {
            Some(layout) if plan.sparse_out => Self::sparse_output(&plan, layout),
            Some(layout) if plan.a.is_sparse() || plan.b.is_sparse() => {
                Self::dense_output(&plan, layout.block_size())
            }
            // nothing to skip; any chunking is as good as another
            _ => Self::dense_output(&plan, plan.m.clamp(1, 32)),
        };

        Ok(Ten64::new(shape, data))
    }
}
