//! Block layouts.
//!
//! A [`BlockLayout`] describes which `block_size × block_size` tiles of a
//! `rows × cols` block grid are present. Present blocks are numbered by
//! *slot* in row-major order; a sparse tensor stores its blocks in slot
//! order along its third-to-last axis.
//!
//! The layout is indexed twice, once per axis, so kernels can walk either
//! the rows or the columns of the stored matrix (the latter is what a
//! transposed sparse operand needs):
//!
//! - the row axis lists, for every block-row, its `(column, slot)` entries;
//! - the column axis lists, for every block-column, its `(row, slot)` entries.
//!
//! Both are CSR tables: an offsets array with one entry per line plus one,
//! and a flat entries array sorted by line then coordinate.

use crate::error::{Error, Result};
use crate::tensors::Ten64;

/// One present block as seen from one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Block coordinate along the other axis.
    pub index: u16,
    /// Storage slot of the block.
    pub slot: u32,
}

/// CSR lookup table for one axis of a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisTable {
    offsets: Vec<u32>,
    entries: Vec<BlockEntry>,
}

impl AxisTable {
    /// Number of lines (block-rows or block-columns).
    pub fn lines(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Present blocks along one line, sorted by coordinate.
    pub fn line(&self, line: usize) -> &[BlockEntry] {
        let start = self.offsets[line] as usize;
        let end = self.offsets[line + 1] as usize;
        &self.entries[start..end]
    }

    /// Slot of the block at `(line, index)`, if present.
    pub fn find(&self, line: usize, index: usize) -> Option<usize> {
        let entries = self.line(line);
        entries
            .binary_search_by_key(&index, |e| usize::from(e.index))
            .ok()
            .map(|i| entries[i].slot as usize)
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }
}

/// Immutable description of a block-sparsity pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    block_size: usize,
    rows: usize,
    cols: usize,
    row_axis: AxisTable,
    col_axis: AxisTable,
}

impl BlockLayout {
    /// Builds a layout from a row-major presence mask over the block grid.
    ///
    /// # Errors
    /// [`Error::InvalidLayout`] if the mask length is not `rows * cols`, the
    /// block size is zero, or the grid is too large for the table encoding.
    pub fn from_mask(block_size: usize, rows: usize, cols: usize, mask: &[bool]) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidLayout("block size must be positive".into()));
        }
        if rows > usize::from(u16::MAX) || cols > usize::from(u16::MAX) {
            return Err(Error::InvalidLayout(format!(
                "{rows}x{cols} block grid exceeds {} blocks per axis",
                u16::MAX
            )));
        }
        if rows.checked_mul(cols) != Some(mask.len()) {
            return Err(Error::InvalidLayout(format!(
                "mask has {} entries for a {rows}x{cols} block grid",
                mask.len()
            )));
        }
        if u32::try_from(mask.len()).is_err() {
            return Err(Error::InvalidLayout("too many blocks".into()));
        }

        // slots follow row-major order
        let mut slots = vec![None; mask.len()];
        let mut next = 0u32;
        for (cell, &present) in slots.iter_mut().zip(mask) {
            if present {
                *cell = Some(next);
                next += 1;
            }
        }

        let build = |lines: usize, span: usize, at: &dyn Fn(usize, usize) -> usize| {
            let mut offsets = Vec::with_capacity(lines + 1);
            let mut entries = Vec::new();
            offsets.push(0);
            for line in 0..lines {
                for index in 0..span {
                    if let Some(slot) = slots[at(line, index)] {
                        // bounded by the u16 grid check above
                        entries.push(BlockEntry { index: index as u16, slot });
                    }
                }
                offsets.push(entries.len() as u32);
            }
            AxisTable { offsets, entries }
        };

        let row_axis = build(rows, cols, &|r, c| r * cols + c);
        let col_axis = build(cols, rows, &|c, r| r * cols + c);

        Ok(Self {
            block_size,
            rows,
            cols,
            row_axis,
            col_axis,
        })
    }

    /// A layout with every block present.
    pub fn dense(block_size: usize, rows: usize, cols: usize) -> Result<Self> {
        if rows > usize::from(u16::MAX) || cols > usize::from(u16::MAX) {
            return Err(Error::InvalidLayout(format!(
                "{rows}x{cols} block grid exceeds {} blocks per axis",
                u16::MAX
            )));
        }
        Self::from_mask(block_size, rows, cols, &vec![true; rows * cols])
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Block-rows of the stored matrix.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Block-columns of the stored matrix.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of present blocks.
    pub fn block_count(&self) -> usize {
        self.row_axis.entries.len()
    }

    /// Element dimensions `(rows, cols)` of the stored matrix.
    pub fn dims(&self) -> (usize, usize) {
        (self.rows * self.block_size, self.cols * self.block_size)
    }

    pub fn row_axis(&self) -> &AxisTable {
        &self.row_axis
    }

    pub fn col_axis(&self) -> &AxisTable {
        &self.col_axis
    }

    /// Slot of the stored block at `(row, col)`, if present.
    pub fn slot(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.row_axis.find(row, col)
    }

    /// Slot of the block at logical `(row, col)` of the stored matrix or, when
    /// `transposed`, of its transpose.
    pub fn logical_slot(&self, row: usize, col: usize, transposed: bool) -> Option<usize> {
        if transposed {
            if col >= self.rows || row >= self.cols {
                return None;
            }
            self.col_axis.find(row, col)
        } else {
            self.slot(row, col)
        }
    }

    /// Present blocks as `(row, col)` in slot order.
    pub fn blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.rows).flat_map(move |r| {
            self.row_axis
                .line(r)
                .iter()
                .map(move |e| (r, usize::from(e.index)))
        })
    }

    /// Scatters a sparse tensor `[..batch, blocks, bs, bs]` into a dense
    /// `[..batch, rows*bs, cols*bs]` tensor; absent blocks become zero.
    pub fn to_dense(&self, sparse: &Ten64) -> Result<Ten64> {
        let batch_dims = self.sparse_batch_dims(sparse)?;
        let bs = self.block_size;
        let (m, n) = self.dims();
        let per_block = bs * bs;
        let per_batch = self.block_count() * per_block;
        let src = sparse.contiguous().to_vec();
        let batches = batch_dims.iter().product::<usize>();

        let mut out = vec![0.0; batches * m * n];
        for b in 0..batches {
            for (slot, (br, bc)) in self.blocks().enumerate() {
                let block = &src[b * per_batch + slot * per_block..][..per_block];
                for i in 0..bs {
                    let row = b * m * n + (br * bs + i) * n + bc * bs;
                    out[row..row + bs].copy_from_slice(&block[i * bs..(i + 1) * bs]);
                }
            }
        }

        let mut shape = batch_dims;
        shape.extend([m, n]);
        Ok(Ten64::new(shape, out))
    }

    /// Gathers the present blocks of a dense `[..batch, rows*bs, cols*bs]`
    /// tensor into sparse form.
    pub fn from_dense(&self, dense: &Ten64) -> Result<Ten64> {
        let (m, n) = self.dims();
        let shape = dense.shape();
        if shape.len() < 2 || shape[shape.len() - 2..] != [m, n] {
            return Err(Error::InvalidLayout(format!(
                "dense shape {shape:?} does not end in the layout's {m}x{n}"
            )));
        }
        let bs = self.block_size;
        let batch_dims = shape[..shape.len() - 2].to_vec();
        let batches = batch_dims.iter().product::<usize>();
        let src = dense.contiguous().to_vec();

        let mut out = Vec::with_capacity(batches * self.block_count() * bs * bs);
        for b in 0..batches {
            for (br, bc) in self.blocks() {
                for i in 0..bs {
                    let row = b * m * n + (br * bs + i) * n + bc * bs;
                    out.extend_from_slice(&src[row..row + bs]);
                }
            }
        }

        let mut out_shape = batch_dims;
        out_shape.extend([self.block_count(), bs, bs]);
        Ok(Ten64::new(out_shape, out))
    }

    fn sparse_batch_dims(&self, sparse: &Ten64) -> Result<Vec<usize>> {
        let shape = sparse.shape();
        let bs = self.block_size;
        if shape.len() < 3 || shape[shape.len() - 3..] != [self.block_count(), bs, bs] {
            return Err(Error::InvalidLayout(format!(
                "sparse shape {shape:?} does not end in [{}, {bs}, {bs}]",
                self.block_count()
            )));
        }
        Ok(shape[..shape.len() - 3].to_vec())
    }
}
