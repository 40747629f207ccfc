#![allow(dead_code)]

use briny_sparse::layout::BlockLayout;
use briny_sparse::mode::{SparsityMode, TransposeFlags};
use briny_sparse::tensors::Ten64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const BLOCK: usize = 2;

/// Inputs for one forward/backward pair.
pub struct Case {
    pub layout: Option<BlockLayout>,
    pub a: Ten64,
    pub b: Ten64,
    pub grad_c: Ten64,
    /// Logical `(m, k, n)`.
    pub dims: (usize, usize, usize),
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random(rng: &mut StdRng, shape: Vec<usize>) -> Ten64 {
    let n = shape.iter().product();
    Ten64::new(shape, (0..n).map(|_| rng.random_range(-1.0..1.0)).collect())
}

fn with_batch(batch: &[usize], tail: &[usize]) -> Vec<usize> {
    batch.iter().chain(tail).copied().collect()
}

/// Builds shapes that fit `mode` and `flags`.
///
/// One sparse position uses a 3x2 block grid so that transposition errors
/// change shapes; two or more share a square 3x3 grid.
pub fn case(mode: SparsityMode, flags: TransposeFlags, batch: &[usize], seed: u64) -> Case {
    let mut rng = rng(seed);

    let (layout, (m, k, n)) = if mode.sparse_count() >= 2 {
        let mask = [true, false, true, false, true, true, true, false, false];
        (Some(BlockLayout::from_mask(BLOCK, 3, 3, &mask).unwrap()), (6, 6, 6))
    } else if mode.any_sparse() {
        let mask = [true, false, true, true, false, true];
        let layout = BlockLayout::from_mask(BLOCK, 3, 2, &mask).unwrap();
        let (r, c) = layout.dims();
        let dims = if mode.left().is_sparse() {
            let (m, k) = if flags.a { (c, r) } else { (r, c) };
            (m, k, 3)
        } else if mode.right().is_sparse() {
            let (k, n) = if flags.b { (c, r) } else { (r, c) };
            (5, k, n)
        } else {
            (r, 3, c)
        };
        (Some(layout), dims)
    } else {
        (None, (5, 3, 4))
    };

    let shape_of = |sparse: bool, rows: usize, cols: usize, trans: bool| match (&layout, sparse) {
        (Some(layout), true) => with_batch(batch, &[layout.block_count(), BLOCK, BLOCK]),
        _ if trans => with_batch(batch, &[cols, rows]),
        _ => with_batch(batch, &[rows, cols]),
    };

    let a = random(&mut rng, shape_of(mode.left().is_sparse(), m, k, flags.a));
    let b = random(&mut rng, shape_of(mode.right().is_sparse(), k, n, flags.b));
    let grad_c = random(&mut rng, shape_of(mode.output().is_sparse(), m, n, false));

    Case {
        layout,
        a,
        b,
        grad_c,
        dims: (m, k, n),
    }
}

/// Every `(mode, flags)` pair.
pub fn configurations() -> impl Iterator<Item = (SparsityMode, TransposeFlags)> {
    SparsityMode::all().flat_map(|mode| TransposeFlags::all().into_iter().map(move |f| (mode, f)))
}

/// Logical dense matrix of one operand, for plain reference arithmetic.
pub fn logical(t: &Ten64, sparse: bool, layout: Option<&BlockLayout>, trans: bool) -> Ten64 {
    let dense = match (sparse, layout) {
        (true, Some(layout)) => layout.to_dense(t).unwrap(),
        _ => t.clone(),
    };
    if trans { dense.transpose().contiguous() } else { dense }
}

/// Textbook `[m, k] @ [k, n]` on unbatched logical matrices.
pub fn naive_matmul(a: &Ten64, b: &Ten64) -> Ten64 {
    let (m, k) = (a.shape()[0], a.shape()[1]);
    let n = b.shape()[1];
    assert_eq!(k, b.shape()[0]);
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        for j in 0..n {
            for l in 0..k {
                out[i * n + j] += a.get(&[i, l]) * b.get(&[l, j]);
            }
        }
    }
    Ten64::new(vec![m, n], out)
}
