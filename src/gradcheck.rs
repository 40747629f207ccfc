//! Finite-difference gradient checks.
//!
//! The backward pass is verified against central differences of the scalar
//! loss `L = sum(C ⊙ G)`, whose gradient with respect to `C` is exactly `G`.
//! Since `C` is linear in each input, central differences are exact up to
//! rounding, so a wrong permutation or flag shows up as a large error rather
//! than noise.

use crate::approx::{ApproxEquality, RelativeEq};
use crate::backprop::{Gradients, SparseMatMul};
use crate::error::Result;
use crate::layout::BlockLayout;
use crate::mode::{SparsityMode, TransposeFlags};
use crate::ops::SparseKernel;
use crate::tensors::Ten64;

/// Default finite-difference step for `f64`.
pub const DEFAULT_STEP: f64 = 1e-6;

/// Central-difference gradient of `f` at `x`, in `x`'s shape.
///
/// # Errors
/// Whatever `f` returns.
pub fn numerical_gradient<F>(f: F, x: &Ten64, eps: f64) -> Result<Ten64>
where
    F: Fn(&Ten64) -> Result<f64>,
{
    let shape = x.shape().to_vec();
    let base = x.to_vec();
    let mut grad = Vec::with_capacity(base.len());
    for i in 0..base.len() {
        let mut probe = base.clone();
        probe[i] = base[i] + eps;
        let up = f(&Ten64::new(shape.clone(), probe.clone()))?;
        probe[i] = base[i] - eps;
        let down = f(&Ten64::new(shape.clone(), probe))?;
        grad.push((up - down) / (2.0 * eps));
    }
    Ok(Ten64::new(shape, grad))
}

/// `sum(a ⊙ b)` over logical elements.
///
/// # Panics
/// Panics if the shapes differ.
pub fn inner(a: &Ten64, b: &Ten64) -> f64 {
    assert_eq!(a.shape(), b.shape(), "inner product shape mismatch");
    a.to_vec().iter().zip(b.to_vec()).map(|(x, y)| x * y).sum()
}

/// Analytic and numerical gradients side by side.
#[derive(Debug, Clone)]
pub struct GradCheck {
    pub analytic: Gradients,
    pub numerical_a: Ten64,
    pub numerical_b: Ten64,
}

impl GradCheck {
    /// Worst agreement over both inputs. A missing analytic gradient grades
    /// as [`ApproxEquality::Scarce`].
    pub fn grade(&self) -> ApproxEquality {
        let grade = |analytic: &Option<Ten64>, numerical: &Ten64| match analytic {
            Some(g) => g.approx_eq(numerical),
            None => ApproxEquality::Scarce,
        };
        grade(&self.analytic.grad_a, &self.numerical_a)
            .max(grade(&self.analytic.grad_b, &self.numerical_b))
    }
}

/// Runs one forward/backward pair through `kernel` and the matching central
/// differences of `sum(C ⊙ grad_c)`.
///
/// Both inputs are treated as requiring gradients regardless of their flags.
/// Strided inputs are checked through their contiguous copies, as
/// [`SparseMatMul::forward`] would see them.
///
/// # Errors
/// Any operator or kernel error.
pub fn check_sparse_matmul<K: SparseKernel>(
    kernel: &K,
    a: &Ten64,
    b: &Ten64,
    mode: SparsityMode,
    layout: Option<&BlockLayout>,
    transpose: TransposeFlags,
    grad_c: &Ten64,
) -> Result<GradCheck> {
    let a = a.contiguous().with_requires_grad(true);
    let b = b.contiguous().with_requires_grad(true);

    let mut op = SparseMatMul::new(kernel);
    op.forward(&a, &b, mode, layout, transpose)?;
    let analytic = op.backward(grad_c)?;

    let loss = |x: &Ten64, y: &Ten64| -> Result<f64> {
        let c = kernel.multiply(x, y, mode, layout, transpose.a, transpose.b)?;
        Ok(inner(&c, grad_c))
    };
    let numerical_a = numerical_gradient(|x| loss(x, &b), &a, DEFAULT_STEP)?;
    let numerical_b = numerical_gradient(|y| loss(&a, y), &b, DEFAULT_STEP)?;

    Ok(GradCheck {
        analytic,
        numerical_a,
        numerical_b,
    })
}
