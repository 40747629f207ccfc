//! Utilities to approximate equality of floating point values.
//!
//! Comparisons are graded rather than boolean: [`ApproxEquality`] says how
//! close two values are, and callers pick the grade they can live with.
//! Tensors compare as their worst element.

use crate::tensors::Ten64;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected minimum epsilon accepted on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon accepted on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// The approximated equality enumerated, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Checks the relative distance based off epsilon.
pub trait RelativeEq<Rhs: ?Sized> {
    /// Grades the equality of `self` and `rhs`.
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality;
}

impl RelativeEq<Self> for f64 {
    /// Distance is scaled by the larger magnitude once it exceeds 1, so large
    /// gradients are not held to an absolute tolerance.
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self == rhs {
            return ApproxEquality::Precise;
        }
        let dif = (self - rhs).abs() / self.abs().max(rhs.abs()).max(1.0);

        if dif < F64_MIN_ERROR {
            ApproxEquality::Precise
        } else if dif < F64_AVG_ERROR {
            ApproxEquality::Partial
        } else if dif < F64_MAX_ERROR {
            ApproxEquality::Relative
        } else {
            ApproxEquality::Scarce
        }
    }
}

impl<T: RelativeEq<U>, U> RelativeEq<[U]> for [T] {
    fn approx_eq(&self, rhs: &[U]) -> ApproxEquality {
        if self.len() != rhs.len() {
            return ApproxEquality::Scarce;
        }
        let mut worst = ApproxEquality::Precise;
        for (t_val, u_val) in self.iter().zip(rhs) {
            worst = worst.max(t_val.approx_eq(u_val));
            if worst == ApproxEquality::Scarce {
                break;
            }
        }
        worst
    }
}

impl RelativeEq<Self> for Ten64 {
    fn approx_eq(&self, rhs: &Self) -> ApproxEquality {
        if self.shape() != rhs.shape() {
            return ApproxEquality::Scarce;
        }
        self.to_vec().as_slice().approx_eq(rhs.to_vec().as_slice())
    }
}

/// Whether `a` and `b` are at least as close as `grade`.
pub fn approx_within<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B, grade: ApproxEquality) -> bool {
    a.approx_eq(b) <= grade
}

/// Approximates equality at [`ApproxEquality::Precise`].
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    approx_within(a, b, ApproxEquality::Precise)
}
