//! Backward mode algebra.
//!
//! Given the forward call `C = op(A) @ op(B)` under mode `(mA, mB, mC)`,
//! builds the two kernel calls that produce `dA` and `dB` from the upstream
//! gradient `dC`. Nothing here touches a tensor; the result is a
//! [`BackwardCall`] naming which saved operand goes where, with which
//! transpose flags and which mode.
//!
//! Each gradient is again a single product of two of `{A, B, dC}`:
//!
//! | grad | forward flag | product              | call                        | mode          |
//! |------|--------------|----------------------|-----------------------------|---------------|
//! | dA   | `ta = false` | `dC @ op(B)ᵀ`        | `(dC, B, false, !tb)`       | `(mC, mB, mA)`|
//! | dA   | `ta = true`  | `op(B) @ dCᵀ`        | `(B, dC, tb, true)`         | `(mB, mC, mA)`|
//! | dB   | `tb = false` | `op(A)ᵀ @ dC`        | `(A, dC, !ta, false)`       | `(mA, mC, mB)`|
//! | dB   | `tb = true`  | `dCᵀ @ op(A)`        | `(dC, A, true, ta)`         | `(mC, mA, mB)`|
//!
//! When an operand was transposed in the forward pass, its gradient is the
//! transpose of the untransposed rule, `(X @ Y)ᵀ = Yᵀ @ Xᵀ`, which swaps the
//! operand order instead of transposing the result. The result therefore
//! always comes out in the operand's stored orientation, which is what a
//! sparse gradient has to match: it lands in the same layout as its operand.
//!
//! The mode of each call is the forward mode relabelled: each position takes
//! the symbol of the tensor that now occupies it, and the output position
//! takes the symbol of the operand whose gradient is produced.

use crate::mode::{LEFT, OUTPUT, RIGHT, SparsityMode, TransposeFlags};

/// A tensor saved by (or handed to) the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// The forward left input `A`.
    Left,
    /// The forward right input `B`.
    Right,
    /// The upstream gradient `dC`.
    Grad,
}

/// One backward kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackwardCall {
    pub mode: SparsityMode,
    pub operands: [Operand; 2],
    pub transpose: TransposeFlags,
}

/// The call that produces the gradient of the left input.
pub const fn grad_left(mode: SparsityMode, flags: TransposeFlags) -> BackwardCall {
    if flags.a {
        BackwardCall {
            mode: mode.permute([RIGHT, OUTPUT, LEFT]),
            operands: [Operand::Right, Operand::Grad],
            transpose: TransposeFlags::new(flags.b, true),
        }
    } else {
        BackwardCall {
            mode: mode.permute([OUTPUT, RIGHT, LEFT]),
            operands: [Operand::Grad, Operand::Right],
            transpose: TransposeFlags::new(false, !flags.b),
        }
    }
}

/// The call that produces the gradient of the right input.
pub const fn grad_right(mode: SparsityMode, flags: TransposeFlags) -> BackwardCall {
    if flags.b {
        BackwardCall {
            mode: mode.permute([OUTPUT, LEFT, RIGHT]),
            operands: [Operand::Grad, Operand::Left],
            transpose: TransposeFlags::new(true, flags.a),
        }
    } else {
        BackwardCall {
            mode: mode.permute([LEFT, OUTPUT, RIGHT]),
            operands: [Operand::Left, Operand::Grad],
            transpose: TransposeFlags::new(!flags.a, false),
        }
    }
}

/// Both backward calls, `[grad_left, grad_right]`.
pub const fn backward_calls(mode: SparsityMode, flags: TransposeFlags) -> [BackwardCall; 2] {
    [grad_left(mode, flags), grad_right(mode, flags)]
}
