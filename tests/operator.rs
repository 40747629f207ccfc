mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use briny_sparse::backprop::{sparse_matmul, OperatorState, SparseMatMul};
use briny_sparse::error::{Error, KernelError};
use briny_sparse::layout::BlockLayout;
use briny_sparse::mode::{SparsityMode, TransposeFlags};
use briny_sparse::ops::{ReferenceKernel, SparseKernel};
use briny_sparse::tensors::Ten64;
use common::{case, configurations};

/// Reference kernel that counts its calls, notes strided operands, and
/// fails from call `fail_at` on.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
    saw_strided: AtomicBool,
    fail_at: Option<usize>,
}

impl Counting {
    fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SparseKernel for Counting {
    fn multiply(
        &self,
        a: &Ten64,
        b: &Ten64,
        mode: SparsityMode,
        layout: Option<&BlockLayout>,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Ten64, KernelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !a.is_contiguous() || !b.is_contiguous() {
            self.saw_strided.store(true, Ordering::SeqCst);
        }
        if self.fail_at.is_some_and(|at| call >= at) {
            return Err(KernelError::Other("injected failure".into()));
        }
        ReferenceKernel.multiply(a, b, mode, layout, trans_a, trans_b)
    }
}

fn ddd() -> SparsityMode {
    "ddd".parse().unwrap()
}

fn is_state_error(err: &Error, expected: OperatorState, found: OperatorState) -> bool {
    matches!(
        err,
        Error::InvalidOperatorState { expected: e, found: f } if *e == expected && *f == found
    )
}

#[test]
fn test_skipped_gradients_make_no_kernel_call() {
    for (mode, flags) in configurations() {
        let c = case(mode, flags, &[], 3);
        for (grad_a, grad_b) in [(false, false), (true, false), (false, true), (true, true)] {
            let kernel = Counting::default();
            let mut op = SparseMatMul::new(&kernel);
            let a = c.a.clone().with_requires_grad(grad_a);
            let b = c.b.clone().with_requires_grad(grad_b);
            op.forward(&a, &b, mode, c.layout.as_ref(), flags).unwrap();
            assert_eq!(kernel.calls(), 1);

            let grads = op.backward(&c.grad_c).unwrap();
            assert_eq!(grads.grad_a.is_some(), grad_a, "mode {mode}, flags {flags:?}");
            assert_eq!(grads.grad_b.is_some(), grad_b, "mode {mode}, flags {flags:?}");
            assert_eq!(kernel.calls(), 1 + grad_a as usize + grad_b as usize);
        }
    }
}

#[test]
fn test_strided_upstream_gradient_matches_its_copy() {
    for (mode, flags) in configurations() {
        let c = case(mode, flags, &[], 5);
        let a = c.a.clone().with_requires_grad(true);
        let b = c.b.clone().with_requires_grad(true);

        // same logical shape as grad_c, stored with the last two axes swapped
        let strided = c.grad_c.transpose().contiguous().transpose();
        assert!(!strided.is_contiguous());
        assert_eq!(strided, c.grad_c);

        let run = |grad: &Ten64| {
            let mut op = SparseMatMul::new(ReferenceKernel);
            op.forward(&a, &b, mode, c.layout.as_ref(), flags).unwrap();
            op.backward(grad).unwrap()
        };
        assert_eq!(run(&strided), run(&c.grad_c), "mode {mode}, flags {flags:?}");
    }
}

#[test]
fn test_strided_forward_inputs_match_their_copies() {
    for (mode, flags) in configurations() {
        let c = case(mode, flags, &[], 13);
        let a = c.a.clone().with_requires_grad(true);
        let b = c.b.clone().with_requires_grad(true);

        // same logical tensors, stored with the last two axes swapped
        let a_view = a.transpose().contiguous().transpose();
        let b_view = b.transpose().contiguous().transpose();
        assert!(!a_view.is_contiguous() && !b_view.is_contiguous());
        assert!(a_view.requires_grad() && b_view.requires_grad());

        let mut op = SparseMatMul::new(Counting::default());
        let out = op.forward(&a_view, &b_view, mode, c.layout.as_ref(), flags).unwrap();
        let strided = op.backward(&c.grad_c).unwrap();
        assert!(!op.kernel().saw_strided.load(Ordering::SeqCst), "mode {mode}, flags {flags:?}");
        assert_eq!(op.kernel().calls(), 3);

        let grad_a = strided.grad_a.as_ref().unwrap();
        assert_eq!(grad_a.shape(), a_view.shape());
        assert_eq!(strided.grad_b.as_ref().unwrap().shape(), b_view.shape());

        let mut op = SparseMatMul::new(ReferenceKernel);
        let expected_out = op.forward(&a, &b, mode, c.layout.as_ref(), flags).unwrap();
        let expected = op.backward(&c.grad_c).unwrap();
        assert_eq!(out, expected_out, "mode {mode}, flags {flags:?}");
        assert_eq!(strided, expected, "mode {mode}, flags {flags:?}");
    }
}

#[test]
fn test_backward_before_forward_fails() {
    let mut op = SparseMatMul::new(ReferenceKernel);
    let err = op.backward(&Ten64::zeros(vec![2, 2])).unwrap_err();
    assert!(is_state_error(&err, OperatorState::Armed, OperatorState::Unarmed));
    // still usable
    assert_eq!(op.state(), OperatorState::Unarmed);
}

#[test]
fn test_backward_twice_fails() {
    let a = Ten64::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).with_requires_grad(true);
    let mut op = SparseMatMul::new(ReferenceKernel);
    op.forward(&a, &a, ddd(), None, TransposeFlags::NONE).unwrap();
    assert_eq!(op.state(), OperatorState::Armed);

    op.backward(&Ten64::zeros(vec![2, 2])).unwrap();
    assert_eq!(op.state(), OperatorState::Consumed);

    let err = op.backward(&Ten64::zeros(vec![2, 2])).unwrap_err();
    assert!(is_state_error(&err, OperatorState::Armed, OperatorState::Consumed));
}

#[test]
fn test_forward_twice_fails() {
    let a = Ten64::zeros(vec![2, 2]);
    let mut op = SparseMatMul::new(ReferenceKernel);
    op.forward(&a, &a, ddd(), None, TransposeFlags::NONE).unwrap();
    let err = op.forward(&a, &a, ddd(), None, TransposeFlags::NONE).unwrap_err();
    assert!(is_state_error(&err, OperatorState::Unarmed, OperatorState::Armed));
    assert_eq!(op.state(), OperatorState::Armed);

    op.backward(&Ten64::zeros(vec![2, 2])).unwrap();
    let err = op.forward(&a, &a, ddd(), None, TransposeFlags::NONE).unwrap_err();
    assert!(is_state_error(&err, OperatorState::Unarmed, OperatorState::Consumed));
}

#[test]
fn test_forward_kernel_errors_pass_through() {
    let a = Ten64::zeros(vec![2, 3]);
    let b = Ten64::zeros(vec![4, 2]);
    let mut op = SparseMatMul::new(ReferenceKernel);
    let err = op.forward(&a, &b, ddd(), None, TransposeFlags::NONE).unwrap_err();
    assert!(matches!(err, Error::Kernel(KernelError::ShapeMismatch { .. })), "{err}");
    assert_eq!(op.state(), OperatorState::Unarmed);

    // a failed forward can be retried
    let b = Ten64::zeros(vec![3, 2]);
    let c = op.forward(&a, &b, ddd(), None, TransposeFlags::NONE).unwrap();
    assert_eq!(c.shape(), &[2, 2]);
}

#[test]
fn test_failed_backward_still_consumes() {
    let kernel = Counting::failing_at(1);
    let a = Ten64::new(vec![2, 2], vec![1.0; 4]).with_requires_grad(true);
    let mut op = SparseMatMul::new(&kernel);
    op.forward(&a, &a, ddd(), None, TransposeFlags::NONE).unwrap();

    let err = op.backward(&Ten64::zeros(vec![2, 2])).unwrap_err();
    assert!(matches!(err, Error::Kernel(KernelError::Other(_))));
    assert_eq!(op.state(), OperatorState::Consumed);
}

#[test]
fn test_wrong_upstream_shape_is_a_kernel_error() {
    let a = Ten64::new(vec![2, 3], vec![1.0; 6]).with_requires_grad(true);
    let b = Ten64::new(vec![3, 4], vec![1.0; 12]).with_requires_grad(true);
    let mut op = SparseMatMul::new(ReferenceKernel);
    op.forward(&a, &b, ddd(), None, TransposeFlags::NONE).unwrap();

    let err = op.backward(&Ten64::zeros(vec![2, 5])).unwrap_err();
    assert!(matches!(err, Error::Kernel(_)), "{err}");
    assert_eq!(op.state(), OperatorState::Consumed);
}

#[test]
fn test_closure_form_on_global_backend() {
    let mode: SparsityMode = "sds".parse().unwrap();
    let flags = TransposeFlags::new(true, false);
    let c = case(mode, flags, &[], 17);
    let a = c.a.clone().with_requires_grad(true);
    let b = c.b.clone();

    let (out, back) = sparse_matmul(&a, &b, mode, c.layout.as_ref(), flags).unwrap();
    assert_eq!(out.shape(), c.grad_c.shape());

    let (da, db) = back(&c.grad_c).unwrap().into_pair();
    assert_eq!(da.unwrap().shape(), a.shape());
    assert!(db.is_none());
}
