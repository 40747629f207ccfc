mod common;

use briny_sparse::approx::{approx_within, ApproxEquality};
use briny_sparse::gradcheck::check_sparse_matmul;
use briny_sparse::mode::{SparsityMode, TransposeFlags};
use briny_sparse::ops::{BlockedKernel, ReferenceKernel, SparseKernel};
use common::{case, configurations, logical, naive_matmul};

#[test]
fn dense_mode_matches_textbook_product() {
    let mode: SparsityMode = "ddd".parse().unwrap();
    for flags in TransposeFlags::all() {
        let c = case(mode, flags, &[], 7);
        let expected = naive_matmul(
            &logical(&c.a, false, None, flags.a),
            &logical(&c.b, false, None, flags.b),
        );
        for kernel in [&ReferenceKernel as &dyn SparseKernel, &BlockedKernel] {
            let out = kernel.multiply(&c.a, &c.b, mode, None, flags.a, flags.b).unwrap();
            assert!(
                approx_within(&out, &expected, ApproxEquality::Partial),
                "flags {flags:?}"
            );
        }
    }
}

#[test]
fn sparse_modes_match_textbook_product_on_dense_equivalents() {
    for (mode, flags) in configurations() {
        let c = case(mode, flags, &[], 11);
        let layout = c.layout.as_ref();
        let expected = naive_matmul(
            &logical(&c.a, mode.left().is_sparse(), layout, flags.a),
            &logical(&c.b, mode.right().is_sparse(), layout, flags.b),
        );
        let out = ReferenceKernel
            .multiply(&c.a, &c.b, mode, layout, flags.a, flags.b)
            .unwrap();
        let out = logical(&out, mode.output().is_sparse(), layout, false);

        let expected = match (mode.output().is_sparse(), layout) {
            // absent output blocks are not computed
            (true, Some(layout)) => layout.to_dense(&layout.from_dense(&expected).unwrap()).unwrap(),
            _ => expected,
        };
        assert!(
            approx_within(&out, &expected, ApproxEquality::Partial),
            "mode {mode}, flags {flags:?}"
        );
    }
}

#[test]
fn gradients_match_finite_differences_for_every_configuration() {
    for (mode, flags) in configurations() {
        let c = case(mode, flags, &[], 23);
        let check = check_sparse_matmul(
            &ReferenceKernel,
            &c.a,
            &c.b,
            mode,
            c.layout.as_ref(),
            flags,
            &c.grad_c,
        )
        .unwrap();

        let grad_a = check.analytic.grad_a.as_ref().unwrap();
        let grad_b = check.analytic.grad_b.as_ref().unwrap();
        assert_eq!(grad_a.shape(), c.a.shape(), "dA shape, mode {mode}, flags {flags:?}");
        assert_eq!(grad_b.shape(), c.b.shape(), "dB shape, mode {mode}, flags {flags:?}");
        assert!(
            check.grade() <= ApproxEquality::Partial,
            "mode {mode}, flags {flags:?}: {:?}",
            check.grade()
        );
    }
}

#[test]
fn blocked_kernel_gradients_match_finite_differences() {
    for (mode, flags) in configurations() {
        let c = case(mode, flags, &[], 29);
        let check = check_sparse_matmul(
            &BlockedKernel,
            &c.a,
            &c.b,
            mode,
            c.layout.as_ref(),
            flags,
            &c.grad_c,
        )
        .unwrap();
        assert!(
            check.grade() <= ApproxEquality::Partial,
            "mode {mode}, flags {flags:?}: {:?}",
            check.grade()
        );
    }
}

#[test]
fn batched_gradients_match_finite_differences() {
    for mode in ["sdd", "dsd", "dds", "sss"] {
        let mode: SparsityMode = mode.parse().unwrap();
        for flags in TransposeFlags::all() {
            let c = case(mode, flags, &[2], 31);
            let check = check_sparse_matmul(
                &ReferenceKernel,
                &c.a,
                &c.b,
                mode,
                c.layout.as_ref(),
                flags,
                &c.grad_c,
            )
            .unwrap();
            assert!(
                check.grade() <= ApproxEquality::Partial,
                "mode {mode}, flags {flags:?}: {:?}",
                check.grade()
            );
        }
    }
}

#[test]
fn kernels_agree_on_every_configuration() {
    for batch in [&[][..], &[2, 1][..]] {
        for (mode, flags) in configurations() {
            let c = case(mode, flags, batch, 37);
            let layout = c.layout.as_ref();
            let reference = ReferenceKernel
                .multiply(&c.a, &c.b, mode, layout, flags.a, flags.b)
                .unwrap();
            let blocked = BlockedKernel
                .multiply(&c.a, &c.b, mode, layout, flags.a, flags.b)
                .unwrap();
            assert_eq!(reference.shape(), blocked.shape());
            assert!(
                approx_within(&blocked, &reference, ApproxEquality::Precise),
                "mode {mode}, flags {flags:?}, batch {batch:?}"
            );
        }
    }
}
