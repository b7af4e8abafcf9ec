// SPDX-FileCopyrightText: openot contributors
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Property-based checks of the Text OT algebra's algebraic laws, run
//! over randomly generated snapshots and operations.

use openot::ot::{self, Operation, Side};
use proptest::prelude::*;

/// Builds a normalized operation that traverses exactly `len` units of
/// some snapshot, interleaving retains/deletes with inserts of random
/// text. Forcing full traversal (rather than relying on lenient apply's
/// trailing copy) keeps two independently generated operations over the
/// same snapshot comparable by `transform`/`compose`.
fn arb_op(len: usize) -> impl Strategy<Value = Operation> {
    proptest::collection::vec((0u8..3, 1usize..6, "[a-zA-Z]{0,4}"), 0..8).prop_map(move |steps| {
        let mut op = Operation::new();
        let mut remaining = len;
        for (kind, amount, text) in steps {
            match kind {
                0 => {
                    if !text.is_empty() {
                        op.insert(text);
                    }
                }
                1 => {
                    let n = amount.min(remaining);
                    if n > 0 {
                        op.retain(n);
                        remaining -= n;
                    }
                }
                _ => {
                    let n = amount.min(remaining);
                    if n > 0 {
                        op.delete(n);
                        remaining -= n;
                    }
                }
            }
        }
        if remaining > 0 {
            op.retain(remaining);
        }
        op
    })
}

fn arb_snapshot() -> impl Strategy<Value = String> {
    "[a-zA-Z]{0,12}"
}

/// A snapshot paired with a single operation that fully traverses it.
fn arb_snapshot_and_op() -> impl Strategy<Value = (String, Operation)> {
    arb_snapshot().prop_flat_map(|s| {
        let len = s.chars().count();
        (Just(s), arb_op(len))
    })
}

/// A snapshot paired with two independently generated operations, both
/// built against that same snapshot.
fn arb_snapshot_and_two_ops() -> impl Strategy<Value = (String, Operation, Operation)> {
    arb_snapshot().prop_flat_map(|s| {
        let len = s.chars().count();
        (Just(s), arb_op(len), arb_op(len))
    })
}

proptest! {
    #[test]
    fn apply_is_deterministic((s, op) in arb_snapshot_and_op()) {
        prop_assert_eq!(ot::apply(&s, &op), ot::apply(&s, &op));
    }

    #[test]
    fn normalize_is_idempotent((_s, op) in arb_snapshot_and_op()) {
        let once = ot::normalize(&op);
        let twice = ot::normalize(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn compose_matches_sequential_apply((s, a, b) in arb_snapshot_and_two_ops()) {
        let after_a = ot::apply(&s, &a).unwrap();
        let via_compose = ot::apply(&s, &ot::compose(&a, &b)).unwrap();
        let via_sequential = ot::apply(&after_a, &b).unwrap();
        prop_assert_eq!(via_compose, via_sequential);
    }

    #[test]
    fn transform_converges_tp1((s, a, b) in arb_snapshot_and_two_ops()) {
        let via_a_then_b = ot::apply(
            &ot::apply(&s, &a).unwrap(),
            &ot::transform(&b, &a, Side::Right),
        ).unwrap();
        let via_b_then_a = ot::apply(
            &ot::apply(&s, &b).unwrap(),
            &ot::transform(&a, &b, Side::Left),
        ).unwrap();
        prop_assert_eq!(via_a_then_b, via_b_then_a);
    }

    #[test]
    fn empty_op_is_identity_for_every_operator((s, op) in arb_snapshot_and_op()) {
        let empty = Operation::new();
        prop_assert_eq!(ot::apply(&s, &empty).unwrap(), s.clone());
        prop_assert_eq!(ot::compose(&empty, &op), op.clone());
        prop_assert_eq!(ot::compose(&op, &empty), op.clone());
        prop_assert_eq!(ot::transform(&op, &empty, Side::Left), op.clone());
        prop_assert_eq!(ot::transform(&op, &empty, Side::Right), op);
    }

    #[test]
    fn insert_insert_tie_break_preserves_both_texts(
        pos in 0usize..10,
        left_text in "[a-zA-Z]{1,4}",
        right_text in "[a-zA-Z]{1,4}",
        tail in 0usize..10,
    ) {
        let mut a = Operation::new();
        a.retain(pos).insert(left_text.clone()).retain(tail);
        let mut b = Operation::new();
        b.retain(pos).insert(right_text.clone()).retain(tail);

        let base: String = "x".repeat(pos + tail);
        let a_then_b = ot::apply(&ot::apply(&base, &a).unwrap(), &ot::transform(&b, &a, Side::Right)).unwrap();
        let b_then_a = ot::apply(&ot::apply(&base, &b).unwrap(), &ot::transform(&a, &b, Side::Left)).unwrap();

        prop_assert_eq!(&a_then_b, &b_then_a);
        prop_assert!(a_then_b.contains(&left_text));
        prop_assert!(a_then_b.contains(&right_text));
    }
}
