//! Property suite: the planner must agree with the index-free oracle for
//! every catalogue configuration, and the index family must hold its
//! ordering contracts on arbitrary frames.

use std::cmp::Ordering;

use proptest::prelude::*;

use rf_conformance::reference_rows;
use rf_expr::{Expr, Predicate, col};
use rf_frame::{Frame, Table, TableExt};
use rf_index::{HashMultiIndex, IndexKind, OrderedIndex};
use rf_query::IndexedFrame;
use rf_types::{Value, value_cmp, value_eq};

const NAMES: [&str; 5] = ["ash", "birch", "cedar", "elm", "fir"];

fn arb_frame() -> impl Strategy<Value = Frame> {
    prop::collection::vec((0..8_i32, 0..NAMES.len(), -3.0..3.0_f64), 0..24).prop_map(|rows| {
        let tuples: Vec<(i32, String, f64)> = rows
            .into_iter()
            .map(|(id, name, score)| (id, NAMES[name].to_owned(), score))
            .collect();
        Frame::from_tuples(tuples, &["id", "name", "score"]).expect("generated frame")
    })
}

/// `(column, operator, int literal, name literal, float literal)`
type LeafChoice = (usize, usize, i32, usize, f64);

fn arb_leaf() -> impl Strategy<Value = LeafChoice> {
    (0..3_usize, 0..8_usize, 0..8_i32, 0..NAMES.len(), -3.0..3.0_f64)
}

fn build_leaf((column, op, int_lit, name_lit, float_lit): LeafChoice) -> Expr {
    match column {
        0 => {
            let c = col("id");
            match op {
                0 => c.eq(int_lit),
                1 => c.ne(int_lit),
                2 => c.lt(int_lit),
                3 => c.le(int_lit),
                4 => c.gt(int_lit),
                5 => c.ge(int_lit),
                6 => c.isin(vec![int_lit, int_lit + 1]),
                _ => c.notin(vec![int_lit, int_lit + 2]),
            }
        }
        1 => {
            let c = col("name");
            let name = NAMES[name_lit];
            match op {
                0 => c.eq(name),
                1 => c.ne(name),
                2 => c.lt(name),
                3 => c.le(name),
                4 => c.gt(name),
                5 => c.ge(name),
                6 => c.isin(vec![name, NAMES[(name_lit + 1) % NAMES.len()]]),
                _ => c.notin(vec![name, NAMES[(name_lit + 2) % NAMES.len()]]),
            }
        }
        _ => {
            let c = col("score");
            match op {
                0 => c.eq(float_lit),
                1 => c.ne(float_lit),
                2 => c.lt(float_lit),
                3 => c.le(float_lit),
                4 => c.gt(float_lit),
                5 => c.ge(float_lit),
                6 => c.isin(vec![float_lit, float_lit + 1.0]),
                _ => c.notin(vec![float_lit, float_lit + 1.0]),
            }
        }
    }
}

/// Register the catalogue subset selected by `mask`: one hash and one
/// ordered slot per column, the ordered ones descending when `reverse`.
fn apply_index_mask(facade: &mut IndexedFrame, mask: u8, reverse: bool) {
    let ordered_kind = if reverse {
        IndexKind::ReverseOrdered
    } else {
        IndexKind::Ordered
    };
    let slots: [(IndexKind, &str); 6] = [
        (IndexKind::HashMulti, "id"),
        (IndexKind::HashMulti, "name"),
        (IndexKind::HashMulti, "score"),
        (ordered_kind, "id"),
        (ordered_kind, "name"),
        (ordered_kind, "score"),
    ];
    for (bit, (kind, column)) in slots.into_iter().enumerate() {
        if mask & (1 << bit) != 0 {
            facade
                .add_index(kind, &[column], None)
                .expect("index builds");
        }
    }
}

proptest! {
    #[test]
    fn leaf_planning_matches_the_oracle(
        frame in arb_frame(),
        choice in arb_leaf(),
        mask in 0u8..64,
        reverse in any::<bool>(),
    ) {
        let predicate: Predicate = build_leaf(choice).into();
        let expected = reference_rows(&frame, &predicate);
        let mut facade = IndexedFrame::new(frame);
        apply_index_mask(&mut facade, mask, reverse);
        let planned = facade.plan(&predicate).expect("plan");
        prop_assert_eq!(planned, expected);
    }

    #[test]
    fn conjunction_planning_matches_the_oracle(
        frame in arb_frame(),
        first in arb_leaf(),
        second in arb_leaf(),
        mask in 0u8..64,
    ) {
        let predicate: Predicate = (build_leaf(first) & build_leaf(second)).into();
        let expected = reference_rows(&frame, &predicate);
        let mut facade = IndexedFrame::new(frame);
        apply_index_mask(&mut facade, mask, false);
        let planned = facade.plan(&predicate).expect("plan");
        prop_assert_eq!(planned, expected);
    }

    #[test]
    fn disjunction_planning_matches_the_oracle(
        frame in arb_frame(),
        first in arb_leaf(),
        second in arb_leaf(),
        third in arb_leaf(),
        mask in 0u8..64,
    ) {
        let predicate: Predicate =
            ((build_leaf(first) & build_leaf(second)) | build_leaf(third)).into();
        let expected = reference_rows(&frame, &predicate);
        let mut facade = IndexedFrame::new(frame);
        apply_index_mask(&mut facade, mask, false);
        let planned = facade.plan(&predicate).expect("plan");
        prop_assert_eq!(planned, expected);
    }

    #[test]
    fn ordered_index_rows_are_monotone(frame in arb_frame(), reverse in any::<bool>()) {
        let index = OrderedIndex::by_names(&frame, &["id", "score"], reverse)
            .expect("ordered index");
        let cols = index.cols().to_vec();
        for pair in index.row_order().windows(2) {
            let left = frame.row_ref_cols(pair[0], &cols);
            let right = frame.row_ref_cols(pair[1], &cols);
            let relation = left.partial_cmp(&right);
            if reverse {
                prop_assert_ne!(relation, Some(Ordering::Less));
            } else {
                prop_assert_ne!(relation, Some(Ordering::Greater));
            }
        }
    }

    #[test]
    fn hash_multi_buckets_ascend_and_cover(frame in arb_frame()) {
        let index = HashMultiIndex::by_names(&frame, &["name"]).expect("multi index");
        for row in 0..frame.rows() {
            let key = frame.value_at(row, 1);
            let bucket = index.get1(&frame, key).expect("own key is present");
            prop_assert!(bucket.windows(2).all(|pair| pair[0] < pair[1]));
            prop_assert!(bucket.contains(&row));
        }
    }

    #[test]
    fn de_morgan_partitions_the_rows(
        frame in arb_frame(),
        first in arb_leaf(),
        second in arb_leaf(),
    ) {
        let conjunction: Predicate = (build_leaf(first) & build_leaf(second)).into();
        let negation: Predicate =
            (!(build_leaf(first) & build_leaf(second))).into();
        let mut union = reference_rows(&frame, &conjunction);
        let negated = reference_rows(&frame, &negation);
        for row in &negated {
            prop_assert!(!union.contains(row));
        }
        union.extend(negated);
        union.sort_unstable();
        prop_assert_eq!(union, (0..frame.rows()).collect::<Vec<_>>());
    }

    #[test]
    fn integer_float_coercion_is_consistent(int in -1000..1000_i32) {
        let as_int = Value::Int32(int);
        let as_float = Value::Float64(f64::from(int));
        prop_assert!(value_eq(&as_int, &as_float));
        prop_assert_eq!(value_cmp(&as_int, &as_float), Ordering::Equal);
        prop_assert_eq!(
            value_cmp(&as_int, &Value::Float64(f64::from(int) + 1.0)),
            Ordering::Less
        );
    }

    #[test]
    fn deep_copies_stay_independent(frame in arb_frame()) {
        let mut copy = frame.deep_copy();
        copy.append_tuple((99_i32, "oak".to_owned(), 0.5_f64)).expect("append");
        prop_assert_eq!(copy.rows(), frame.rows() + 1);
        prop_assert_eq!(copy.cols(), frame.cols());
        for row in 0..frame.rows() {
            for col in 0..frame.cols() {
                prop_assert_eq!(frame.value_at(row, col), copy.value_at(row, col));
            }
        }
    }
}
