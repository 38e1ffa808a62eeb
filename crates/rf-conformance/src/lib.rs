#![forbid(unsafe_code)]

//! Shared fixtures for the conformance suites: the canonical seed frame
//! and an index-free reference evaluator the planner is checked against.

use rf_expr::Predicate;
use rf_frame::{Frame, Table};
use rf_time::Timestamp;
use rf_types::{Schema, char_col, float32_col, int32_col, str_col, timestamp_col};

/// `[Name: Str, Age: Int32, Level: Char, Score: Float32, BirthDate: Timestamp]`
pub fn seed_schema() -> Schema {
    Schema::new(vec![
        str_col("Name"),
        int32_col("Age"),
        char_col("Level"),
        float32_col("Score"),
        timestamp_col("BirthDate"),
    ])
    .expect("seed schema is well-formed")
}

/// The four seed rows, built the long way round: two rows parsed from
/// strings, then a typed-tuple frame (with Score and Level transposed in
/// its schema) appended by column name.
pub fn seed_frame() -> Frame {
    let rows = vec![
        vec!["John", "23", "A", "29.3", "2000/10/22"],
        vec!["Tom", "18", "B", "45.2", "N/A"],
    ];
    let mut frame = Frame::from_rows(&rows, seed_schema()).expect("seed rows parse");

    let extra = Frame::from_tuples(
        vec![
            (
                "Jonathon",
                24,
                23.3_f32,
                b'A',
                Some(Timestamp::date(2010, 10, 22)),
            ),
            (
                "Jeff",
                12,
                43.5_f32,
                b'C',
                Some(Timestamp::date(2008, 10, 22)),
            ),
        ],
        &["Name", "Age", "Score", "Level", "BirthDate"],
    )
    .expect("typed seed rows");
    frame.append(&extra).expect("append by column name");
    frame
}

/// Index-free oracle: lower the predicate and evaluate it row by row.
///
/// The planner must agree with this for every catalogue configuration.
pub fn reference_rows(frame: &Frame, predicate: &Predicate) -> Vec<usize> {
    match predicate {
        Predicate::Leaf(expr) => {
            let cond = expr.to_condition(frame).expect("leaf lowers");
            (0..frame.rows())
                .filter(|&row| cond.eval_at_row(frame, row))
                .collect()
        }
        Predicate::All(and) => {
            let conds = and.to_conditions(frame).expect("conjunction lowers");
            (0..frame.rows())
                .filter(|&row| conds.iter().all(|cond| cond.eval_at_row(frame, row)))
                .collect()
        }
        Predicate::Any(or) => {
            let groups = or.to_condition_groups(frame).expect("disjunction lowers");
            (0..frame.rows())
                .filter(|&row| {
                    groups
                        .iter()
                        .any(|group| group.iter().all(|cond| cond.eval_at_row(frame, row)))
                })
                .collect()
        }
    }
}
