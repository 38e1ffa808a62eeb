//! The end-to-end scenario suite over the canonical seed frame: direct
//! index lookups first, then planner-driven selections through the facade.

use rf_conformance::{seed_frame, seed_schema};
use rf_expr::{col, cols};
use rf_frame::{PrintOptions, Table};
use rf_index::{HashIndex, HashMultiIndex, IndexError, IndexKind, OrderedIndex};
use rf_io::{read_csv_frame, write_csv_string};
use rf_query::IndexedFrame;
use rf_types::Value;

#[test]
fn unique_hash_on_name_finds_tom() {
    let frame = seed_frame();
    let index = HashIndex::by_names(&frame, &["Name"]).expect("unique names");
    assert_eq!(index.at1(&frame, &Value::from("Tom")), Some(1));
}

#[test]
fn unique_hash_on_level_fails_on_the_duplicate() {
    let frame = seed_frame();
    let err = HashIndex::by_names(&frame, &["Level"]).expect_err("'A' repeats");
    assert!(matches!(err, IndexError::DuplicateKey { .. }));
}

#[test]
fn ordered_name_index_puts_jeff_first() {
    let frame = seed_frame();
    let index = OrderedIndex::by_names(&frame, &["Name"], false).expect("ordered");
    assert_eq!(index.find_first(&frame, &[Value::from("Jeff")]), Some(0));
}

#[test]
fn level_score_ordering_starts_with_jonathon() {
    let frame = seed_frame();
    let index = OrderedIndex::by_names(&frame, &["Level", "Score"], false).expect("ordered");
    assert_eq!(index.at(0), Some(2)); // ('A', 23.3)
}

#[test]
fn null_birth_date_sorts_first_ascending() {
    let frame = seed_frame();
    let index = OrderedIndex::by_names(&frame, &["BirthDate"], false).expect("ordered");
    assert_eq!(index.at(0), Some(1)); // Tom's Null
}

#[test]
fn multi_column_hash_finds_the_level_age_pair() {
    let frame = seed_frame();
    let index = HashIndex::by_names(&frame, &["Level", "Age"]).expect("unique pairs");
    assert_eq!(
        index.at(&frame, &[Value::Char(b'A'), Value::Int32(24)]),
        Some(2)
    );
}

#[test]
fn multi_hash_on_level_collects_both_a_rows() {
    let frame = seed_frame();
    let index = HashMultiIndex::by_names(&frame, &["Level"]).expect("multi");
    assert_eq!(index.get1(&frame, &Value::Char(b'A')), Some(&[0, 2][..]));
}

#[test]
fn conjunction_narrows_by_index_then_refines() {
    let mut facade = IndexedFrame::new(seed_frame());
    facade
        .add_index(IndexKind::Ordered, &["Level"], None)
        .expect("ordered level");
    // Level >= 'B' runs on the ordered index (Tom and Jeff); Age > 12
    // has no index and filters the candidates row-by-row.
    let view = facade
        .select(col("Level").ge(b'B') & col("Age").gt(12))
        .expect("select");
    assert_eq!(view.row_map(), &[1]);
    assert_eq!(
        view.cell_by_name(0, "Name").expect("cell"),
        &Value::from("Tom")
    );
}

#[test]
fn membership_select_uses_the_name_hash() {
    let mut facade = IndexedFrame::new(seed_frame());
    facade
        .add_index(IndexKind::Hash, &["Name"], None)
        .expect("name hash");
    let view = facade
        .select(col("Name").isin(vec!["John", "Jeff"]))
        .expect("select");
    assert_eq!(view.row_map(), &[0, 3]);
}

#[test]
fn selection_view_sorts_by_age() {
    let facade = IndexedFrame::new(seed_frame());
    let mut view = facade.select(col("Name").ne("Tom")).expect("select");
    assert_eq!(view.row_map(), &[0, 2, 3]);
    view.sort_by(&["Age"], false).expect("sort");
    assert_eq!(view.row_map(), &[3, 0, 2]); // Jeff 12, John 23, Jonathon 24
}

#[test]
fn multi_column_tuple_equality_selects_one_row() {
    let facade = IndexedFrame::new(seed_frame());
    let view = facade
        .select(cols(["Level", "Age"]).eq((b'A', 24)))
        .expect("select");
    assert_eq!(view.row_map(), &[2]);
}

#[test]
fn csv_feeds_the_same_pipeline() {
    let csv = "Name,Age,Level,Score,BirthDate\n\
               John,23,A,29.3,2000/10/22\n\
               Tom,18,B,45.2,N/A\n\
               Jonathon,24,A,23.3,2010/10/22\n\
               Jeff,12,C,43.5,2008/10/22\n";
    let frame = read_csv_frame(csv, seed_schema()).expect("csv frame");
    let mut facade = IndexedFrame::new(frame);
    facade
        .add_index(IndexKind::HashMulti, &["Level"], Some("levels"))
        .expect("level index");
    let view = facade
        .select_cols(col("Level").eq(b'A'), &["Name", "Score"])
        .expect("select");
    assert_eq!(view.row_map(), &[0, 2]);

    let out = write_csv_string(&view).expect("write");
    assert_eq!(out, "Name,Score\nJohn,29.3\nJonathon,23.3\n");
}

#[test]
fn printed_table_round_trips_the_null_sentinel() {
    let frame = seed_frame();
    let text = frame.to_table_string(&PrintOptions::default());
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Name|Age|Level|Score|BirthDate")
    );
    assert_eq!(
        lines.next(),
        Some("\"John\"|23|'A'|29.3|2000-10-22")
    );
    assert_eq!(lines.next(), Some("\"Tom\"|18|'B'|45.2|N/A"));
}
