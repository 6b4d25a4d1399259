//! Helpers for building and comparing tables in tests.

use crate::row::Row;
use crate::scalar::compare_nullable;
use crate::table::Table;

/// Build a table from literal values.
///
/// Values are literals converted with `ScalarValue::from`, or `None` for a
/// null. Negative numbers need parentheses.
///
/// ```text
/// generate_table!(
///     key: true,
///     fields: [("a", DataType::Int64), ("b", DataType::Binary)],
///     rows: [(1, [4_i64, "x"]), (2, [None, "y"])]
/// )
/// ```
#[macro_export]
macro_rules! generate_table {
    (@value None) => {
        None
    };
    (@value $v:tt) => {
        Some($crate::scalar::ScalarValue::from($v))
    };
    (
        fields: [$(($name:expr, $datatype:expr)),* $(,)?],
        rows: [$([$($v:tt),* $(,)?]),* $(,)?]
    ) => {
        $crate::table::Table::new(
            $crate::schema::Schema::new([$($crate::schema::Field::new($name, $datatype)),*]),
            vec![$($crate::row::Row::new(vec![$($crate::generate_table!(@value $v)),*])),*],
        )
    };
    (
        key: true,
        fields: [$(($name:expr, $datatype:expr)),* $(,)?],
        rows: [$(($key:expr, [$($v:tt),* $(,)?])),* $(,)?]
    ) => {
        $crate::table::Table::new(
            $crate::schema::Schema::with_key([$($crate::schema::Field::new($name, $datatype)),*]),
            vec![$($crate::row::Row::with_key($key, vec![$($crate::generate_table!(@value $v)),*])),*],
        )
    };
}

fn sorted_rows(rows: &[Row]) -> Vec<Row> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| {
        a.key.cmp(&b.key).then_with(|| {
            a.values
                .iter()
                .zip(&b.values)
                .map(|(x, y)| compare_nullable(x.as_ref(), y.as_ref()))
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
    rows
}

/// Assert two tables hold the same schema and the same multiset of rows.
#[track_caller]
pub fn assert_same_rows_unordered(expected: &Table, got: &Table) {
    assert_eq!(expected.schema, got.schema, "schemas differ");
    assert_eq!(
        sorted_rows(&expected.rows),
        sorted_rows(&got.rows),
        "rows differ"
    );
}

/// Assert two tables are equal, including row order.
#[track_caller]
pub fn assert_tables_eq(expected: &Table, got: &Table) {
    assert_eq!(expected.schema, got.schema, "schemas differ");
    for (idx, (a, b)) in expected.rows.iter().zip(&got.rows).enumerate() {
        assert_eq!(a, b, "row {idx} differs");
    }
    assert_eq!(expected.num_rows(), got.num_rows(), "row counts differ");
}
