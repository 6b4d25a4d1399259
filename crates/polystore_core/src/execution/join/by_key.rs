use std::cmp::Ordering;

use polystore_error::{DbError, Result};

use crate::row::Row;
use crate::schema::Schema;
use crate::table::Table;

/// Join two keyed inputs on their row keys.
///
/// Output rows keep the key and hold the left fields followed by the right
/// fields. `keep_left` and `keep_right` control whether rows without a
/// matching key on the other side are kept, padded with nulls.
pub fn join_by_key(left: Table, right: Table, keep_left: bool, keep_right: bool) -> Result<Table> {
    if !left.schema.has_key || !right.schema.has_key {
        return Err(DbError::invalid_parameter(
            "row streams for join operator by key should have key.",
        ));
    }

    let num_left = left.schema.len();
    let num_right = right.schema.len();
    let schema = Schema::with_key(
        left.schema
            .fields
            .iter()
            .chain(right.schema.fields.iter())
            .cloned(),
    );

    let mut left_rows = left.rows;
    let mut right_rows = right.rows;
    left_rows.sort_by_key(|row| row.key);
    right_rows.sort_by_key(|row| row.key);

    let concat = |key: Option<i64>, l: Option<Row>, r: Option<Row>| -> Row {
        let mut values = l.map(|r| r.values).unwrap_or_else(|| vec![None; num_left]);
        values.extend(r.map(|r| r.values).unwrap_or_else(|| vec![None; num_right]));
        Row { key, values }
    };

    let mut rows = Vec::new();
    let mut left_iter = left_rows.into_iter().peekable();
    let mut right_iter = right_rows.into_iter().peekable();

    loop {
        let ord = match (left_iter.peek(), right_iter.peek()) {
            (Some(l), Some(r)) => l.key.cmp(&r.key),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        match ord {
            Ordering::Equal => {
                if let (Some(l), Some(r)) = (left_iter.next(), right_iter.next()) {
                    rows.push(concat(l.key, Some(l), Some(r)));
                }
            }
            Ordering::Less => {
                if let Some(l) = left_iter.next() {
                    if keep_left {
                        rows.push(concat(l.key, Some(l), None));
                    }
                }
            }
            Ordering::Greater => {
                if let Some(r) = right_iter.next() {
                    if keep_right {
                        rows.push(concat(r.key, None, Some(r)));
                    }
                }
            }
        }
    }

    Ok(Table::new(schema, rows))
}
