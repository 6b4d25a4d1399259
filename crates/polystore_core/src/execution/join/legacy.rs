//! The plain `Join` operator, joining two inputs by key or by ordinal.

use std::cmp::Ordering;

use polystore_error::{DbError, Result};

use super::by_key::join_by_key;
use crate::execution::context::ExecutionContext;
use crate::execution::plan::LegacyJoinParams;
use crate::execution::setop::path_union::OVERLAPPED_KEYS_WARNING;
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::schema::{Field, KEY, Schema};
use crate::table::Table;

pub const JOIN_BY_ORDINAL: &str = "ordinal";

pub fn legacy_join(
    ctx: &ExecutionContext,
    params: &LegacyJoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let by_key = match params.join_by.as_str() {
        KEY => true,
        JOIN_BY_ORDINAL => false,
        other => {
            return Err(DbError::invalid_parameter(format!(
                "join operator is not support for field {other} except for key and ordinal"
            ))
            .with_field("join_by", other));
        }
    };

    if has_shared_paths(&left.schema, &right.schema)? {
        return if by_key {
            intersect_join_by_key(ctx, left, right)
        } else {
            intersect_join_by_ordinal(left, right)
        };
    }

    if by_key {
        join_by_key(left, right, true, true)
    } else {
        join_by_ordinal(left, right)
    }
}

/// Whether the inputs share a path. Shared paths must have the same type on
/// both sides.
fn has_shared_paths(left: &Schema, right: &Schema) -> Result<bool> {
    let mut shared = false;
    for field in &left.fields {
        let name = field.full_name();
        let Some(other) = right.fields.iter().find(|f| f.full_name() == name) else {
            continue;
        };
        if other.datatype != field.datatype {
            return Err(DbError::type_conflict(format!(
                "path {name} has two different types: {}, {}",
                field.datatype, other.datatype
            )));
        }
        shared = true;
    }
    Ok(shared)
}

/// Pair rows by position. The shorter input is padded with nulls.
fn join_by_ordinal(left: Table, right: Table) -> Result<Table> {
    require_keyless(&left.schema, &right.schema)?;

    let num_left = left.schema.len();
    let num_right = right.schema.len();
    let schema = Schema::new(
        left.schema
            .fields
            .into_iter()
            .chain(right.schema.fields),
    );

    let num_rows = left.rows.len().max(right.rows.len());
    let mut left_rows = left.rows.into_iter();
    let mut right_rows = right.rows.into_iter();

    let rows = (0..num_rows)
        .map(|_| {
            let mut values = left_rows
                .next()
                .map(|r| r.values)
                .unwrap_or_else(|| vec![None; num_left]);
            values.extend(
                right_rows
                    .next()
                    .map(|r| r.values)
                    .unwrap_or_else(|| vec![None; num_right]),
            );
            Row::new(values)
        })
        .collect();

    Ok(Table::new(schema, rows))
}

fn require_keyless(left: &Schema, right: &Schema) -> Result<()> {
    if left.has_key || right.has_key {
        return Err(DbError::invalid_parameter(
            "row streams for join operator by ordinal shouldn't have timestamp.",
        ));
    }
    Ok(())
}

/// Output columns of a join between inputs sharing some paths. Shared
/// fields appear once.
struct MergedFields {
    fields: Vec<Field>,
    left_map: Vec<usize>,
    right_map: Vec<usize>,
}

impl MergedFields {
    fn new(left: &Schema, right: &Schema) -> Self {
        let mut fields: Vec<Field> = Vec::new();
        let mut position = |field: &Field| match fields.iter().position(|f| f == field) {
            Some(idx) => idx,
            None => {
                fields.push(field.clone());
                fields.len() - 1
            }
        };

        let left_map = left.fields.iter().map(&mut position).collect();
        let right_map = right.fields.iter().map(&mut position).collect();

        MergedFields {
            fields,
            left_map,
            right_map,
        }
    }

    /// Write a row's values into `values`. Nulls don't overwrite.
    fn write(values: &mut [Option<ScalarValue>], map: &[usize], row: Row) {
        for (idx, value) in row.values.into_iter().enumerate() {
            if value.is_some() {
                values[map[idx]] = value;
            }
        }
    }

    fn combine(&self, key: Option<i64>, left: Option<Row>, right: Option<Row>) -> Row {
        let mut values = vec![None; self.fields.len()];
        if let Some(left) = left {
            Self::write(&mut values, &self.left_map, left);
        }
        if let Some(right) = right {
            Self::write(&mut values, &self.right_map, right);
        }
        Row { key, values }
    }
}

/// Full outer join on key, merging shared paths into one column. Where both
/// sides have a row for a key, the right side's non-null values win.
fn intersect_join_by_key(ctx: &ExecutionContext, left: Table, right: Table) -> Result<Table> {
    if !left.schema.has_key || !right.schema.has_key {
        return Err(DbError::invalid_parameter(
            "row streams for join operator by time should have timestamp.",
        ));
    }

    let merged = MergedFields::new(&left.schema, &right.schema);

    let mut left_rows = left.rows;
    let mut right_rows = right.rows;
    left_rows.sort_by_key(|row| row.key);
    right_rows.sort_by_key(|row| row.key);

    let mut rows = Vec::with_capacity(left_rows.len().max(right_rows.len()));
    let mut left_iter = left_rows.into_iter().peekable();
    let mut right_iter = right_rows.into_iter().peekable();
    let mut overlapped = false;

    loop {
        let ord = match (left_iter.peek(), right_iter.peek()) {
            (Some(l), Some(r)) => l.key.cmp(&r.key),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };

        let row = match ord {
            Ordering::Equal => {
                overlapped = true;
                let l = left_iter.next();
                let r = right_iter.next();
                let key = l.as_ref().and_then(|r| r.key);
                merged.combine(key, l, r)
            }
            Ordering::Less => {
                let l = left_iter.next();
                let key = l.as_ref().and_then(|r| r.key);
                merged.combine(key, l, None)
            }
            Ordering::Greater => {
                let r = right_iter.next();
                let key = r.as_ref().and_then(|r| r.key);
                merged.combine(key, None, r)
            }
        };
        rows.push(row);
    }

    if overlapped {
        ctx.warn(OVERLAPPED_KEYS_WARNING);
    }

    Ok(Table::new(Schema::with_key(merged.fields), rows))
}

fn intersect_join_by_ordinal(left: Table, right: Table) -> Result<Table> {
    require_keyless(&left.schema, &right.schema)?;

    let merged = MergedFields::new(&left.schema, &right.schema);
    let num_rows = left.rows.len().max(right.rows.len());
    let mut left_rows = left.rows.into_iter();
    let mut right_rows = right.rows.into_iter();

    let rows = (0..num_rows)
        .map(|_| merged.combine(None, left_rows.next(), right_rows.next()))
        .collect();

    Ok(Table::new(Schema::new(merged.fields), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::datatype::DataType;
    use crate::functions::FunctionRegistry;
    use crate::runtime::WorkerPools;

    fn with_ctx(f: impl FnOnce(&ExecutionContext)) {
        let config = ExecutorConfig::default();
        let registry = FunctionRegistry::new();
        let pools = WorkerPools::new(1, 1);
        let ctx = ExecutionContext::new(&config, &registry, &pools);
        f(&ctx)
    }

    fn params(join_by: &str) -> LegacyJoinParams {
        LegacyJoinParams {
            join_by: join_by.to_string(),
        }
    }

    #[test]
    fn unknown_join_by() {
        with_ctx(|ctx| {
            let err = legacy_join(ctx, &params("time"), Table::empty(), Table::empty()).unwrap_err();
            assert_eq!(
                "join operator is not support for field time except for key and ordinal",
                err.message()
            );
        });
    }

    #[test]
    fn shared_path_type_conflict() {
        with_ctx(|ctx| {
            let left = Table::new(Schema::with_key([Field::new("s", DataType::Int64)]), vec![]);
            let right = Table::new(Schema::with_key([Field::new("s", DataType::Binary)]), vec![]);
            let err = legacy_join(ctx, &params("key"), left, right).unwrap_err();
            assert_eq!("path s has two different types: LONG, BINARY", err.message());
        });
    }

    #[test]
    fn intersect_by_key_merges_values() {
        with_ctx(|ctx| {
            let left = Table::new(
                Schema::with_key([
                    Field::new("s", DataType::Int64),
                    Field::new("a", DataType::Int64),
                ]),
                vec![
                    Row::with_key(1, vec![Some(1_i64.into()), Some(10_i64.into())]),
                    Row::with_key(2, vec![Some(2_i64.into()), None]),
                ],
            );
            let right = Table::new(
                Schema::with_key([
                    Field::new("b", DataType::Int64),
                    Field::new("s", DataType::Int64),
                ]),
                vec![
                    Row::with_key(2, vec![Some(20_i64.into()), None]),
                    Row::with_key(3, vec![None, Some(3_i64.into())]),
                ],
            );

            let out = legacy_join(ctx, &params("key"), left, right).unwrap();
            let names: Vec<_> = out.schema.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(vec!["s", "a", "b"], names);

            let expected = vec![
                Row::with_key(1, vec![Some(1_i64.into()), Some(10_i64.into()), None]),
                Row::with_key(2, vec![Some(2_i64.into()), None, Some(20_i64.into())]),
                Row::with_key(3, vec![Some(3_i64.into()), None, None]),
            ];
            assert_eq!(expected, out.rows);
            assert_eq!(
                vec![OVERLAPPED_KEYS_WARNING.to_string()],
                ctx.take_warnings()
            );
        });
    }

    #[test]
    fn by_ordinal_pads_shorter_side() {
        with_ctx(|ctx| {
            let left = Table::new(
                Schema::new([Field::new("a", DataType::Int64)]),
                vec![
                    Row::new(vec![Some(1_i64.into())]),
                    Row::new(vec![Some(2_i64.into())]),
                ],
            );
            let right = Table::new(
                Schema::new([Field::new("b", DataType::Binary)]),
                vec![Row::new(vec![Some("x".into())])],
            );

            let out = legacy_join(ctx, &params("ordinal"), left, right).unwrap();
            assert!(!out.schema.has_key);
            assert_eq!(
                vec![
                    Row::new(vec![Some(1_i64.into()), Some(ScalarValue::from("x"))]),
                    Row::new(vec![Some(2_i64.into()), None]),
                ],
                out.rows
            );
        });
    }

    #[test]
    fn by_ordinal_rejects_keys() {
        with_ctx(|ctx| {
            let left = Table::new(Schema::with_key([Field::new("a", DataType::Int64)]), vec![]);
            let right = Table::new(Schema::new([Field::new("b", DataType::Int64)]), vec![]);
            let err = legacy_join(ctx, &params("ordinal"), left, right).unwrap_err();
            assert_eq!(
                "row streams for join operator by ordinal shouldn't have timestamp.",
                err.message()
            );
        });
    }
}
