//! Operators applying registry functions to rows or whole tables.

use std::collections::BTreeMap;

use polystore_error::{DbError, Result};

use crate::execution::context::ExecutionContext;
use crate::execution::dedup::remove_duplicate_rows;
use crate::execution::setop::path_union::path_union_tables;
use crate::functions::{FunctionCall, MappedRow};
use crate::row::Row;
use crate::schema::{Field, Schema};
use crate::table::Table;

/// Apply a set mapping function to all rows of `table`.
///
/// With `DISTINCT`, the function sees only the distinct values of the
/// columns it reads, unless removing duplicates can't change its result.
pub fn apply_set_function(
    ctx: &ExecutionContext,
    call: &FunctionCall,
    table: &Table,
) -> Result<Option<MappedRow>> {
    let function = ctx.registry.set_mapping(&call.identifier)?;
    let identifier = function.identifier();

    if call.params.distinct {
        if !function.can_use_distinct() {
            return Err(DbError::invalid_parameter(format!(
                "function {identifier} can't use DISTINCT"
            ))
            .with_field("function", identifier));
        }
        if !function.is_distinct_invariant() {
            let columns = call.params.matched_columns(&table.schema)?;
            let schema = table.schema.project(&columns);
            let rows = table.rows.iter().map(|row| row.project(&columns)).collect();
            let rows = remove_duplicate_rows(&schema, rows);
            let distinct = Table::new(schema, rows);

            return function
                .transform(&distinct, &call.params)
                .map_err(|e| DbError::function_execution(identifier, e));
        }
    }

    function
        .transform(table, &call.params)
        .map_err(|e| DbError::function_execution(identifier, e))
}

/// Apply each row mapping function to every row, concatenating their
/// outputs. A row is dropped when any function produces nothing for it.
pub fn row_transform(
    ctx: &ExecutionContext,
    functions: &[FunctionCall],
    table: Table,
) -> Result<Table> {
    let resolved = functions
        .iter()
        .map(|call| Ok((ctx.registry.row_mapping(&call.identifier)?, &call.params)))
        .collect::<Result<Vec<_>>>()?;

    let has_key = table.schema.has_key;
    let mut fields: Option<Vec<Field>> = None;
    let mut rows = Vec::with_capacity(table.rows.len());

    'rows: for row in &table.rows {
        let mut row_fields = Vec::new();
        let mut values = Vec::new();
        for (function, params) in &resolved {
            let mapped = function
                .transform(&table.schema, row, params)
                .map_err(|e| DbError::function_execution(function.identifier(), e))?;
            let Some(mapped) = mapped else {
                continue 'rows;
            };
            if fields.is_none() {
                row_fields.extend(mapped.schema.fields);
            }
            values.extend(mapped.row.values);
        }

        if fields.is_none() {
            fields = Some(row_fields);
        }
        rows.push(Row {
            key: if has_key { row.key } else { None },
            values,
        });
    }

    match fields {
        Some(fields) => Ok(Table::new(Schema { fields, has_key }, rows)),
        None => Ok(Table::empty_like(&table.schema)),
    }
}

/// Apply each set mapping function to the whole table, producing one row
/// holding all outputs.
pub fn set_transform(
    ctx: &ExecutionContext,
    functions: &[FunctionCall],
    table: Table,
) -> Result<Table> {
    let mut results = Vec::with_capacity(functions.len());
    for call in functions {
        if let Some(mapped) = apply_set_function(ctx, call, &table)? {
            results.push(mapped);
        }
    }

    if results.is_empty() {
        return Ok(Table::empty());
    }
    Ok(combine_columns(results))
}

/// Apply each mapping function to the whole table and combine the results.
///
/// Outputs of `first` and `last` are keyed series and get merged by key,
/// anything else is zipped by position.
pub fn mapping_transform(
    ctx: &ExecutionContext,
    functions: &[FunctionCall],
    table: Table,
) -> Result<Table> {
    let mut tables = Vec::with_capacity(functions.len());
    for call in functions {
        let function = ctx.registry.mapping(&call.identifier)?;
        let result = function
            .transform(&table, &call.params)
            .map_err(|e| DbError::function_execution(function.identifier(), e))?;
        if let Some(result) = result {
            tables.push(result);
        }
    }

    if tables.is_empty() {
        return Ok(Table::empty());
    }
    if tables.len() == 1 {
        return Ok(tables.remove(0));
    }

    if functions.iter().any(FunctionCall::is_first_or_last) {
        let (table, _) = path_union_tables(tables);
        Ok(table)
    } else {
        join_tables_by_ordinal(tables)
    }
}

/// Combine single row outputs into one keyless row.
fn combine_columns(results: Vec<MappedRow>) -> Table {
    let mut fields = Vec::new();
    let mut values = Vec::new();
    for result in results {
        fields.extend(result.schema.fields);
        values.extend(result.row.values);
    }
    Table::new(Schema::new(fields), vec![Row::new(values)])
}

/// Zip keyless tables by row position. Shorter tables are padded with nulls.
pub fn join_tables_by_ordinal(tables: Vec<Table>) -> Result<Table> {
    if tables.iter().any(|t| t.schema.has_key) {
        return Err(DbError::invalid_parameter(
            "row streams for join operator by ordinal shouldn't have timestamp.",
        ));
    }

    let num_rows = tables.iter().map(|t| t.rows.len()).max().unwrap_or(0);
    let widths: Vec<usize> = tables.iter().map(|t| t.schema.len()).collect();
    let fields: Vec<Field> = tables
        .iter()
        .flat_map(|t| t.schema.fields.iter().cloned())
        .collect();

    let mut iters: Vec<_> = tables.into_iter().map(|t| t.rows.into_iter()).collect();
    let rows = (0..num_rows)
        .map(|_| {
            let mut values = Vec::with_capacity(fields.len());
            for (iter, width) in iters.iter_mut().zip(&widths) {
                match iter.next() {
                    Some(row) => values.extend(row.values),
                    None => values.extend(std::iter::repeat_n(None, *width)),
                }
            }
            Row::new(values)
        })
        .collect();

    Ok(Table::new(Schema::new(fields), rows))
}

/// Full outer merge of keyed tables on their keys. Fields are concatenated
/// and rows come out in ascending key order.
pub fn join_tables_by_key(tables: Vec<Table>) -> Result<Table> {
    if tables.iter().any(|t| !t.schema.has_key) {
        return Err(DbError::invalid_parameter(
            "row streams for join operator by key should have key.",
        ));
    }

    let fields: Vec<Field> = tables
        .iter()
        .flat_map(|t| t.schema.fields.iter().cloned())
        .collect();
    let num_fields = fields.len();

    let mut merged: BTreeMap<i64, Vec<_>> = BTreeMap::new();
    let mut offset = 0;
    for table in tables {
        let width = table.schema.len();
        for row in table.rows {
            let Some(key) = row.key else {
                continue;
            };
            let values = merged.entry(key).or_insert_with(|| vec![None; num_fields]);
            for (idx, value) in row.values.into_iter().enumerate() {
                values[offset + idx] = value;
            }
        }
        offset += width;
    }

    let rows = merged
        .into_iter()
        .map(|(key, values)| Row::with_key(key, values))
        .collect();

    Ok(Table::new(Schema::with_key(fields), rows))
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::sync::Arc;

    use polystore_error::ErrorKind;

    use super::*;
    use crate::config::ExecutorConfig;
    use crate::datatype::DataType;
    use crate::functions::builtin::{COUNT, MAX, SUM};
    use crate::functions::{
        FunctionParams, FunctionRegistry, MappingFunction, RowMappingFunction, SetMappingFunction,
    };
    use crate::generate_table;
    use crate::runtime::WorkerPools;
    use crate::scalar::ScalarValue;

    /// Doubles integer column `a`, producing nothing for nulls.
    #[derive(Debug)]
    struct Double;

    impl RowMappingFunction for Double {
        fn identifier(&self) -> &str {
            "double"
        }

        fn transform(
            &self,
            schema: &Schema,
            row: &Row,
            _params: &FunctionParams,
        ) -> Result<Option<MappedRow>> {
            let idx = schema.require_index("a", || DbError::new("double needs column a"))?;
            let Some(v) = row.value(idx) else {
                return Ok(None);
            };
            Ok(Some(MappedRow {
                schema: Schema::new([Field::new("double(a)", DataType::Int64)]),
                row: Row::new(vec![Some(ScalarValue::Int64(v.try_as_i64()? * 2))]),
            }))
        }
    }

    /// Fails on every call and refuses DISTINCT.
    #[derive(Debug)]
    struct Failing;

    impl RowMappingFunction for Failing {
        fn identifier(&self) -> &str {
            "failing"
        }

        fn transform(
            &self,
            _schema: &Schema,
            _row: &Row,
            _params: &FunctionParams,
        ) -> Result<Option<MappedRow>> {
            Err(DbError::new("row failure"))
        }
    }

    impl SetMappingFunction for Failing {
        fn identifier(&self) -> &str {
            "failing"
        }

        fn can_use_distinct(&self) -> bool {
            false
        }

        fn transform(&self, _table: &Table, _params: &FunctionParams) -> Result<Option<MappedRow>> {
            Err(DbError::new("set failure"))
        }
    }

    impl MappingFunction for Failing {
        fn identifier(&self) -> &str {
            "failing"
        }

        fn transform(&self, _table: &Table, _params: &FunctionParams) -> Result<Option<Table>> {
            Err(DbError::new("mapping failure"))
        }
    }

    fn with_ctx(f: impl FnOnce(&ExecutionContext)) {
        let config = ExecutorConfig::default();
        let mut registry = FunctionRegistry::with_builtins();
        registry.register_row_mapping(Arc::new(Double));
        registry.register_row_mapping(Arc::new(Failing));
        registry.register_set_mapping(Arc::new(Failing));
        registry.register_mapping(Arc::new(Failing));
        let pools = WorkerPools::new(1, 1);
        let ctx = ExecutionContext::new(&config, &registry, &pools);
        f(&ctx)
    }

    fn call(identifier: &str, path: &str, distinct: bool) -> FunctionCall {
        FunctionCall::new(identifier, FunctionParams::new([path]).with_distinct(distinct))
    }

    #[test]
    fn row_transform_drops_empty_outputs() {
        with_ctx(|ctx| {
            let table = generate_table!(
                key: true,
                fields: [("a", DataType::Int64)],
                rows: [(1, [2_i64]), (2, [None]), (3, [5_i64])]
            );
            let out = row_transform(ctx, &[call("double", "a", false)], table).unwrap();
            assert!(out.schema.has_key);
            let keys: Vec<_> = out.rows.iter().map(|r| r.key).collect();
            assert_eq!(vec![Some(1), Some(3)], keys);
            assert_eq!(Some(ScalarValue::Int64(10)), out.rows[1].values[0]);
        });
    }

    #[test]
    fn set_transform_distinct() {
        with_ctx(|ctx| {
            let table = generate_table!(
                fields: [("a", DataType::Int64)],
                rows: [[1_i64], [1_i64], [2_i64]]
            );
            let out = set_transform(
                ctx,
                &[
                    call(SUM, "a", false),
                    call(SUM, "a", true),
                    call(COUNT, "a", true),
                    call(MAX, "a", true),
                ],
                table,
            )
            .unwrap();

            assert!(!out.schema.has_key);
            assert_eq!(
                vec![
                    Some(ScalarValue::Int64(4)),
                    Some(ScalarValue::Int64(3)),
                    Some(ScalarValue::Int64(2)),
                    Some(ScalarValue::Int64(2)),
                ],
                out.rows[0].values
            );
        });
    }

    #[test]
    fn missing_function() {
        with_ctx(|ctx| {
            let err = set_transform(ctx, &[call("nope", "a", false)], Table::empty()).unwrap_err();
            assert_eq!(Some("nope"), err.field("function"));
        });
    }

    #[test]
    fn distinct_rejected_for_function_without_distinct() {
        with_ctx(|ctx| {
            let table = generate_table!(fields: [("a", DataType::Int64)], rows: [[1_i64]]);
            let err = set_transform(ctx, &[call("failing", "a", true)], table).unwrap_err();
            assert_eq!(ErrorKind::InvalidParameter, err.kind());
            assert_eq!("function failing can't use DISTINCT", err.message());
            assert_eq!(Some("failing"), err.field("function"));
        });
    }

    fn assert_wraps_cause(err: DbError, cause: &str) {
        assert_eq!(ErrorKind::FunctionExecution, err.kind());
        assert_eq!(Some("failing"), err.field("function"));
        let source = err.source().expect("cause to be kept");
        assert_eq!(cause, source.to_string().lines().next().unwrap());
    }

    #[test]
    fn function_failures_are_wrapped() {
        with_ctx(|ctx| {
            let table = generate_table!(fields: [("a", DataType::Int64)], rows: [[1_i64], [2_i64]]);

            let err = set_transform(ctx, &[call("failing", "a", false)], table.clone()).unwrap_err();
            assert_wraps_cause(err, "set failure");

            let err = row_transform(ctx, &[call("failing", "a", false)], table.clone()).unwrap_err();
            assert_wraps_cause(err, "row failure");

            let err = mapping_transform(ctx, &[call("failing", "a", false)], table).unwrap_err();
            assert_wraps_cause(err, "mapping failure");
        });
    }

    #[test]
    fn join_by_key_fills_gaps() {
        let a = generate_table!(key: true, fields: [("x", DataType::Int64)], rows: [(1, [1_i64]), (3, [3_i64])]);
        let b = generate_table!(key: true, fields: [("y", DataType::Int64)], rows: [(2, [20_i64]), (3, [30_i64])]);
        let out = join_tables_by_key(vec![a, b]).unwrap();
        let expected = generate_table!(
            key: true,
            fields: [("x", DataType::Int64), ("y", DataType::Int64)],
            rows: [(1, [1_i64, None]), (2, [None, 20_i64]), (3, [3_i64, 30_i64])]
        );
        assert_eq!(expected, out);
    }

    #[test]
    fn join_by_ordinal_pads() {
        let a = generate_table!(fields: [("x", DataType::Int64)], rows: [[1_i64], [2_i64]]);
        let b = generate_table!(fields: [("y", DataType::Int64)], rows: [[10_i64]]);
        let out = join_tables_by_ordinal(vec![a, b]).unwrap();
        let expected = generate_table!(
            fields: [("x", DataType::Int64), ("y", DataType::Int64)],
            rows: [[1_i64, 10_i64], [2_i64, None]]
        );
        assert_eq!(expected, out);
    }
}
