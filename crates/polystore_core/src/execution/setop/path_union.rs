use polystore_error::{DbError, Result};

use crate::execution::context::ExecutionContext;
use crate::row::Row;
use crate::schema::{Field, Schema};
use crate::table::Table;

pub const OVERLAPPED_KEYS_WARNING: &str = "The query results contain overlapped keys.";

/// Merge two tables into the union of their fields, ordered by key.
///
/// Rows from both sides at the same key are all kept, and the caller gets an
/// advisory about it.
pub fn path_union(ctx: &ExecutionContext, left: Table, right: Table) -> Result<Table> {
    if left.schema.has_key != right.schema.has_key {
        return Err(DbError::invalid_parameter(
            "row stream to be union must have same fields",
        ));
    }

    let (table, overlapped) = path_union_tables(vec![left, right]);
    if overlapped {
        ctx.warn(OVERLAPPED_KEYS_WARNING);
    }
    Ok(table)
}

/// Union any number of tables by field.
///
/// Output fields are the distinct fields of all inputs in order of first
/// appearance. Each row is widened to the output fields with nulls. When all
/// inputs carry keys the rows are merged into ascending key order, keeping
/// input order among equal keys. Otherwise rows are concatenated.
///
/// Also returns whether two different inputs contributed rows with the same
/// key.
pub fn path_union_tables(tables: Vec<Table>) -> (Table, bool) {
    let has_key = !tables.is_empty() && tables.iter().all(|t| t.schema.has_key);

    let mut fields: Vec<Field> = Vec::new();
    let mappings: Vec<Vec<usize>> = tables
        .iter()
        .map(|table| {
            table
                .schema
                .fields
                .iter()
                .map(|field| match fields.iter().position(|f| f == field) {
                    Some(idx) => idx,
                    None => {
                        fields.push(field.clone());
                        fields.len() - 1
                    }
                })
                .collect()
        })
        .collect();

    let num_fields = fields.len();
    let mut rows: Vec<(usize, Row)> = Vec::new();
    for (source, (table, mapping)) in tables.into_iter().zip(&mappings).enumerate() {
        for row in table.rows {
            let mut values = vec![None; num_fields];
            for (value, &idx) in row.values.into_iter().zip(mapping) {
                values[idx] = value;
            }
            let key = if has_key { row.key } else { None };
            rows.push((source, Row { key, values }));
        }
    }

    let mut overlapped = false;
    if has_key {
        rows.sort_by_key(|(_, row)| row.key);
        overlapped = rows
            .windows(2)
            .any(|pair| pair[0].1.key == pair[1].1.key && pair[0].0 != pair[1].0);
    }

    let schema = Schema {
        fields,
        has_key,
    };
    let rows = rows.into_iter().map(|(_, row)| row).collect();

    (Table::new(schema, rows), overlapped)
}
