use polystore_error::Result;

use crate::execution::plan::ProjectParams;
use crate::pattern::compile_patterns;
use crate::schema::{Field, KEY, Schema};
use crate::table::Table;

/// Keep the fields matching any of the patterns, in schema order.
pub fn project(params: &ProjectParams, table: Table) -> Result<Table> {
    let patterns = compile_patterns(&params.patterns)?;
    let key_suffix = format!(".{KEY}");

    let indices: Vec<usize> = table
        .schema
        .fields
        .iter()
        .enumerate()
        .filter(|(_, field)| {
            (params.remain_key && field.name.ends_with(&key_suffix))
                || patterns.iter().any(|p| p.matches(&field.name))
        })
        .map(|(idx, _)| idx)
        .collect();

    Ok(project_indices(table, &indices))
}

/// Keep the columns at `indices`, keeping the key.
pub fn project_indices(table: Table, indices: &[usize]) -> Table {
    if indices.len() == table.schema.len() && indices.iter().enumerate().all(|(i, &j)| i == j) {
        return table;
    }
    let schema = table.schema.project(indices);
    let rows = table.rows.iter().map(|row| row.project(indices)).collect();
    Table::new(schema, rows)
}

/// Prefix every field name with `prefix.`.
pub fn add_schema_prefix(prefix: Option<&str>, table: Table) -> Table {
    let Some(prefix) = prefix else {
        return table;
    };
    let fields = table
        .schema
        .fields
        .iter()
        .map(|f| f.renamed(format!("{prefix}.{}", f.name)))
        .collect::<Vec<Field>>();

    Table::new(
        Schema {
            fields,
            has_key: table.schema.has_key,
        },
        table.rows,
    )
}

/// Drop columns that are null in every row.
pub fn remove_null_column(table: Table) -> Table {
    let remaining: Vec<usize> = (0..table.schema.len())
        .filter(|&idx| table.rows.iter().any(|row| row.value(idx).is_some()))
        .collect();

    if remaining.len() == table.schema.len() {
        return table;
    }
    if remaining.is_empty() {
        return if table.is_empty() {
            table
        } else {
            Table::empty_like(&table.schema)
        };
    }
    project_indices(table, &remaining)
}
