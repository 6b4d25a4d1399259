use crate::datatype::DataType;
use crate::execution::plan::SequenceColumn;
use crate::scalar::ScalarValue;
use crate::schema::{Field, Schema};
use crate::row::Row;
use crate::table::Table;

pub const SELECTED_PATH: &str = "SelectedPath";

/// Append Int64 counter columns. Each column starts at its own value and
/// advances by its own increment on every row.
pub fn add_sequence(columns: &[SequenceColumn], mut table: Table) -> Table {
    table.schema.fields.extend(
        columns
            .iter()
            .map(|c| Field::new(c.name.clone(), DataType::Int64)),
    );

    let mut current: Vec<i64> = columns.iter().map(|c| c.start).collect();
    for row in &mut table.rows {
        for (value, column) in current.iter_mut().zip(columns) {
            row.values.push(Some(ScalarValue::Int64(*value)));
            *value = value.wrapping_add(column.increment);
        }
    }

    table
}

/// Turn every non-null, non-empty value into a row of one `SelectedPath`
/// column, optionally prefixed.
pub fn value_to_selected_path(prefix: Option<&str>, table: Table) -> Table {
    let prefix = prefix.filter(|p| !p.is_empty());
    let schema = Schema::new([Field::new(SELECTED_PATH, DataType::Binary)]);

    let rows = table
        .rows
        .iter()
        .flat_map(|row| row.values.iter().flatten())
        .filter_map(|value| {
            let value = value.to_str_lossy();
            if value.is_empty() {
                return None;
            }
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{value}"),
                None => value,
            };
            Some(Row::new(vec![Some(ScalarValue::from(path))]))
        })
        .collect();

    Table::new(schema, rows)
}
