use polystore_error::Result;

use super::project::project_indices;
use crate::execution::plan::ReorderParams;
use crate::pattern::PathPattern;
use crate::schema::RESERVED_COLUMNS;
use crate::table::Table;

/// Reorder fields to reserved columns first, then the fields matching each
/// pattern in turn. Fields matched by no pattern are dropped.
///
/// Matched fields are sorted by full name, except for patterns flagged as
/// function output which keep schema order.
pub fn reorder(params: &ReorderParams, table: Table) -> Result<Table> {
    let schema = &table.schema;
    let mut indices: Vec<usize> = (0..schema.len())
        .filter(|&idx| RESERVED_COLUMNS.contains(&schema.fields[idx].name.as_str()))
        .collect();

    for (pattern_idx, pattern) in params.patterns.iter().enumerate() {
        let pattern = PathPattern::new(pattern)?;
        let mut matched = schema.indices_matching(&pattern);

        let keep_order = params.udf_output.get(pattern_idx).copied().unwrap_or(false);
        if !keep_order {
            matched.sort_by_cached_key(|&idx| schema.fields[idx].full_name());
        }
        indices.extend(matched);
    }

    if indices.is_empty() {
        return Ok(Table::empty_like(&table.schema));
    }

    Ok(project_indices(table, &indices))
}
