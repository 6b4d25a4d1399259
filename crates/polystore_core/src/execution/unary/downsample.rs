//! Time windowed aggregation over keyed rows.
//!
//! Windows are `precision` keys wide and start every `slide_distance` keys,
//! counting from a bias: the start of the requested range, or the smallest
//! key present. Equal precision and slide gives tumbling windows where each
//! row falls into exactly one bucket. A smaller slide gives overlapping
//! windows and a row may land in several.

use std::collections::BTreeMap;

use polystore_error::{DbError, Result};
use tracing::trace;

use super::transform::{apply_set_function, join_tables_by_key};
use crate::datatype::DataType;
use crate::execution::context::ExecutionContext;
use crate::execution::plan::DownsampleParams;
use crate::row::Row;
use crate::schema::{Field, Schema, WINDOW_END, WINDOW_START};
use crate::table::Table;

pub fn downsample(
    ctx: &ExecutionContext,
    params: &DownsampleParams,
    table: Table,
) -> Result<Table> {
    if !table.schema.has_key {
        return Err(DbError::invalid_parameter(
            "downsample operator is not support for row stream without key.",
        ));
    }
    if params.precision <= 0 {
        return Err(DbError::invalid_parameter(format!(
            "downsample precision must be positive, got {}",
            params.precision
        )));
    }
    if params.slide_distance <= 0 {
        return Err(DbError::invalid_parameter(format!(
            "downsample slide distance must be positive, got {}",
            params.slide_distance
        )));
    }

    let keys = table.rows.iter().filter_map(|row| row.key);
    let (bias, end) = match params.time_range {
        Some(range) => (range.start, range.end.saturating_sub(1)),
        None => {
            let (Some(min), Some(max)) = (keys.clone().min(), keys.max()) else {
                return Ok(Table::empty_with_key());
            };
            (min, max)
        }
    };

    let windows = assign_windows(params, bias, end, &table.rows);
    trace!(windows = windows.len(), bias, end, "assigned rows to windows");

    let input_schema = Schema::new(table.schema.fields.clone());
    let mut outputs: Vec<Vec<Row>> = vec![Vec::new(); params.functions.len()];
    let mut output_fields: Vec<Option<Vec<Field>>> = vec![None; params.functions.len()];

    for (start, indices) in windows {
        let rows = indices.iter().map(|&idx| table.rows[idx].clone()).collect();
        let window = Table::new(input_schema.clone(), rows);

        for (func_idx, call) in params.functions.iter().enumerate() {
            let Some(mapped) = apply_set_function(ctx, call, &window)? else {
                continue;
            };

            let mut values = Vec::with_capacity(mapped.row.values.len() + 2);
            if func_idx == 0 {
                values.push(Some(start.into()));
                values.push(Some(start.saturating_add(params.precision - 1).into()));
            }
            values.extend(mapped.row.values);
            outputs[func_idx].push(Row::with_key(start, values));

            if output_fields[func_idx].is_none() {
                let mut fields = Vec::new();
                if func_idx == 0 {
                    fields.push(Field::new(WINDOW_START, DataType::Int64));
                    fields.push(Field::new(WINDOW_END, DataType::Int64));
                }
                fields.extend(mapped.schema.fields);
                output_fields[func_idx] = Some(fields);
            }
        }
    }

    let mut tables = Vec::with_capacity(params.functions.len());
    for (fields, rows) in output_fields.into_iter().zip(outputs) {
        // A function that never produced a row empties the whole result.
        let Some(fields) = fields else {
            return Ok(Table::empty_with_key());
        };
        tables.push(Table::new(Schema::with_key(fields), rows));
    }

    if tables.len() == 1 {
        return Ok(tables.remove(0));
    }
    join_tables_by_key(tables)
}

/// Map each window start to the indices of the rows inside the window, in
/// ascending start order.
fn assign_windows(
    params: &DownsampleParams,
    bias: i64,
    end: i64,
    rows: &[Row],
) -> BTreeMap<i64, Vec<usize>> {
    let precision = params.precision as i128;
    let slide = params.slide_distance as i128;
    let bias_wide = bias as i128;

    let mut windows: BTreeMap<i64, Vec<usize>> = BTreeMap::new();

    if params.precision == params.slide_distance {
        for (idx, row) in rows.iter().enumerate() {
            let Some(key) = row.key else {
                continue;
            };
            if key < bias || key > end {
                continue;
            }
            let key = key as i128;
            let start = key - (key - bias_wide).rem_euclid(precision);
            windows.entry(start as i64).or_default().push(idx);
        }
        return windows;
    }

    let span = (end as i128 - bias_wide - precision + 1).max(0);
    let num_windows = div_ceil(span, slide) + 1;

    for (idx, row) in rows.iter().enumerate() {
        let Some(key) = row.key else {
            continue;
        };
        if key < bias || key > end {
            continue;
        }
        let offset = key as i128 - bias_wide;
        // Window i covers [bias + i*slide, bias + i*slide + precision - 1].
        let first = div_ceil(offset - precision + 1, slide).max(0);
        let last = offset.div_euclid(slide).min(num_windows - 1);
        for i in first..=last {
            let start = bias_wide + i * slide;
            windows.entry(start as i64).or_default().push(idx);
        }
    }

    windows
}

fn div_ceil(a: i128, b: i128) -> i128 {
    -((-a).div_euclid(b))
}
