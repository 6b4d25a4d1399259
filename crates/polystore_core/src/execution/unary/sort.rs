use std::cmp::Ordering;

use polystore_error::{DbError, Result};

use crate::execution::plan::SortParams;
use crate::row::Row;
use crate::scalar::compare_nullable;
use crate::schema::KEY;
use crate::table::Table;

#[derive(Debug, Clone, Copy)]
enum SortColumn {
    Key,
    Value(usize),
}

/// Stable sort by the given columns. Nulls sort first when ascending.
pub fn sort(params: &SortParams, mut table: Table) -> Result<Table> {
    let columns = params
        .sort_by
        .iter()
        .map(|name| {
            if name == KEY {
                return Ok(SortColumn::Key);
            }
            let idx = table.schema.require_index(name, || {
                DbError::invalid_parameter(format!("SortBy key [{name}] doesn't exist in table."))
            })?;
            Ok(SortColumn::Value(idx))
        })
        .collect::<Result<Vec<_>>>()?;

    let compare = |a: &Row, b: &Row| -> Ordering {
        for column in &columns {
            let ord = match column {
                SortColumn::Key => a.key.cmp(&b.key),
                SortColumn::Value(idx) => compare_nullable(a.value(*idx), b.value(*idx)),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    };

    if params.ascending {
        table.rows.sort_by(compare);
    } else {
        table.rows.sort_by(|a, b| compare(b, a));
    }

    Ok(table)
}
