//! Union, except and intersect over two tables with comparable schemas.
//!
//! Both sides are first reordered into a canonical column order, after which
//! rows compare position by position. Row equality treats two nulls as equal
//! and compares numbers by value across numeric types. Keys take part in the
//! comparison when both sides carry them.

pub mod path_union;

use std::fmt;

use polystore_error::{DbError, Result};
use tracing::debug;

use crate::execution::dedup::{DistinctRows, RowHasher, RowLookup};
use crate::execution::plan::{ReorderParams, SetOpParams};
use crate::execution::unary::reorder::reorder;
use crate::schema::Schema;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Except,
    Intersect,
}

impl fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => write!(f, "union"),
            Self::Except => write!(f, "except"),
            Self::Intersect => write!(f, "intersect"),
        }
    }
}

pub fn set_operation(
    kind: SetOpKind,
    params: &SetOpParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let left = reorder_side(&params.left_order, left)?;
    let right = reorder_side(&params.right_order, right)?;
    check_comparable(&left.schema, &right.schema)?;

    let needs_fields = kind != SetOpKind::Union || params.distinct;
    if needs_fields && (left.schema.is_empty() || right.schema.is_empty()) {
        return Err(DbError::invalid_parameter(format!(
            "row stream to be {kind} must have non-empty fields"
        )));
    }

    debug!(%kind, distinct = params.distinct, left = left.num_rows(), right = right.num_rows(), "executing set operation");

    match kind {
        SetOpKind::Union if params.distinct => Ok(union_distinct(left, right)),
        SetOpKind::Union => Ok(union_all(left, right)),
        SetOpKind::Except => Ok(filter_by_membership(left, right, false, params.distinct)),
        SetOpKind::Intersect => Ok(filter_by_membership(left, right, true, params.distinct)),
    }
}

fn reorder_side(order: &[String], table: Table) -> Result<Table> {
    if order.is_empty() {
        return Ok(table);
    }
    let params = ReorderParams {
        patterns: order.to_vec(),
        udf_output: Vec::new(),
    };
    reorder(&params, table)
}

/// Check that rows of the two schemas can be compared position by position.
pub fn check_comparable(left: &Schema, right: &Schema) -> Result<()> {
    if left.has_key != right.has_key {
        return Err(DbError::invalid_parameter(
            "Row stream to be union, except or intersect must have key or have not key at the same time.",
        ));
    }
    if left.len() != right.len() {
        return Err(DbError::invalid_parameter(
            "Row stream to be union, except or intersect must have the same number of fields.",
        ));
    }
    if !left.has_key && left.is_empty() {
        return Err(DbError::invalid_parameter(
            "Row stream with no key to be union, except or intersect must have more than one field.",
        ));
    }

    for (a, b) in left.fields.iter().zip(&right.fields) {
        if !a.datatype.is_comparable_with(&b.datatype) {
            return Err(DbError::invalid_parameter(format!(
                "Field {}({}) and field {}({}) are incomparable.",
                a.name, a.datatype, b.name, b.datatype
            )));
        }
    }

    Ok(())
}

fn union_all(mut left: Table, right: Table) -> Table {
    left.rows.extend(right.rows);
    left
}

fn union_distinct(left: Table, right: Table) -> Table {
    let mut distinct = DistinctRows::new(RowHasher::for_pair(&left.schema, &right.schema));
    for row in left.rows.into_iter().chain(right.rows) {
        distinct.insert(row);
    }
    Table::new(left.schema, distinct.into_rows())
}

/// Keep the left rows whose presence on the right equals `keep_present`.
fn filter_by_membership(left: Table, right: Table, keep_present: bool, distinct: bool) -> Table {
    let hasher = RowHasher::for_pair(&left.schema, &right.schema);
    let lookup = RowLookup::new(hasher.clone(), &right.rows);
    let mut seen = distinct.then(|| DistinctRows::new(hasher));

    let mut rows = Vec::new();
    for row in left.rows {
        if lookup.contains(&row) != keep_present {
            continue;
        }
        match seen.as_mut() {
            Some(seen) => {
                seen.insert(row);
            }
            None => rows.push(row),
        }
    }
    if let Some(seen) = seen {
        rows = seen.into_rows();
    }

    Table::new(left.schema, rows)
}
