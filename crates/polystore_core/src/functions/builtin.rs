use std::cmp::Ordering;
use std::sync::Arc;

use polystore_error::{DbError, Result};

use super::{FunctionParams, FunctionRegistry, MappedRow, MappingFunction, SetMappingFunction};
use crate::datatype::DataType;
use crate::row::Row;
use crate::scalar::ScalarValue;
use crate::schema::{Field, Schema};
use crate::table::Table;

pub const COUNT: &str = "count";
pub const SUM: &str = "sum";
pub const AVG: &str = "avg";
pub const MAX: &str = "max";
pub const MIN: &str = "min";
pub const FIRST: &str = "first";
pub const LAST: &str = "last";

pub(super) fn register_all(registry: &mut FunctionRegistry) {
    for kind in [
        AggregateKind::Count,
        AggregateKind::Sum,
        AggregateKind::Avg,
        AggregateKind::Max,
        AggregateKind::Min,
    ] {
        registry.register_set_mapping(Arc::new(Aggregate { kind }));
    }
    registry.register_mapping(Arc::new(Selection { last: false }));
    registry.register_mapping(Arc::new(Selection { last: true }));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregateKind {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

/// Per column aggregate producing a single keyless row with one column per
/// input column, named `func(path)`.
#[derive(Debug)]
struct Aggregate {
    kind: AggregateKind,
}

impl Aggregate {
    fn output_type(&self, input: DataType) -> Option<DataType> {
        match self.kind {
            AggregateKind::Count => Some(DataType::Int64),
            AggregateKind::Sum if input.is_integer() => Some(DataType::Int64),
            AggregateKind::Sum | AggregateKind::Avg if input.is_numeric() => {
                Some(DataType::Float64)
            }
            AggregateKind::Sum | AggregateKind::Avg => None,
            AggregateKind::Max | AggregateKind::Min => Some(input),
        }
    }

    fn compute(&self, table: &Table, col: usize) -> Result<Option<ScalarValue>> {
        let values = table.rows.iter().filter_map(|row| row.value(col));
        match self.kind {
            AggregateKind::Count => Ok(Some(ScalarValue::Int64(values.count() as i64))),
            AggregateKind::Sum if table.schema.fields[col].datatype.is_integer() => {
                let mut sum: Option<i64> = None;
                for v in values {
                    let v = v.try_as_i64()?;
                    sum = Some(
                        sum.unwrap_or(0)
                            .checked_add(v)
                            .ok_or_else(|| DbError::new("Overflow in sum"))?,
                    );
                }
                Ok(sum.map(ScalarValue::Int64))
            }
            AggregateKind::Sum => {
                let mut sum: Option<f64> = None;
                for v in values.filter_map(|v| v.as_f64()) {
                    sum = Some(sum.unwrap_or(0.0) + v);
                }
                Ok(sum.map(ScalarValue::Float64))
            }
            AggregateKind::Avg => {
                let (sum, count) = values
                    .filter_map(|v| v.as_f64())
                    .fold((0.0, 0_usize), |(s, c), v| (s + v, c + 1));
                Ok((count > 0).then(|| ScalarValue::Float64(sum / count as f64)))
            }
            AggregateKind::Max => Ok(extreme(values, Ordering::Greater)),
            AggregateKind::Min => Ok(extreme(values, Ordering::Less)),
        }
    }
}

fn extreme<'a>(
    values: impl Iterator<Item = &'a ScalarValue>,
    wanted: Ordering,
) -> Option<ScalarValue> {
    let mut best: Option<&ScalarValue> = None;
    for v in values {
        best = match best {
            Some(b) if v.compare(b) != Some(wanted) => Some(b),
            _ => Some(v),
        };
    }
    best.cloned()
}

impl SetMappingFunction for Aggregate {
    fn identifier(&self) -> &str {
        match self.kind {
            AggregateKind::Count => COUNT,
            AggregateKind::Sum => SUM,
            AggregateKind::Avg => AVG,
            AggregateKind::Max => MAX,
            AggregateKind::Min => MIN,
        }
    }

    fn is_distinct_invariant(&self) -> bool {
        matches!(self.kind, AggregateKind::Max | AggregateKind::Min)
    }

    fn transform(&self, table: &Table, params: &FunctionParams) -> Result<Option<MappedRow>> {
        if table.is_empty() {
            return Ok(None);
        }

        let mut fields = Vec::new();
        let mut values = Vec::new();
        for col in params.matched_columns(&table.schema)? {
            let field = &table.schema.fields[col];
            let Some(datatype) = self.output_type(field.datatype) else {
                continue;
            };
            fields.push(Field::with_tags(
                format!("{}({})", self.identifier(), field.name),
                datatype,
                field.tags.clone(),
            ));
            values.push(self.compute(table, col)?);
        }

        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(MappedRow {
            schema: Schema::new(fields),
            row: Row::new(values),
        }))
    }
}

/// Selects the first or last non-null value of every matched column.
///
/// Output rows carry the key of the selected value, the column name in
/// `path` and the value rendered as a string in `value`, ordered by key.
#[derive(Debug)]
struct Selection {
    last: bool,
}

impl MappingFunction for Selection {
    fn identifier(&self) -> &str {
        if self.last { LAST } else { FIRST }
    }

    fn transform(&self, table: &Table, params: &FunctionParams) -> Result<Option<Table>> {
        if !table.schema.has_key {
            return Err(DbError::invalid_parameter(format!(
                "function {} requires rows with a key",
                self.identifier()
            )));
        }

        let mut rows = Vec::new();
        for col in params.matched_columns(&table.schema)? {
            let mut candidates = table.rows.iter().filter(|row| row.value(col).is_some());
            let found = if self.last {
                candidates.next_back()
            } else {
                candidates.next()
            };
            if let Some(row) = found {
                let value = row.value(col).map(|v| ScalarValue::from(v.to_str_lossy()));
                rows.push(Row {
                    key: row.key,
                    values: vec![
                        Some(ScalarValue::from(table.schema.fields[col].full_name())),
                        value,
                    ],
                });
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }
        rows.sort_by_key(|row| row.key);

        let schema = Schema::with_key([
            Field::new("path", DataType::Binary),
            Field::new("value", DataType::Binary),
        ]);
        Ok(Some(Table::new(schema, rows)))
    }
}
