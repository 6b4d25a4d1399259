use std::borrow::Cow;

use crate::datatype::DataType;
use crate::row::{Row, RowAccess};
use crate::scalar::ScalarValue;
use crate::schema::{Field, KEY, Schema};

/// Where an output column of a join reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    LeftKey,
    RightKey,
    Left(usize),
    Right(usize),
    /// A join column present once in the output. Read from the preferred
    /// side, falling back to the other side when the preferred row is
    /// missing.
    Shared {
        left: usize,
        right: usize,
        prefer_left: bool,
    },
    Mark,
}

/// Output shape of a join, and how to fill it from a pair of input rows.
#[derive(Debug, Clone)]
pub struct JoinLayout {
    pub schema: Schema,
    columns: Vec<ColumnSource>,
}

impl JoinLayout {
    /// Layout for inner, outer and cross joins.
    ///
    /// Row keys become regular `prefix.key` columns when the side has a key
    /// and a prefix. When `cut_right` is set the right side's copies of the
    /// join columns and extra join paths are dropped, otherwise the left
    /// side's copies are.
    pub fn joined(
        left: &Schema,
        right: &Schema,
        prefix_a: Option<&str>,
        prefix_b: Option<&str>,
        cut_right: bool,
        join_columns: &[String],
        extra_paths: &[String],
    ) -> Self {
        let join_paths_a: Vec<_> = join_columns
            .iter()
            .map(|c| prefixed(prefix_a, c))
            .collect();
        let join_paths_b: Vec<_> = join_columns
            .iter()
            .map(|c| prefixed(prefix_b, c))
            .collect();

        // Name of the matching column on the other side, if this one takes
        // part in the join condition.
        let counterpart = |name: &str, own: &[String], other: &[String]| -> Option<String> {
            if extra_paths.iter().any(|p| p == name) {
                return Some(name.to_string());
            }
            own.iter()
                .position(|p| p == name)
                .map(|idx| other[idx].clone())
        };

        let mut fields = Vec::new();
        let mut columns = Vec::new();

        if let (true, Some(prefix)) = (left.has_key, prefix_a) {
            fields.push(Field::new(format!("{prefix}.{KEY}"), DataType::Int64));
            columns.push(ColumnSource::LeftKey);
        }
        for (idx, field) in left.fields.iter().enumerate() {
            match counterpart(&field.name, &join_paths_a, &join_paths_b) {
                Some(other) if cut_right => {
                    let source = match right.index_of(&other) {
                        Some(right_idx) => ColumnSource::Shared {
                            left: idx,
                            right: right_idx,
                            prefer_left: true,
                        },
                        None => ColumnSource::Left(idx),
                    };
                    fields.push(field.clone());
                    columns.push(source);
                }
                Some(_) => (),
                None => {
                    fields.push(field.clone());
                    columns.push(ColumnSource::Left(idx));
                }
            }
        }

        if let (true, Some(prefix)) = (right.has_key, prefix_b) {
            fields.push(Field::new(format!("{prefix}.{KEY}"), DataType::Int64));
            columns.push(ColumnSource::RightKey);
        }
        for (idx, field) in right.fields.iter().enumerate() {
            match counterpart(&field.name, &join_paths_b, &join_paths_a) {
                Some(_) if cut_right => (),
                Some(other) => {
                    let source = match left.index_of(&other) {
                        Some(left_idx) => ColumnSource::Shared {
                            left: left_idx,
                            right: idx,
                            prefer_left: false,
                        },
                        None => ColumnSource::Right(idx),
                    };
                    fields.push(field.clone());
                    columns.push(source);
                }
                None => {
                    fields.push(field.clone());
                    columns.push(ColumnSource::Right(idx));
                }
            }
        }

        JoinLayout {
            schema: Schema::new(fields),
            columns,
        }
    }

    /// All left fields followed by the right fields not named in `skip`.
    /// Keeps the left key.
    pub fn concat(left: &Schema, right: &Schema, skip: &[String]) -> Self {
        let mut fields = left.fields.clone();
        let mut columns: Vec<_> = (0..left.len()).map(ColumnSource::Left).collect();
        for (idx, field) in right.fields.iter().enumerate() {
            if skip.iter().any(|s| s == &field.name) {
                continue;
            }
            fields.push(field.clone());
            columns.push(ColumnSource::Right(idx));
        }

        JoinLayout {
            schema: Schema {
                fields,
                has_key: left.has_key,
            },
            columns,
        }
    }

    /// Left fields followed by a boolean mark column. Keeps the left key.
    pub fn marked(left: &Schema, mark_column: &str) -> Self {
        let mut fields = left.fields.clone();
        fields.push(Field::new(mark_column, DataType::Boolean));
        let mut columns: Vec<_> = (0..left.len()).map(ColumnSource::Left).collect();
        columns.push(ColumnSource::Mark);

        JoinLayout {
            schema: Schema {
                fields,
                has_key: left.has_key,
            },
            columns,
        }
    }

    /// Build an output row. A missing side produces nulls.
    pub fn build_row(&self, left: Option<&Row>, right: Option<&Row>, mark: Option<bool>) -> Row {
        let view = JoinedRow {
            layout: self,
            left,
            right,
            mark,
        };
        let values = (0..self.columns.len())
            .map(|idx| view.value(idx).map(Cow::into_owned))
            .collect();

        Row {
            key: view.key(),
            values,
        }
    }

    /// View over a candidate pair, used to evaluate filters without building
    /// the joined row.
    pub fn view<'a>(&'a self, left: &'a Row, right: &'a Row) -> JoinedRow<'a> {
        JoinedRow {
            layout: self,
            left: Some(left),
            right: Some(right),
            mark: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JoinedRow<'a> {
    layout: &'a JoinLayout,
    left: Option<&'a Row>,
    right: Option<&'a Row>,
    mark: Option<bool>,
}

impl RowAccess for JoinedRow<'_> {
    fn key(&self) -> Option<i64> {
        if self.layout.schema.has_key {
            self.left.and_then(|row| row.key)
        } else {
            None
        }
    }

    fn value(&self, idx: usize) -> Option<Cow<'_, ScalarValue>> {
        let left_value = |col: usize| self.left.and_then(|row| row.value(col));
        let right_value = |col: usize| self.right.and_then(|row| row.value(col));

        match *self.layout.columns.get(idx)? {
            ColumnSource::LeftKey => self
                .left
                .and_then(|row| row.key)
                .map(|k| Cow::Owned(ScalarValue::Int64(k))),
            ColumnSource::RightKey => self
                .right
                .and_then(|row| row.key)
                .map(|k| Cow::Owned(ScalarValue::Int64(k))),
            ColumnSource::Left(col) => left_value(col).map(Cow::Borrowed),
            ColumnSource::Right(col) => right_value(col).map(Cow::Borrowed),
            ColumnSource::Shared {
                left,
                right,
                prefer_left,
            } => {
                let (preferred, fallback) = if prefer_left {
                    (self.left.map(|_| left_value(left)), right_value(right))
                } else {
                    (self.right.map(|_| right_value(right)), left_value(left))
                };
                match preferred {
                    Some(v) => v.map(Cow::Borrowed),
                    None => fallback.map(Cow::Borrowed),
                }
            }
            ColumnSource::Mark => self.mark.map(|m| Cow::Owned(ScalarValue::Boolean(m))),
        }
    }
}

/// `prefix.column`, or just the column without a prefix.
pub fn prefixed(prefix: Option<&str>, column: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{column}"),
        None => column.to_string(),
    }
}
