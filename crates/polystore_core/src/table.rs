use std::fmt::Debug;

use polystore_error::Result;
use serde::{Deserialize, Serialize};

use crate::row::Row;
use crate::schema::Schema;

/// Pull-based producer of rows.
pub trait RowSource: Debug + Send {
    fn schema(&self) -> &Schema;

    /// Get the next row, or None if the source is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release any resources held by the source.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fully buffered rows with their schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub schema: Schema,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Table { schema, rows }
    }

    /// Table with no rows and no fields.
    pub const fn empty() -> Self {
        Table {
            schema: Schema::empty(),
            rows: Vec::new(),
        }
    }

    /// Table with no rows and no fields, whose rows would carry a key.
    pub const fn empty_with_key() -> Self {
        Table {
            schema: Schema::empty_with_key(),
            rows: Vec::new(),
        }
    }

    /// Empty table keeping the key setting of `schema`.
    pub const fn empty_like(schema: &Schema) -> Self {
        if schema.has_key {
            Self::empty_with_key()
        } else {
            Self::empty()
        }
    }

    /// Drain `source` into a table, closing the source afterwards.
    ///
    /// The source is closed even if reading fails.
    pub fn materialize(source: &mut dyn RowSource) -> Result<Table> {
        let schema = source.schema().clone();
        let mut rows = Vec::new();

        let drained = drain_into(source, &mut rows);

        let closed = source.close();
        drained?;
        closed?;

        Ok(Table { schema, rows })
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, idx: usize) -> Option<&Row> {
        self.rows.get(idx)
    }

    pub fn into_scan(self) -> TableScan {
        TableScan {
            schema: self.schema,
            rows: self.rows.into_iter(),
        }
    }
}

fn drain_into(source: &mut dyn RowSource, rows: &mut Vec<Row>) -> Result<()> {
    while let Some(row) = source.next_row()? {
        rows.push(row);
    }
    Ok(())
}

/// Source that yields the rows of a table.
#[derive(Debug)]
pub struct TableScan {
    schema: Schema,
    rows: std::vec::IntoIter<Row>,
}

impl RowSource for TableScan {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.next())
    }
}

#[cfg(test)]
mod tests {
    use polystore_error::DbError;

    use super::*;
    use crate::datatype::DataType;
    use crate::schema::Field;

    #[derive(Debug)]
    struct FailingSource {
        schema: Schema,
        remaining: usize,
        closed: bool,
    }

    impl RowSource for FailingSource {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn next_row(&mut self) -> Result<Option<Row>> {
            if self.remaining == 0 {
                return Err(DbError::new("source failed"));
            }
            self.remaining -= 1;
            Ok(Some(Row::with_key(self.remaining as i64, vec![None])))
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn materialize_scan() {
        let schema = Schema::with_key([Field::new("a", DataType::Int64)]);
        let table = Table::new(
            schema.clone(),
            vec![
                Row::with_key(1, vec![Some(1_i64.into())]),
                Row::with_key(2, vec![None]),
            ],
        );

        let mut scan = table.clone().into_scan();
        let got = Table::materialize(&mut scan).unwrap();
        assert_eq!(table, got);
    }

    #[test]
    fn materialize_closes_on_error() {
        let mut source = FailingSource {
            schema: Schema::with_key([Field::new("a", DataType::Int64)]),
            remaining: 2,
            closed: false,
        };
        Table::materialize(&mut source).unwrap_err();
        assert!(source.closed);
    }
}
