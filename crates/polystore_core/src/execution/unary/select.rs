use polystore_error::Result;

use crate::expr::{Filter, PhysicalFilter};
use crate::table::Table;

/// Keep the rows satisfying `filter`, in order.
pub fn select(filter: &Filter, table: Table) -> Result<Table> {
    let filter = PhysicalFilter::plan(filter, &table.schema)?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in table.rows {
        if filter.evaluate(&row)? {
            rows.push(row);
        }
    }

    Ok(Table::new(table.schema, rows))
}

/// Rows `[offset, offset + limit)`, clipped to the input.
pub fn limit(offset: usize, limit: usize, table: Table) -> Table {
    let rows = table.rows.into_iter().skip(offset).take(limit).collect();
    Table::new(table.schema, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::expr::CompareOp;
    use crate::generate_table;

    #[test]
    fn select_rows() {
        let table = generate_table!(
            key: true,
            fields: [("a", DataType::Int64)],
            rows: [(1, [5_i64]), (2, [None]), (3, [7_i64])]
        );
        let filter = Filter::value("a", CompareOp::Gt, 5_i64);
        let out = select(&filter, table).unwrap();
        assert_eq!(1, out.num_rows());
        assert_eq!(Some(3), out.rows[0].key);
    }

    #[test]
    fn limit_clips() {
        let table = generate_table!(
            fields: [("a", DataType::Int64)],
            rows: [[1_i64], [2_i64], [3_i64]]
        );
        let out = limit(1, 10, table.clone());
        assert_eq!(2, out.num_rows());

        let out = limit(5, 1, table);
        assert!(out.is_empty());
        assert_eq!(1, out.schema.len());
    }
}
