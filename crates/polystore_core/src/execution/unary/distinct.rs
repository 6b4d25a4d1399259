use polystore_error::Result;

use super::project::project;
use crate::execution::dedup::remove_duplicate_rows;
use crate::execution::plan::ProjectParams;
use crate::row::Row;
use crate::schema::Schema;
use crate::table::Table;

/// Project onto `patterns` and drop duplicate rows. The output has no key.
pub fn distinct(patterns: &[String], table: Table) -> Result<Table> {
    let params = ProjectParams {
        patterns: patterns.to_vec(),
        remain_key: false,
    };
    let projected = project(&params, table)?;
    if projected.schema.is_empty() {
        return Ok(projected);
    }

    let schema = Schema::new(projected.schema.fields);
    let rows = projected
        .rows
        .into_iter()
        .map(|row| Row::new(row.values))
        .collect();
    let rows = remove_duplicate_rows(&schema, rows);

    Ok(Table::new(schema, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::generate_table;

    #[test]
    fn distinct_drops_key_and_duplicates() {
        let table = generate_table!(
            key: true,
            fields: [("a", DataType::Int64), ("b", DataType::Binary)],
            rows: [(1, [1_i64, "x"]), (2, [1_i64, "y"]), (3, [2_i64, "x"]), (4, [None, "z"]), (5, [None, "w"])]
        );
        let out = distinct(&["a".to_string()], table).unwrap();

        let expected = generate_table!(
            fields: [("a", DataType::Int64)],
            rows: [[1_i64], [2_i64], [None]]
        );
        assert_eq!(expected, out);
    }

    #[test]
    fn idempotent() {
        let table = generate_table!(
            fields: [("a", DataType::Int64), ("b", DataType::Int64)],
            rows: [[1_i64, 2_i64], [1_i64, 2_i64], [None, 2_i64], [None, 2_i64], [3_i64, None]]
        );
        let patterns = vec!["*".to_string()];
        let once = distinct(&patterns, table).unwrap();
        let twice = distinct(&patterns, once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(3, once.num_rows());
    }
}
