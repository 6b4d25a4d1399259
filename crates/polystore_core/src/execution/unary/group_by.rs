use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use polystore_error::{DbError, Result};
use rayon::prelude::*;
use tracing::debug;

use super::transform::apply_set_function;
use crate::execution::context::ExecutionContext;
use crate::execution::plan::GroupByParams;
use crate::functions::MappedRow;
use crate::row::Row;
use crate::scalar::{ScalarValue, nullable_eq};
use crate::schema::{Field, Schema};
use crate::table::Table;
use crate::util::hash::{HASH_RANDOM_STATE, HashMode, hash_nullable};

/// Values of the grouping columns for one group. Nulls group together.
#[derive(Debug, Clone)]
struct GroupKey(Vec<Option<ScalarValue>>);

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for value in &self.0 {
            state.write_u64(hash_nullable(value.as_ref(), HashMode::Native));
        }
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| nullable_eq(a.as_ref(), b.as_ref()))
    }
}

impl Eq for GroupKey {}

/// Partition rows by the grouping columns and apply every set mapping
/// function to each partition.
///
/// Groups come out in order of first appearance. Each output row holds the
/// group values followed by the function outputs. A group for which any
/// function produces nothing is left out.
pub fn group_by(ctx: &ExecutionContext, params: &GroupByParams, table: Table) -> Result<Table> {
    if table.is_empty() {
        return Ok(Table::empty());
    }

    let columns = params
        .group_by
        .iter()
        .map(|name| {
            table.schema.require_index(name, || {
                DbError::invalid_parameter(format!("Group by col [{name}] not exist."))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut groups: IndexMap<GroupKey, Vec<Row>, _> = IndexMap::with_hasher(HASH_RANDOM_STATE);
    for row in table.rows {
        let key = GroupKey(columns.iter().map(|&idx| row.values[idx].clone()).collect());
        groups.entry(key).or_default().push(row);
    }

    let group_schema = table.schema.project(&columns);
    let input_schema = Schema::new(table.schema.fields);
    let groups: Vec<_> = groups.into_iter().collect();

    let apply = |(key, rows): &(GroupKey, Vec<Row>)| -> Result<Option<Vec<MappedRow>>> {
        let group = Table::new(input_schema.clone(), rows.clone());
        let mut outputs = Vec::with_capacity(params.functions.len());
        for call in &params.functions {
            match apply_set_function(ctx, call, &group)? {
                Some(mapped) => outputs.push(mapped),
                None => {
                    debug!(group = ?key.0, function = %call.identifier, "dropping group without result");
                    return Ok(None);
                }
            }
        }
        Ok(Some(outputs))
    };

    let results = if ctx.config.enable_parallel_join
        && groups.len() > ctx.config.parallel_group_by_threshold
    {
        let pool = ctx.pools.checkout()?;
        debug!(groups = groups.len(), "applying group by functions in parallel");
        pool.install(|| groups.par_iter().map(apply).collect::<Result<Vec<_>>>())?
    } else {
        groups.iter().map(apply).collect::<Result<Vec<_>>>()?
    };

    let mut fields: Option<Vec<Field>> = None;
    let mut rows = Vec::with_capacity(results.len());
    for ((key, _), outputs) in groups.into_iter().zip(results) {
        let Some(outputs) = outputs else {
            continue;
        };
        if fields.is_none() {
            let mut group_fields = group_schema.fields.clone();
            group_fields.extend(outputs.iter().flat_map(|m| m.schema.fields.iter().cloned()));
            fields = Some(group_fields);
        }
        let mut values = key.0;
        values.extend(outputs.into_iter().flat_map(|m| m.row.values));
        rows.push(Row::new(values));
    }

    match fields {
        Some(fields) => Ok(Table::new(Schema::new(fields), rows)),
        None => Ok(Table::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::datatype::DataType;
    use crate::functions::builtin::{COUNT, SUM};
    use crate::functions::{FunctionCall, FunctionParams, FunctionRegistry, SetMappingFunction};
    use crate::generate_table;
    use crate::runtime::WorkerPools;

    fn input() -> Table {
        generate_table!(
            key: true,
            fields: [("g", DataType::Binary), ("v", DataType::Int64)],
            rows: [
                (1, ["b", 1_i64]),
                (2, ["a", 2_i64]),
                (3, ["b", 3_i64]),
                (4, [None, 4_i64]),
                (5, [None, 5_i64]),
            ]
        )
    }

    fn params() -> GroupByParams {
        GroupByParams {
            group_by: vec!["g".to_string()],
            functions: vec![
                FunctionCall::new(SUM, FunctionParams::new(["v"])),
                FunctionCall::new(COUNT, FunctionParams::new(["v"])),
            ],
        }
    }

    fn expected() -> Table {
        generate_table!(
            fields: [("g", DataType::Binary), ("sum(v)", DataType::Int64), ("count(v)", DataType::Int64)],
            rows: [["b", 4_i64, 2_i64], ["a", 2_i64, 1_i64], [None, 9_i64, 2_i64]]
        )
    }

    #[test]
    fn groups_in_first_appearance_order() {
        let config = ExecutorConfig::default();
        let registry = FunctionRegistry::with_builtins();
        let pools = WorkerPools::new(1, 1);
        let ctx = ExecutionContext::new(&config, &registry, &pools);

        let out = group_by(&ctx, &params(), input()).unwrap();
        assert_eq!(expected(), out);
    }

    #[test]
    fn parallel_matches_serial() {
        let config = ExecutorConfig {
            enable_parallel_join: true,
            parallel_group_by_threshold: 1,
            ..Default::default()
        };
        let registry = FunctionRegistry::with_builtins();
        let pools = WorkerPools::new(1, 2);
        let ctx = ExecutionContext::new(&config, &registry, &pools);

        let out = group_by(&ctx, &params(), input()).unwrap();
        assert_eq!(expected(), out);
    }

    /// Produces a row only for groups with more than one row.
    #[derive(Debug)]
    struct OnlyMany;

    impl SetMappingFunction for OnlyMany {
        fn identifier(&self) -> &str {
            "only_many"
        }

        fn transform(&self, table: &Table, _params: &FunctionParams) -> Result<Option<MappedRow>> {
            if table.num_rows() < 2 {
                return Ok(None);
            }
            Ok(Some(MappedRow {
                schema: Schema::new([Field::new("n", DataType::Int64)]),
                row: Row::new(vec![Some(table.num_rows().into())]),
            }))
        }
    }

    #[test]
    fn group_without_result_dropped() {
        let config = ExecutorConfig::default();
        let mut registry = FunctionRegistry::new();
        registry.register_set_mapping(std::sync::Arc::new(OnlyMany));
        let pools = WorkerPools::new(1, 1);
        let ctx = ExecutionContext::new(&config, &registry, &pools);

        let params = GroupByParams {
            group_by: vec!["g".to_string()],
            functions: vec![FunctionCall::new("only_many", FunctionParams::new(["v"]))],
        };
        let out = group_by(&ctx, &params, input()).unwrap();
        let expected = generate_table!(
            fields: [("g", DataType::Binary), ("n", DataType::Int64)],
            rows: [["b", 2_i64], [None, 2_i64]]
        );
        assert_eq!(expected, out);
    }

    #[test]
    fn missing_group_column() {
        let config = ExecutorConfig::default();
        let registry = FunctionRegistry::with_builtins();
        let pools = WorkerPools::new(1, 1);
        let ctx = ExecutionContext::new(&config, &registry, &pools);

        let params = GroupByParams {
            group_by: vec!["x".to_string()],
            functions: Vec::new(),
        };
        let err = group_by(&ctx, &params, input()).unwrap_err();
        assert_eq!("Group by col [x] not exist.", err.message());
        assert_eq!(None, err.field("did_you_mean"));

        let params = GroupByParams {
            group_by: vec!["vv".to_string()],
            functions: Vec::new(),
        };
        let err = group_by(&ctx, &params, input()).unwrap_err();
        assert_eq!(Some("v"), err.field("did_you_mean"));
    }
}
