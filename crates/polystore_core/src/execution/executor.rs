use std::fmt::Debug;
use std::sync::Arc;

use polystore_error::{DbError, Result, ResultExt, not_implemented};
use tracing::{debug, debug_span, info_span};

use super::context::ExecutionContext;
use super::join::{cross_join, inner_join, legacy_join, mark_join, outer_join, single_join};
use super::plan::{BinaryOperator, PlanNode, UnaryOperator};
use super::setop::path_union::path_union;
use super::setop::{SetOpKind, set_operation};
use super::unary::distinct::distinct;
use super::unary::downsample::downsample;
use super::unary::group_by::group_by;
use super::unary::project::{add_schema_prefix, project, remove_null_column};
use super::unary::rename::rename;
use super::unary::reorder::reorder;
use super::unary::select::{limit, select};
use super::unary::sequence::{add_sequence, value_to_selected_path};
use super::unary::sort::sort;
use super::unary::transform::{mapping_transform, row_transform, set_transform};
use crate::config::ExecutorConfig;
use crate::functions::FunctionRegistry;
use crate::runtime::WorkerPools;
use crate::table::Table;

/// Session able to execute a serialized sub-plan somewhere else.
pub trait RemoteSession: Debug + Send + Sync {
    /// Execute a plan serialized as JSON and return its materialized output.
    fn execute_plan(&self, plan: &str) -> Result<Table>;
}

/// Output of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub table: Table,
    /// Non-fatal advisories raised while executing.
    pub warnings: Vec<String>,
}

/// Evaluates operator trees over materialized tables.
///
/// Children are evaluated before their parent, left before right. Every
/// operator consumes its input tables and produces a new one.
#[derive(Debug)]
pub struct OperatorExecutor {
    config: ExecutorConfig,
    registry: Arc<FunctionRegistry>,
    pools: Arc<WorkerPools>,
    remote: Option<Arc<dyn RemoteSession>>,
}

impl OperatorExecutor {
    pub fn new(config: ExecutorConfig, registry: Arc<FunctionRegistry>) -> Self {
        let pools = Arc::new(WorkerPools::new(
            config.parallel_pool_count,
            config.parallel_pool_size,
        ));
        OperatorExecutor {
            config,
            registry,
            pools,
            remote: None,
        }
    }

    /// Executor with the builtin functions and default config.
    pub fn with_defaults() -> Self {
        Self::new(
            ExecutorConfig::default(),
            Arc::new(FunctionRegistry::with_builtins()),
        )
    }

    pub fn with_remote_session(mut self, session: Arc<dyn RemoteSession>) -> Self {
        self.remote = Some(session);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn execute(&self, plan: PlanNode) -> Result<QueryResult> {
        let ctx = ExecutionContext::new(&self.config, &self.registry, &self.pools);
        let span = info_span!("execute_query", query_id = %ctx.query_id);
        let _entered = span.enter();

        let table = self.execute_node(&ctx, plan)?;
        debug!(rows = table.num_rows(), "query finished");

        Ok(QueryResult {
            table,
            warnings: ctx.take_warnings(),
        })
    }

    fn execute_node(&self, ctx: &ExecutionContext, plan: PlanNode) -> Result<Table> {
        match plan {
            PlanNode::Table(table) => Ok(table),
            PlanNode::Source(mut source) => Table::materialize(source.as_mut()),
            PlanNode::Unary {
                op: UnaryOperator::RemoteFetch { sub_plan },
                ..
            } => self.remote_fetch(&sub_plan),
            PlanNode::Unary { op, input } => {
                let input = self.execute_node(ctx, *input)?;
                let span = debug_span!("unary", operator = op.name(), rows = input.num_rows());
                let _entered = span.enter();
                execute_unary(ctx, op, input)
            }
            PlanNode::Binary { op, left, right } => {
                let left = self.execute_node(ctx, *left)?;
                let right = self.execute_node(ctx, *right)?;
                let span = debug_span!(
                    "binary",
                    operator = op.name(),
                    left_rows = left.num_rows(),
                    right_rows = right.num_rows()
                );
                let _entered = span.enter();
                execute_binary(ctx, op, left, right)
            }
        }
    }

    fn remote_fetch(&self, sub_plan: &PlanNode) -> Result<Table> {
        let Some(remote) = &self.remote else {
            not_implemented!("remote fetch without a remote session");
        };
        let plan = serde_json::to_string(sub_plan).context("Failed to serialize sub-plan")?;
        debug!(bytes = plan.len(), "sending sub-plan to remote session");
        remote.execute_plan(&plan)
    }
}

fn execute_unary(ctx: &ExecutionContext, op: UnaryOperator, input: Table) -> Result<Table> {
    match op {
        UnaryOperator::Project(params) => project(&params, input),
        UnaryOperator::Select { filter } => select(&filter, input),
        UnaryOperator::Sort(params) => sort(&params, input),
        UnaryOperator::Limit { offset, limit: n } => Ok(limit(offset, n, input)),
        UnaryOperator::Rename(params) => rename(&params, input),
        UnaryOperator::Reorder(params) => reorder(&params, input),
        UnaryOperator::AddSchemaPrefix { prefix } => {
            Ok(add_schema_prefix(prefix.as_deref(), input))
        }
        UnaryOperator::Distinct { patterns } => distinct(&patterns, input),
        UnaryOperator::GroupBy(params) => group_by(ctx, &params, input),
        UnaryOperator::Downsample(params) => downsample(ctx, &params, input),
        UnaryOperator::RowTransform { functions } => row_transform(ctx, &functions, input),
        UnaryOperator::SetTransform { functions } => set_transform(ctx, &functions, input),
        UnaryOperator::MappingTransform { functions } => {
            mapping_transform(ctx, &functions, input)
        }
        UnaryOperator::AddSequence { columns } => Ok(add_sequence(&columns, input)),
        UnaryOperator::RemoveNullColumn => Ok(remove_null_column(input)),
        UnaryOperator::ValueToSelectedPath { prefix } => {
            Ok(value_to_selected_path(prefix.as_deref(), input))
        }
        UnaryOperator::RemoteFetch { .. } => Err(DbError::new(
            "remote fetch must be executed by the executor",
        )),
    }
}

fn execute_binary(
    ctx: &ExecutionContext,
    op: BinaryOperator,
    left: Table,
    right: Table,
) -> Result<Table> {
    match op {
        BinaryOperator::Join(params) => legacy_join(ctx, &params, left, right),
        BinaryOperator::CrossJoin(params) => cross_join(ctx, &params, left, right),
        BinaryOperator::InnerJoin(params) => inner_join(ctx, &params, left, right),
        BinaryOperator::OuterJoin { outer_type, params } => {
            outer_join(ctx, outer_type, &params, left, right)
        }
        BinaryOperator::SingleJoin(params) => single_join(ctx, &params, left, right),
        BinaryOperator::MarkJoin {
            mark_column,
            anti,
            params,
        } => mark_join(ctx, &mark_column, anti, &params, left, right),
        BinaryOperator::Union(params) => set_operation(SetOpKind::Union, &params, left, right),
        BinaryOperator::Except(params) => set_operation(SetOpKind::Except, &params, left, right),
        BinaryOperator::Intersect(params) => {
            set_operation(SetOpKind::Intersect, &params, left, right)
        }
        BinaryOperator::PathUnion => path_union(ctx, left, right),
    }
}
