//! Join operators.
//!
//! Every join is split into the same pieces: a [`JoinLayout`] describing the
//! output columns, a [`JoinCondition`] deciding which pairs of rows match, and
//! a candidate source picking which right rows to check for each left row.
//! The algorithm only changes the candidate source, so all algorithms produce
//! the same rows for the same inputs.

pub mod by_key;
pub mod condition;
pub mod hash_table;
pub mod layout;
pub mod legacy;
pub mod merge;
pub mod probe;

use std::ops::Range;

use polystore_error::{DbError, Result};
use rayon::prelude::*;
use tracing::debug;

use self::condition::{EquiPair, JoinColumns, JoinCondition, filter_equi_pairs};
use self::hash_table::JoinHashTable;
use self::layout::JoinLayout;
use self::merge::merge_probe;
use self::probe::{JoinKind, NestedLoopCandidates, Probe, ProbeState};
use super::context::ExecutionContext;
use super::plan::{CrossJoinParams, JoinAlgorithm, JoinParams, OuterJoinType, SubqueryJoinParams};
use crate::expr::Filter;
use crate::row::Row;
use crate::schema::Schema;
use crate::table::Table;

pub use self::legacy::legacy_join;

pub fn cross_join(
    ctx: &ExecutionContext,
    params: &CrossJoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let layout = JoinLayout::joined(
        &left.schema,
        &right.schema,
        params.prefix_a.as_deref(),
        params.prefix_b.as_deref(),
        true,
        &[],
        &[],
    );
    let condition = JoinCondition::always();
    let rows = run_join(
        ctx,
        JoinKind::Inner,
        JoinAlgorithm::NestedLoop,
        &condition,
        &layout,
        None,
        &left,
        &right,
    )?;

    Ok(Table::new(layout.schema, rows))
}

pub fn inner_join(
    ctx: &ExecutionContext,
    params: &JoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    if params.join_by_key {
        return by_key::join_by_key(left, right, false, false);
    }
    equi_join(ctx, JoinKind::Inner, "inner join", params, left, right)
}

pub fn outer_join(
    ctx: &ExecutionContext,
    outer_type: OuterJoinType,
    params: &JoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let kind = match outer_type {
        OuterJoinType::Left => JoinKind::Left,
        OuterJoinType::Right => JoinKind::Right,
        OuterJoinType::Full => JoinKind::Full,
    };
    if params.join_by_key {
        return by_key::join_by_key(
            left,
            right,
            kind.emits_unmatched_left(),
            kind.emits_unmatched_right(),
        );
    }
    equi_join(ctx, kind, "outer join", params, left, right)
}

/// Join every left row with at most one right row.
///
/// Errors if a left row matches more than one right row.
pub fn single_join(
    ctx: &ExecutionContext,
    params: &SubqueryJoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let columns = JoinColumns::extra_only(&left.schema, &right.schema, &params.extra_join_prefixes);
    let layout = JoinLayout::concat(&left.schema, &right.schema, &columns.extra_paths);
    let equi = columns.equi_pairs(&left.schema, &right.schema, None, None);
    let condition = JoinCondition::new(equi, params.filter.as_ref(), layout.clone())?;

    let rows = run_join(
        ctx,
        JoinKind::Single,
        params.algorithm,
        &condition,
        &layout,
        params.filter.as_ref(),
        &left,
        &right,
    )?;

    Ok(Table::new(layout.schema, rows))
}

/// Flag every left row with whether it has a match on the right.
pub fn mark_join(
    ctx: &ExecutionContext,
    mark_column: &str,
    anti: bool,
    params: &SubqueryJoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let columns = JoinColumns::extra_only(&left.schema, &right.schema, &params.extra_join_prefixes);
    let layout = JoinLayout::marked(&left.schema, mark_column);
    let equi = columns.equi_pairs(&left.schema, &right.schema, None, None);
    let filter_layout = JoinLayout::concat(&left.schema, &right.schema, &[]);
    let condition = JoinCondition::new(equi, params.filter.as_ref(), filter_layout)?;

    let rows = run_join(
        ctx,
        JoinKind::Mark { anti },
        params.algorithm,
        &condition,
        &layout,
        params.filter.as_ref(),
        &left,
        &right,
    )?;

    Ok(Table::new(layout.schema, rows))
}

fn equi_join(
    ctx: &ExecutionContext,
    kind: JoinKind,
    operator: &str,
    params: &JoinParams,
    left: Table,
    right: Table,
) -> Result<Table> {
    let prefix_a = params.prefix_a.as_deref();
    let prefix_b = params.prefix_b.as_deref();

    let columns = JoinColumns::resolve(
        operator,
        &left.schema,
        &right.schema,
        prefix_a,
        prefix_b,
        params.filter.as_ref(),
        &params.join_columns,
        params.natural,
        &params.extra_join_prefixes,
    )?;

    // Right joins keep the right side's copy of the join columns.
    let cut_right = kind != JoinKind::Right;
    let layout = JoinLayout::joined(
        &left.schema,
        &right.schema,
        prefix_a,
        prefix_b,
        cut_right,
        &columns.join_columns,
        &columns.extra_paths,
    );

    let equi = columns.equi_pairs(&left.schema, &right.schema, prefix_a, prefix_b);
    let condition = JoinCondition::new(equi, params.filter.as_ref(), layout.clone())?;

    let rows = run_join(
        ctx,
        kind,
        params.algorithm,
        &condition,
        &layout,
        params.filter.as_ref(),
        &left,
        &right,
    )?;

    Ok(Table::new(layout.schema, rows))
}

#[allow(clippy::too_many_arguments)]
fn run_join(
    ctx: &ExecutionContext,
    kind: JoinKind,
    algorithm: JoinAlgorithm,
    condition: &JoinCondition,
    layout: &JoinLayout,
    filter: Option<&Filter>,
    left: &Table,
    right: &Table,
) -> Result<Vec<Row>> {
    let probe = Probe {
        kind,
        condition,
        layout,
        left: &left.rows,
        right: &right.rows,
    };

    debug!(
        ?kind,
        ?algorithm,
        left_rows = left.rows.len(),
        right_rows = right.rows.len(),
        "running join"
    );

    let state = match algorithm {
        JoinAlgorithm::NestedLoop => {
            let mut candidates = NestedLoopCandidates {
                num_right: right.rows.len(),
            };
            probe.run(0..left.rows.len(), &mut candidates)?
        }
        JoinAlgorithm::Hash => {
            let pairs = hash_pairs(condition, filter, &left.schema, &right.schema)?;
            let table = JoinHashTable::build(&right.rows, pairs);

            let config = ctx.config;
            if config.enable_parallel_join && left.rows.len() > config.parallel_join_threshold {
                parallel_hash_probe(ctx, &probe, &table)?
            } else {
                probe.run(0..left.rows.len(), &mut &table)?
            }
        }
        JoinAlgorithm::SortedMerge => {
            let pairs = merge_pairs(condition, filter, &left.schema, &right.schema)?;
            merge_probe(&probe, &pairs)?
        }
    };

    Ok(state.finish(layout, &left.rows, &right.rows))
}

/// Probe the hash table from a checked out worker pool, one left range per
/// task. Results are merged in range order, so the output is the same as a
/// serial probe.
fn parallel_hash_probe(
    ctx: &ExecutionContext,
    probe: &Probe<'_>,
    table: &JoinHashTable,
) -> Result<ProbeState> {
    let pool = ctx.pools.checkout()?;

    let num_rows = probe.left.len();
    let chunk_size = num_rows.div_ceil(pool.current_num_threads().max(1)).max(1);
    let ranges: Vec<Range<usize>> = (0..num_rows)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(num_rows))
        .collect();

    debug!(
        query_id = %ctx.query_id,
        num_rows,
        num_tasks = ranges.len(),
        "probing hash table in parallel"
    );

    let states = pool.install(|| {
        ranges
            .into_par_iter()
            .map(|range| {
                let mut candidates = table;
                probe.run(range, &mut candidates)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(ProbeState::merge(states))
}

/// Columns to hash on. Falls back to equalities in the filter when there are
/// no join columns.
fn hash_pairs(
    condition: &JoinCondition,
    filter: Option<&Filter>,
    left: &Schema,
    right: &Schema,
) -> Result<Vec<EquiPair>> {
    if !condition.equi.is_empty() {
        return Ok(condition.equi.iter().copied().collect());
    }
    let Some(filter) = filter else {
        return Ok(Vec::new());
    };

    let pairs = filter_equi_pairs(filter, left, right);
    if pairs.is_empty() {
        return Err(DbError::invalid_parameter(format!(
            "filter: {filter} can't be used in hash join."
        )));
    }
    Ok(pairs)
}

/// Columns both inputs are sorted on: the using columns, else the
/// equalities of the filter, else the extra join paths.
fn merge_pairs(
    condition: &JoinCondition,
    filter: Option<&Filter>,
    left: &Schema,
    right: &Schema,
) -> Result<Vec<EquiPair>> {
    if !condition.equi.using.is_empty() {
        return Ok(condition.equi.using.clone());
    }
    let Some(filter) = filter else {
        return Ok(condition.equi.extra.clone());
    };

    if filter.equality_path_pairs().is_empty() {
        return Err(DbError::invalid_parameter(
            "on condition in join operator has no join columns.",
        ));
    }
    let pairs = filter_equi_pairs(filter, left, right);
    if pairs.is_empty() {
        return Err(DbError::invalid_parameter("invalid join path filter input."));
    }
    Ok(pairs)
}
