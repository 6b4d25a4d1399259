use std::ops::Range;

use polystore_error::{DbError, Result};

use super::condition::JoinCondition;
use super::layout::JoinLayout;
use crate::row::Row;
use crate::util::bitmap::Bitmap;

/// Join semantics, independent of the algorithm used to find matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// At most one right row per left row. Unmatched left rows are padded
    /// with nulls.
    Single,
    /// One output row per left row flagged with whether any right row
    /// matched. The flag is inverted for anti joins.
    Mark { anti: bool },
}

impl JoinKind {
    pub const fn emits_unmatched_left(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    pub const fn emits_unmatched_right(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

/// Right row indices to check against one left row.
#[derive(Debug, Clone)]
pub enum Candidates<'a> {
    Range(Range<usize>),
    Indices(std::slice::Iter<'a, usize>),
}

impl Iterator for Candidates<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Range(range) => range.next(),
            Self::Indices(iter) => iter.next().copied(),
        }
    }
}

/// Produces candidate right rows for left rows.
///
/// Candidates may include rows that don't satisfy the join condition, every
/// candidate gets checked. A source must never omit a matching row.
pub trait CandidateSource {
    fn candidates(&mut self, left: &Row) -> Candidates<'_>;
}

/// Every right row is a candidate.
#[derive(Debug, Clone, Copy)]
pub struct NestedLoopCandidates {
    pub num_right: usize,
}

impl CandidateSource for NestedLoopCandidates {
    fn candidates(&mut self, _left: &Row) -> Candidates<'_> {
        Candidates::Range(0..self.num_right)
    }
}

/// Output of probing some left rows.
#[derive(Debug, Default)]
pub struct ProbeState {
    pub rows: Vec<Row>,
    /// Left rows without a match, for left and full joins.
    pub unmatched_left: Vec<usize>,
    /// Right rows that matched at least once, for right and full joins.
    pub right_matched: Option<Bitmap>,
}

impl ProbeState {
    /// Combine the states of probes over consecutive left ranges.
    pub fn merge(states: Vec<ProbeState>) -> ProbeState {
        let mut merged = ProbeState::default();
        for state in states {
            merged.rows.extend(state.rows);
            merged.unmatched_left.extend(state.unmatched_left);
            if let Some(other) = state.right_matched {
                match merged.right_matched.as_mut() {
                    Some(existing) => existing.bit_or_mut(&other),
                    None => merged.right_matched = Some(other),
                }
            }
        }
        merged
    }

    /// Append the unmatched rows of outer joins. Left rows come before right
    /// rows.
    pub fn finish(self, layout: &JoinLayout, left: &[Row], right: &[Row]) -> Vec<Row> {
        let mut rows = self.rows;
        for idx in self.unmatched_left {
            rows.push(layout.build_row(Some(&left[idx]), None, None));
        }
        if let Some(matched) = self.right_matched {
            for idx in matched.unset_indices() {
                rows.push(layout.build_row(None, Some(&right[idx]), None));
            }
        }
        rows
    }
}

/// Shared inputs of a probe.
#[derive(Debug, Clone, Copy)]
pub struct Probe<'a> {
    pub kind: JoinKind,
    pub condition: &'a JoinCondition,
    pub layout: &'a JoinLayout,
    pub left: &'a [Row],
    pub right: &'a [Row],
}

impl Probe<'_> {
    /// Probe the left rows at `left_indices`, in order.
    pub fn run<C>(
        &self,
        left_indices: impl IntoIterator<Item = usize>,
        candidates: &mut C,
    ) -> Result<ProbeState>
    where
        C: CandidateSource,
    {
        let mut state = ProbeState {
            right_matched: self
                .kind
                .emits_unmatched_right()
                .then(|| Bitmap::new_with_all_false(self.right.len())),
            ..Default::default()
        };

        for left_idx in left_indices {
            let left_row = &self.left[left_idx];
            let mut matched = false;

            for right_idx in candidates.candidates(left_row) {
                let right_row = &self.right[right_idx];
                if !self.condition.matches(left_row, right_row)? {
                    continue;
                }

                match self.kind {
                    JoinKind::Mark { .. } => {
                        matched = true;
                        break;
                    }
                    JoinKind::Single if matched => {
                        return Err(DbError::cardinality_violation(
                            "the return value of sub-query has more than one rows",
                        ));
                    }
                    _ => (),
                }

                matched = true;
                state
                    .rows
                    .push(self.layout.build_row(Some(left_row), Some(right_row), None));
                if let Some(bitmap) = state.right_matched.as_mut() {
                    bitmap.set_unchecked(right_idx, true);
                }
            }

            match self.kind {
                JoinKind::Mark { anti } => {
                    state
                        .rows
                        .push(self.layout.build_row(Some(left_row), None, Some(matched != anti)));
                }
                JoinKind::Single if !matched => {
                    state.rows.push(self.layout.build_row(Some(left_row), None, None));
                }
                kind if kind.emits_unmatched_left() && !matched => {
                    state.unmatched_left.push(left_idx);
                }
                _ => (),
            }
        }

        Ok(state)
    }
}
