use std::cmp::Ordering;

use polystore_error::{DbError, Result};

use super::condition::EquiPair;
use super::probe::{CandidateSource, Candidates, Probe, ProbeState};
use crate::row::Row;
use crate::scalar::compare_nullable;

/// Order of an input on its merge columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// All rows hold equal values.
    Constant,
    Ascending,
    Descending,
}

impl SortDirection {
    /// Detect the direction rows are sorted in.
    pub fn detect(rows: &[Row], columns: &[usize]) -> Result<Self> {
        let mut direction = SortDirection::Constant;
        for pair in rows.windows(2) {
            let ord = compare_rows(&pair[0], columns, &pair[1], columns);
            direction = match (direction, ord) {
                (direction, Ordering::Equal) => direction,
                (SortDirection::Constant, Ordering::Less) => SortDirection::Ascending,
                (SortDirection::Constant, Ordering::Greater) => SortDirection::Descending,
                (SortDirection::Ascending, Ordering::Less) => SortDirection::Ascending,
                (SortDirection::Descending, Ordering::Greater) => SortDirection::Descending,
                _ => {
                    return Err(DbError::invalid_parameter(
                        "input rows in merge join haven't be sorted.",
                    ));
                }
            };
        }
        Ok(direction)
    }
}

/// Whether two sorted inputs are to be merged descending.
fn is_descending(left: SortDirection, right: SortDirection) -> Result<bool> {
    match (left, right) {
        (SortDirection::Ascending, SortDirection::Descending)
        | (SortDirection::Descending, SortDirection::Ascending) => Err(DbError::invalid_parameter(
            "input two rows in merge join shouldn't have different sort order.",
        )),
        (SortDirection::Descending, _) | (_, SortDirection::Descending) => Ok(true),
        _ => Ok(false),
    }
}

fn compare_rows(a: &Row, a_cols: &[usize], b: &Row, b_cols: &[usize]) -> Ordering {
    for (&a_col, &b_col) in a_cols.iter().zip(b_cols) {
        match compare_nullable(a.value(a_col), b.value(b_col)) {
            Ordering::Equal => (),
            other => return other,
        }
    }
    Ordering::Equal
}

/// Walks the right side in merge order alongside ascending left rows.
///
/// The cursor only moves past right rows smaller than the current left row,
/// so a run of equal right rows is offered again to the next left row with
/// the same values.
#[derive(Debug)]
struct MergeCursor<'a> {
    right: &'a [Row],
    right_cols: Vec<usize>,
    left_cols: Vec<usize>,
    order: Vec<usize>,
    pos: usize,
}

impl MergeCursor<'_> {
    fn compare(&self, right_idx: usize, left: &Row) -> Ordering {
        compare_rows(
            &self.right[right_idx],
            &self.right_cols,
            left,
            &self.left_cols,
        )
    }
}

impl CandidateSource for MergeCursor<'_> {
    fn candidates(&mut self, left: &Row) -> Candidates<'_> {
        while self.pos < self.order.len() && self.compare(self.order[self.pos], left).is_lt() {
            self.pos += 1;
        }
        let mut end = self.pos;
        while end < self.order.len() && self.compare(self.order[end], left).is_eq() {
            end += 1;
        }
        Candidates::Indices(self.order[self.pos..end].iter())
    }
}

/// Probe with a sorted merge over `pairs`.
///
/// Both inputs must already be sorted on their side of the pairs, in the same
/// direction. Matched rows come out in input order followed by unmatched
/// rows.
pub fn merge_probe(probe: &Probe<'_>, pairs: &[EquiPair]) -> Result<ProbeState> {
    let left_cols: Vec<_> = pairs.iter().map(|p| p.left).collect();
    let right_cols: Vec<_> = pairs.iter().map(|p| p.right).collect();

    let descending = is_descending(
        SortDirection::detect(probe.left, &left_cols)?,
        SortDirection::detect(probe.right, &right_cols)?,
    )?;

    let ascending_order = |len: usize| -> Vec<usize> {
        if descending {
            (0..len).rev().collect()
        } else {
            (0..len).collect()
        }
    };

    let mut cursor = MergeCursor {
        right: probe.right,
        right_cols,
        left_cols,
        order: ascending_order(probe.right.len()),
        pos: 0,
    };
    let mut state = probe.run(ascending_order(probe.left.len()), &mut cursor)?;

    if descending {
        state.rows.reverse();
        state.unmatched_left.reverse();
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[i64]) -> Vec<Row> {
        values
            .iter()
            .map(|v| Row::new(vec![Some((*v).into())]))
            .collect()
    }

    #[test]
    fn detect_direction() {
        assert_eq!(
            SortDirection::Ascending,
            SortDirection::detect(&rows(&[1, 1, 2, 3]), &[0]).unwrap()
        );
        assert_eq!(
            SortDirection::Descending,
            SortDirection::detect(&rows(&[3, 3, 1]), &[0]).unwrap()
        );
        assert_eq!(
            SortDirection::Constant,
            SortDirection::detect(&rows(&[2, 2]), &[0]).unwrap()
        );

        let err = SortDirection::detect(&rows(&[1, 3, 2]), &[0]).unwrap_err();
        assert_eq!("input rows in merge join haven't be sorted.", err.message());
    }

    #[test]
    fn conflicting_directions() {
        let err = is_descending(SortDirection::Ascending, SortDirection::Descending).unwrap_err();
        assert_eq!(
            "input two rows in merge join shouldn't have different sort order.",
            err.message()
        );
        assert!(is_descending(SortDirection::Constant, SortDirection::Descending).unwrap());
        assert!(!is_descending(SortDirection::Constant, SortDirection::Constant).unwrap());
    }

    #[test]
    fn cursor_rescans_equal_runs() {
        let right = rows(&[1, 2, 2, 4]);
        let mut cursor = MergeCursor {
            right: &right,
            right_cols: vec![0],
            left_cols: vec![0],
            order: vec![0, 1, 2, 3],
            pos: 0,
        };

        let left = rows(&[2, 2, 3, 4]);
        let got: Vec<Vec<usize>> = left
            .iter()
            .map(|row| cursor.candidates(row).collect())
            .collect();
        assert_eq!(vec![vec![1, 2], vec![1, 2], vec![], vec![3]], got);
    }
}
