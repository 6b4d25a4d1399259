use hashbrown::HashMap;

use super::condition::EquiPair;
use super::probe::{CandidateSource, Candidates};
use crate::row::Row;
use crate::util::hash::{combine_hashes, hash_scalar};

/// Hash table over the right side of a join.
///
/// Buckets hold row indices in input order. Rows with a null in any of the
/// hashed columns are never inserted since they can't match.
#[derive(Debug)]
pub struct JoinHashTable {
    pairs: Vec<EquiPair>,
    buckets: HashMap<u64, Vec<usize>>,
}

impl JoinHashTable {
    pub fn build(right: &[Row], pairs: Vec<EquiPair>) -> Self {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, row) in right.iter().enumerate() {
            if let Some(hash) = hash_columns(row, &pairs, |p| p.right) {
                buckets.entry(hash).or_default().push(idx);
            }
        }

        JoinHashTable { pairs, buckets }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Indices of the right rows that may match `left`.
    pub fn probe(&self, left: &Row) -> &[usize] {
        hash_columns(left, &self.pairs, |p| p.left)
            .and_then(|hash| self.buckets.get(&hash))
            .map(|indices| indices.as_slice())
            .unwrap_or(&[])
    }
}

impl CandidateSource for &JoinHashTable {
    fn candidates(&mut self, left: &Row) -> Candidates<'_> {
        Candidates::Indices(self.probe(left).iter())
    }
}

fn hash_columns(row: &Row, pairs: &[EquiPair], column: impl Fn(&EquiPair) -> usize) -> Option<u64> {
    let mut result = 0;
    for (idx, pair) in pairs.iter().enumerate() {
        let hash = hash_scalar(row.value(column(pair))?, pair.mode);
        result = if idx > 0 {
            combine_hashes(hash, result)
        } else {
            hash
        };
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hash::HashMode;

    #[test]
    fn skips_null_keys() {
        let right = vec![
            Row::new(vec![Some(1_i64.into())]),
            Row::new(vec![None]),
            Row::new(vec![Some(1_i64.into())]),
        ];
        let pairs = vec![EquiPair {
            left: 0,
            right: 0,
            mode: HashMode::CastToFloat,
        }];
        let table = JoinHashTable::build(&right, pairs);
        assert_eq!(1, table.num_buckets());

        let probe = Row::new(vec![Some(1_i32.into())]);
        assert_eq!(&[0, 2], table.probe(&probe));
        assert!(table.probe(&Row::new(vec![None])).is_empty());
    }
}
