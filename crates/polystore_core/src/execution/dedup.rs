//! Hash based row equality, used by distinct and set operators.

use hashbrown::HashMap;

use crate::row::Row;
use crate::scalar::nullable_eq;
use crate::schema::Schema;
use crate::util::hash::{HashMode, combine_hashes, hash_key, hash_nullable};

/// Hashes and compares whole rows.
///
/// Two nulls in the same column are equal. Values of different numeric types
/// are equal when their values are.
#[derive(Debug, Clone)]
pub struct RowHasher {
    compare_key: bool,
    modes: Vec<HashMode>,
}

impl RowHasher {
    /// Hasher for rows of one schema, ignoring keys.
    pub fn for_schema(schema: &Schema) -> Self {
        RowHasher {
            compare_key: false,
            modes: schema
                .fields
                .iter()
                .map(|f| HashMode::for_types(f.datatype, f.datatype))
                .collect(),
        }
    }

    /// Hasher comparing rows of two column-wise comparable schemas. Keys are
    /// compared when the schemas have them.
    pub fn for_pair(left: &Schema, right: &Schema) -> Self {
        RowHasher {
            compare_key: left.has_key && right.has_key,
            modes: left
                .fields
                .iter()
                .zip(&right.fields)
                .map(|(l, r)| HashMode::for_types(l.datatype, r.datatype))
                .collect(),
        }
    }

    pub fn hash(&self, row: &Row) -> u64 {
        let mut hash = match (self.compare_key, row.key) {
            (true, Some(key)) => hash_key(key),
            _ => 0,
        };
        for (idx, mode) in self.modes.iter().enumerate() {
            hash = combine_hashes(hash_nullable(row.value(idx), *mode), hash);
        }
        hash
    }

    pub fn equals(&self, a: &Row, b: &Row) -> bool {
        if self.compare_key && a.key != b.key {
            return false;
        }
        (0..self.modes.len()).all(|idx| nullable_eq(a.value(idx), b.value(idx)))
    }
}

/// Collects rows, dropping any row equal to one already collected.
#[derive(Debug)]
pub struct DistinctRows {
    hasher: RowHasher,
    buckets: HashMap<u64, Vec<usize>>,
    rows: Vec<Row>,
}

impl DistinctRows {
    pub fn new(hasher: RowHasher) -> Self {
        DistinctRows {
            hasher,
            buckets: HashMap::new(),
            rows: Vec::new(),
        }
    }

    /// Insert a row, returning false if an equal row was already present.
    pub fn insert(&mut self, row: Row) -> bool {
        let hash = self.hasher.hash(&row);
        let bucket = self.buckets.entry(hash).or_default();
        if bucket
            .iter()
            .any(|&idx| self.hasher.equals(&self.rows[idx], &row))
        {
            return false;
        }
        bucket.push(self.rows.len());
        self.rows.push(row);
        true
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Membership lookup over a fixed set of rows.
#[derive(Debug)]
pub struct RowLookup<'a> {
    hasher: RowHasher,
    buckets: HashMap<u64, Vec<usize>>,
    rows: &'a [Row],
}

impl<'a> RowLookup<'a> {
    pub fn new(hasher: RowHasher, rows: &'a [Row]) -> Self {
        let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
        for (idx, row) in rows.iter().enumerate() {
            buckets.entry(hasher.hash(row)).or_default().push(idx);
        }
        RowLookup {
            hasher,
            buckets,
            rows,
        }
    }

    pub fn contains(&self, row: &Row) -> bool {
        self.buckets
            .get(&self.hasher.hash(row))
            .is_some_and(|bucket| {
                bucket
                    .iter()
                    .any(|&idx| self.hasher.equals(&self.rows[idx], row))
            })
    }
}

/// Remove rows equal to an earlier row, ignoring keys. Keeps the first
/// occurrence.
pub fn remove_duplicate_rows(schema: &Schema, rows: Vec<Row>) -> Vec<Row> {
    let mut distinct = DistinctRows::new(RowHasher::for_schema(schema));
    for row in rows {
        distinct.insert(row);
    }
    distinct.into_rows()
}
