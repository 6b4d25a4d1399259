use std::collections::BTreeMap;
use std::fmt;

use polystore_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::datatype::DataType;
use crate::pattern::PathPattern;

/// Name used when referring to the row key as a column.
pub const KEY: &str = "key";

pub const WINDOW_START: &str = "window_start";
pub const WINDOW_END: &str = "window_end";

/// Columns that are always kept in front by a reorder.
pub const RESERVED_COLUMNS: [&str; 2] = [WINDOW_START, WINDOW_END];

/// A named, typed column.
///
/// Tags distinguish physical series that share one logical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Field {
            name: name.into(),
            datatype,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tags(
        name: impl Into<String>,
        datatype: DataType,
        tags: BTreeMap<String, String>,
    ) -> Self {
        Field {
            name: name.into(),
            datatype,
            tags,
        }
    }

    /// Name including tags, e.g. `cpu.usage{host=a}`.
    pub fn full_name(&self) -> String {
        if self.tags.is_empty() {
            return self.name.clone();
        }
        let tags = self
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{{{}}}", self.name, tags)
    }

    /// Same field with a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            datatype: self.datatype,
            tags: self.tags.clone(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.full_name(), self.datatype)
    }
}

/// Ordered fields plus whether rows carry a key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
    pub has_key: bool,
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
            has_key: false,
        }
    }

    pub fn with_key(fields: impl IntoIterator<Item = Field>) -> Self {
        Schema {
            fields: fields.into_iter().collect(),
            has_key: true,
        }
    }

    pub const fn empty() -> Self {
        Schema {
            fields: Vec::new(),
            has_key: false,
        }
    }

    pub const fn empty_with_key() -> Self {
        Schema {
            fields: Vec::new(),
            has_key: true,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    /// Find a column index by full name, falling back to the plain name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.tags.is_empty() && f.name == name)
            .or_else(|| self.fields.iter().position(|f| f.full_name() == name))
            .or_else(|| self.fields.iter().position(|f| f.name == name))
    }

    /// Like `index_of`, but returns the error from `missing` if the column
    /// doesn't exist, carrying the closest column name as `did_you_mean`.
    pub fn require_index(&self, name: &str, missing: impl FnOnce() -> DbError) -> Result<usize> {
        match self.index_of(name) {
            Some(idx) => Ok(idx),
            None => {
                let mut err = missing();
                if let Some(similar) = self.most_similar(name) {
                    err = err.with_field("did_you_mean", similar);
                }
                Err(err)
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Indices of all fields whose name matches the pattern, in schema order.
    pub fn indices_matching(&self, pattern: &PathPattern) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| pattern.matches(&f.name).then_some(idx))
            .collect()
    }

    /// Schema keeping only the fields at `indices`.
    pub fn project(&self, indices: &[usize]) -> Schema {
        Schema {
            fields: indices.iter().map(|&idx| self.fields[idx].clone()).collect(),
            has_key: self.has_key,
        }
    }

    fn most_similar(&self, name: &str) -> Option<&str> {
        const SIMILARITY_THRESHOLD: f64 = 0.7;

        let mut best: Option<(f64, &str)> = None;
        for field in &self.fields {
            let score = strsim::jaro(&field.name, name);
            if score <= SIMILARITY_THRESHOLD {
                continue;
            }
            match best {
                Some((existing, _)) if existing >= score => (),
                _ => best = Some((score, field.name.as_str())),
            }
        }
        best.map(|(_, name)| name)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if self.has_key {
            write!(f, "{KEY}")?;
            if !self.fields.is_empty() {
                write!(f, ", ")?;
            }
        }
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn full_name_with_tags() {
        let f = Field::with_tags("cpu.usage", DataType::Float64, tags(&[("host", "a")]));
        assert_eq!("cpu.usage{host=a}", f.full_name());
        assert_eq!("cpu.usage", Field::new("cpu.usage", DataType::Float64).full_name());
    }

    #[test]
    fn index_of_prefers_full_name() {
        let schema = Schema::with_key([
            Field::with_tags("s", DataType::Int64, tags(&[("t", "1")])),
            Field::with_tags("s", DataType::Int64, tags(&[("t", "2")])),
        ]);
        assert_eq!(Some(1), schema.index_of("s{t=2}"));
        assert_eq!(Some(0), schema.index_of("s"));
        assert_eq!(None, schema.index_of("x"));
    }

    #[test]
    fn missing_column_suggests() {
        let schema = Schema::new([Field::new("us.d1.s1", DataType::Int64)]);
        let err = schema
            .require_index("us.d1.s2", || DbError::invalid_parameter("missing"))
            .unwrap_err();
        assert_eq!("missing", err.message());
        assert_eq!(Some("us.d1.s1"), err.field("did_you_mean"));

        let err = schema
            .require_index("zzz", || DbError::invalid_parameter("missing"))
            .unwrap_err();
        assert_eq!(None, err.field("did_you_mean"));
    }

    #[test]
    fn indices_matching_pattern() {
        let schema = Schema::new([
            Field::new("a.x", DataType::Int64),
            Field::new("b.x", DataType::Int64),
            Field::new("a.y", DataType::Int64),
        ]);
        let p = PathPattern::new("a.*").unwrap();
        assert_eq!(vec![0, 2], schema.indices_matching(&p));
    }
}
