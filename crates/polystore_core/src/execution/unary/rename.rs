use std::collections::BTreeMap;

use hashbrown::HashSet;
use polystore_error::{DbError, Result};

use crate::execution::plan::RenameParams;
use crate::pattern::{PathPattern, compile_patterns};
use crate::row::Row;
use crate::schema::{Field, KEY, Schema};
use crate::table::Table;

/// Rename fields.
///
/// Each field takes the first rename that applies to it:
///
/// - `*` to `p.*` prefixes every field with `p.`.
/// - `old.*` to `new.*` replaces the prefix.
/// - An exact name renames that field, plus any directly following fields
///   of the same name with other tags. Renaming to `key` promotes the column
///   to the row key instead.
/// - A glob renames every matching field. If the new name ends with
///   `.{glob}` the new name's prefix is prepended instead.
///
/// Fields matching an ignore pattern are left as is.
pub fn rename(params: &RenameParams, table: Table) -> Result<Table> {
    let (schema, key_column) = renamed_schema(params, &table.schema)?;
    let Some(key_column) = key_column else {
        return Ok(Table::new(schema, table.rows));
    };

    let key_name = table.schema.fields[key_column].name.clone();
    let mut seen = HashSet::with_capacity(table.rows.len());
    let mut rows = Vec::with_capacity(table.rows.len());
    for mut row in table.rows {
        let value = row.values.remove(key_column);
        let key = value
            .as_ref()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                DbError::invalid_parameter(format!(
                    "column {key_name} can't be used as key, found value: {}",
                    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
                ))
            })?;
        if !seen.insert(key) {
            return Err(DbError::new(format!("duplicated key found: {key}")));
        }
        rows.push(Row {
            key: Some(key),
            values: row.values,
        });
    }

    Ok(Table::new(schema, rows))
}

enum Alias {
    Keep,
    /// Renamed by an exact name, extending to following tag variants.
    Exact(String),
    Renamed(String),
    Key,
}

struct Rule {
    old: String,
    new: String,
    glob: PathPattern,
}

impl Rule {
    fn apply(&self, name: &str) -> Option<Alias> {
        if let ("*", Some(prefix)) = (self.old.as_str(), self.new.strip_suffix('*')) {
            return Some(Alias::Renamed(format!("{prefix}{name}")));
        }
        if let (Some(old_prefix), Some(new_prefix)) =
            (self.old.strip_suffix('*'), self.new.strip_suffix('*'))
        {
            if old_prefix.ends_with('.') && new_prefix.ends_with('.') {
                let rest = name.strip_prefix(old_prefix)?;
                return Some(Alias::Renamed(format!("{new_prefix}{rest}")));
            }
        }
        if self.old == name {
            if self.new == KEY {
                return Some(Alias::Key);
            }
            return Some(Alias::Exact(self.new.clone()));
        }
        if self.glob.is_glob() && self.glob.matches(name) {
            let renamed = match self.new.strip_suffix(&format!(".{}", self.old)) {
                Some(prefix) => format!("{prefix}.{name}"),
                None => self.new.clone(),
            };
            return Some(Alias::Renamed(renamed));
        }
        None
    }
}

fn renamed_schema(params: &RenameParams, schema: &Schema) -> Result<(Schema, Option<usize>)> {
    let ignore = compile_patterns(&params.ignore_patterns)?;
    let rules = params
        .renames
        .iter()
        .map(|(old, new)| {
            Ok(Rule {
                old: old.clone(),
                new: new.clone(),
                glob: PathPattern::new(old)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    // Exact renames apply to a single run of fields.
    let mut used = vec![false; rules.len()];

    let fields = &schema.fields;
    let mut out: Vec<Field> = Vec::with_capacity(fields.len());
    let mut key_column = None;

    let mut idx = 0;
    while idx < fields.len() {
        let field = &fields[idx];
        if ignore.iter().any(|p| p.matches(&field.name)) {
            out.push(field.clone());
            idx += 1;
            continue;
        }

        let mut alias = Alias::Keep;
        for (rule_idx, rule) in rules.iter().enumerate() {
            if used[rule_idx] {
                continue;
            }
            if let Some(found) = rule.apply(&field.name) {
                if matches!(found, Alias::Exact(_) | Alias::Key) {
                    used[rule_idx] = true;
                }
                alias = found;
                break;
            }
        }

        match alias {
            Alias::Keep => out.push(field.clone()),
            Alias::Renamed(name) => out.push(field.renamed(name)),
            Alias::Key => {
                if key_column.is_some() {
                    return Err(DbError::invalid_parameter(
                        "only one column can transform to key in each select",
                    ));
                }
                key_column = Some(idx);
            }
            Alias::Exact(name) => {
                let mut tags: Vec<&BTreeMap<String, String>> = vec![&field.tags];
                out.push(field.renamed(name.clone()));
                while let Some(next) = fields.get(idx + 1) {
                    if next.name != field.name || tags.contains(&&next.tags) {
                        break;
                    }
                    tags.push(&next.tags);
                    out.push(next.renamed(name.clone()));
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    let has_key = schema.has_key || key_column.is_some();
    Ok((
        Schema {
            fields: out,
            has_key,
        },
        key_column,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::generate_table;

    fn params(renames: &[(&str, &str)]) -> RenameParams {
        RenameParams {
            renames: renames
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            ignore_patterns: Vec::new(),
        }
    }

    fn names(table: &Table) -> Vec<String> {
        table.schema.fields.iter().map(|f| f.full_name()).collect()
    }

    #[test]
    fn prefix_rewrites() {
        let table = generate_table!(
            fields: [("a.x", DataType::Int64), ("b.y", DataType::Int64)],
            rows: []
        );
        let out = rename(&params(&[("a.*", "c.*")]), table.clone()).unwrap();
        assert_eq!(vec!["c.x", "b.y"], names(&out));

        let out = rename(&params(&[("*", "t.*")]), table).unwrap();
        assert_eq!(vec!["t.a.x", "t.b.y"], names(&out));
    }

    #[test]
    fn exact_rename_covers_tag_variants() {
        let tags = |v: &str| BTreeMap::from([("t".to_string(), v.to_string())]);
        let table = Table::new(
            Schema::new([
                Field::with_tags("s", DataType::Int64, tags("1")),
                Field::with_tags("s", DataType::Int64, tags("2")),
                Field::new("other", DataType::Int64),
            ]),
            Vec::new(),
        );
        let out = rename(&params(&[("s", "r")]), table).unwrap();
        assert_eq!(vec!["r{t=1}", "r{t=2}", "other"], names(&out));
    }

    #[test]
    fn glob_rename_with_prefix() {
        let table = generate_table!(
            fields: [("cpu.a", DataType::Int64), ("mem.b", DataType::Int64)],
            rows: []
        );
        let out = rename(&params(&[("cpu*", "t.cpu*")]), table).unwrap();
        assert_eq!(vec!["t.cpu.a", "mem.b"], names(&out));
    }

    #[test]
    fn ignore_patterns() {
        let table = generate_table!(
            fields: [("a.x", DataType::Int64), ("a.y", DataType::Int64)],
            rows: []
        );
        let mut p = params(&[("a.*", "b.*")]);
        p.ignore_patterns = vec!["a.y".to_string()];
        let out = rename(&p, table).unwrap();
        assert_eq!(vec!["b.x", "a.y"], names(&out));
    }

    #[test]
    fn promote_to_key() {
        let table = generate_table!(
            fields: [("id", DataType::Int64), ("v", DataType::Binary)],
            rows: [[3_i64, "x"], [1_i64, "y"]]
        );
        let out = rename(&params(&[("id", "key")]), table).unwrap();
        assert!(out.schema.has_key);
        assert_eq!(vec!["v"], names(&out));
        assert_eq!(Some(3), out.rows[0].key);
        assert_eq!(1, out.rows[0].values.len());
    }

    #[test]
    fn promote_duplicate_key() {
        let table = generate_table!(
            fields: [("id", DataType::Int64)],
            rows: [[3_i64], [3_i64]]
        );
        let err = rename(&params(&[("id", "key")]), table).unwrap_err();
        assert_eq!("duplicated key found: 3", err.message());
    }

    #[test]
    fn promote_two_columns() {
        let table = generate_table!(
            fields: [("a", DataType::Int64), ("b", DataType::Int64)],
            rows: []
        );
        let err = rename(&params(&[("a", "key"), ("b", "key")]), table).unwrap_err();
        assert_eq!(
            "only one column can transform to key in each select",
            err.message()
        );
    }
}
