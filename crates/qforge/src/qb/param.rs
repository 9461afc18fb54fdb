//! Named parameters and placeholder rewriting.
//!
//! Statements carry named placeholders (`:name`). At execution time they are
//! rewritten to the dialect's native positional placeholders and the values are
//! bound by the driver; [`Query::compile`](crate::Query::compile) instead inlines
//! escaped literals for logging or fire-and-forget execution.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// Handle returned by `bind()`; pass it to `set()` to supply the value later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindHandle {
    name: String,
}

impl BindHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Placeholder name → value. A bound-but-unset entry holds `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, Option<Value>>,
}

fn normalize(name: &str) -> String {
    name.strip_prefix(':').unwrap_or(name).to_string()
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set `name` (with or without the leading `:`) to `value`.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(normalize(name), Some(value.into()));
    }

    /// Declare `name` without a value yet.
    pub fn bind(&mut self, name: &str) -> BindHandle {
        let name = normalize(name);
        self.values.entry(name.clone()).or_insert(None);
        BindHandle { name }
    }

    /// Supply the value for a handle obtained from [`Params::bind`].
    pub fn set(&mut self, handle: &BindHandle, value: impl Into<Value>) {
        self.values.insert(handle.name.clone(), Some(value.into()));
    }

    /// The value for `name`, if set.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name.strip_prefix(':').unwrap_or(name))?.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name.strip_prefix(':').unwrap_or(name))
    }

    /// Copy entries from `other` that are not already present.
    pub fn merge_missing(&mut self, other: &Params) {
        for (name, value) in &other.values {
            self.values
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Inline set parameters as escaped literals; unknown or unset names are left as-is.
    pub fn substitute(&self, sql: &str, dialect: &dyn Dialect) -> String {
        if self.values.is_empty() {
            return sql.to_string();
        }
        rewrite_placeholders(sql, |name| {
            Ok(self.get(name).map(|v| dialect.quote_literal(v)))
        })
        .unwrap_or_else(|_| sql.to_string())
    }

    /// Rewrite `:name` placeholders into native positional ones and collect the
    /// values in bind order.
    pub fn to_positional(&self, sql: &str, dialect: &dyn Dialect) -> DbResult<(String, Vec<Value>)> {
        let mut bound = Vec::new();
        let rewritten = rewrite_placeholders(sql, |name| match self.values.get(name) {
            Some(Some(value)) => {
                bound.push(value.clone());
                Ok(Some(dialect.placeholder(bound.len())))
            }
            Some(None) => Err(DbError::usage(format!(
                "parameter :{name} was bound but never set"
            ))),
            None => Err(DbError::usage(format!("parameter :{name} has no value"))),
        })?;
        Ok((rewritten, bound))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

/// Walk `sql`, calling `f` for every `:name` placeholder outside string literals,
/// quoted identifiers, comments and `::` casts. `Some(text)` replaces the
/// placeholder, `None` keeps it.
pub(crate) fn rewrite_placeholders(
    sql: &str,
    mut f: impl FnMut(&str) -> DbResult<Option<String>>,
) -> DbResult<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                // E'..' strings treat backslash as an escape character.
                let escapes = i > 0
                    && matches!(chars[i - 1], 'E' | 'e')
                    && (i < 2 || !is_ident_char(chars[i - 2]));
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if escapes && ch == '\\' && i < chars.len() {
                        out.push(chars[i]);
                        i += 1;
                    } else if ch == '\'' {
                        if chars.get(i) == Some(&'\'') {
                            out.push('\'');
                            i += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            '"' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == '"' {
                        break;
                    }
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                out.push_str("/*");
                i += 2;
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        out.push_str("*/");
                        i += 2;
                        break;
                    }
                    out.push(chars[i]);
                    i += 1;
                }
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).is_some_and(|&n| is_ident_start(n)) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match f(&name)? {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        out.push(':');
                        out.push_str(&name);
                    }
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, Sqlite};

    #[test]
    fn positional_rewrite_in_bind_order() {
        let mut params = Params::new();
        params.insert(":id", 5);
        params.insert("name", "x");
        let (sql, values) = params
            .to_positional("SELECT * FROM t WHERE id = :id AND name = :name OR id = :id", &Postgres)
            .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE id = $1 AND name = $2 OR id = $3");
        assert_eq!(values, vec![Value::Int(5), Value::Text("x".into()), Value::Int(5)]);

        let (sql, _) = params.to_positional("SELECT :id", &Sqlite).unwrap();
        assert_eq!(sql, "SELECT ?1");
    }

    #[test]
    fn literals_comments_and_casts_are_skipped() {
        let mut params = Params::new();
        params.insert("id", 1);
        let sql = "SELECT ':id', \":id\", x::int, E'\\':id' -- :id\n, /* :id */ :id";
        let (out, values) = params.to_positional(sql, &Postgres).unwrap();
        assert_eq!(out, "SELECT ':id', \":id\", x::int, E'\\':id' -- :id\n, /* :id */ $1");
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn missing_and_unset_are_usage_errors() {
        let mut params = Params::new();
        let err = params.to_positional("SELECT :a", &Postgres).unwrap_err();
        assert!(err.is_usage());

        let handle = params.bind(":a");
        let err = params.to_positional("SELECT :a", &Postgres).unwrap_err();
        assert!(err.to_string().contains("never set"));

        params.set(&handle, 3);
        let (_, values) = params.to_positional("SELECT :a", &Postgres).unwrap();
        assert_eq!(values, vec![Value::Int(3)]);
    }

    #[test]
    fn substitute_inlines_escaped_literals() {
        let mut params = Params::new();
        params.insert("name", "O'Brien");
        let sql = params.substitute("SELECT * FROM t WHERE name = :name AND x = :other", &Sqlite);
        assert_eq!(sql, "SELECT * FROM t WHERE name = 'O''Brien' AND x = :other");
    }

    #[test]
    fn merge_keeps_existing() {
        let mut a = Params::new();
        a.insert("x", 1);
        let mut b = Params::new();
        b.insert("x", 2);
        b.insert("y", 3);
        a.merge_missing(&b);
        assert_eq!(a.get("x"), Some(&Value::Int(1)));
        assert_eq!(a.get(":y"), Some(&Value::Int(3)));
    }
}
