//! SQL dialects: identifier quoting, literal escaping and the few syntax
//! differences the compilers need to know about.

use crate::ident::{Ident, IdentPart};
use crate::value::{DATE_FORMAT, TIMESTAMP_FORMAT, Value};
use std::fmt::Write as _;

/// Quoting and feature rules of a database product.
///
/// Dialects are stateless and object safe; compilers take `&dyn Dialect`.
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Short product name (`"postgres"`, `"sqlite"`).
    fn name(&self) -> &'static str;

    /// Quote a single identifier part, escaping embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 2);
        out.push('"');
        for ch in name.chars() {
            if ch == '"' {
                out.push_str("\"\"");
            } else {
                out.push(ch);
            }
        }
        out.push('"');
        out
    }

    /// Reverse of [`Dialect::quote_identifier`]; `None` if `quoted` is not a
    /// well-formed quoted identifier.
    fn unquote_identifier(&self, quoted: &str) -> Option<String> {
        let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '"' {
                if chars.next() != Some('"') {
                    return None;
                }
            }
            out.push(ch);
        }
        Some(out)
    }

    /// Quote every part of a (possibly dotted) identifier.
    fn quote_ident(&self, ident: &Ident) -> String {
        let mut out = String::new();
        for (i, part) in ident.parts().iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Name(name) => out.push_str(&self.quote_identifier(name)),
                IdentPart::Star => out.push('*'),
            }
        }
        out
    }

    /// Render a literal value as escaped SQL text.
    fn quote_literal(&self, value: &Value) -> String;

    /// Native positional placeholder for the `index`-th (1-based) bound parameter.
    fn placeholder(&self, index: usize) -> String;

    /// Append ` LIMIT n` / ` OFFSET n`, always in that order.
    fn write_limit_offset(&self, out: &mut String, limit: Option<u64>, offset: Option<u64>) {
        if let Some(limit) = limit {
            let _ = write!(out, " LIMIT {limit}");
        }
        if let Some(offset) = offset {
            let _ = write!(out, " OFFSET {offset}");
        }
    }

    /// Hidden per-row column usable to emulate `UPDATE/DELETE ... ORDER BY ... LIMIT`.
    fn row_locator(&self) -> Option<&'static str> {
        None
    }

    /// Whether members of a `UNION` may be wrapped in parentheses.
    fn parenthesize_compound(&self) -> bool {
        true
    }

    /// Whether `ILIKE` exists; otherwise it is rendered as `LIKE`.
    fn supports_ilike(&self) -> bool {
        false
    }
}

/// `'...'` with embedded quotes doubled.
pub(crate) fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn finite_float(f: f64) -> String {
    let s = f.to_string();
    // Keep a decimal point so the literal stays a float on both engines.
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{s}.0")
    }
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Postgres;

impl Postgres {
    fn quote_text(s: &str) -> String {
        if !s.contains('\\') {
            return quote_string(s);
        }
        // E'' form so the literal means the same with or without
        // standard_conforming_strings.
        let mut out = String::with_capacity(s.len() + 4);
        out.push_str("E'");
        for ch in s.chars() {
            match ch {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                c => out.push(c),
            }
        }
        out.push('\'');
        out
    }
}

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_nan() => "'NaN'::float8".to_string(),
            Value::Float(f) if f.is_infinite() => {
                if f.is_sign_positive() {
                    "'Infinity'::float8".to_string()
                } else {
                    "'-Infinity'::float8".to_string()
                }
            }
            Value::Float(f) => finite_float(*f),
            Value::Text(s) => Self::quote_text(s),
            Value::Bytes(b) => format!("'\\x{}'::bytea", hex(b)),
            Value::Json(j) => format!("{}::jsonb", Self::quote_text(&j.to_string())),
            Value::Uuid(u) => format!("'{u}'::uuid"),
            Value::Timestamp(t) => format!("'{}'::timestamp", t.format(TIMESTAMP_FORMAT)),
            Value::Date(d) => format!("'{}'::date", d.format(DATE_FORMAT)),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn row_locator(&self) -> Option<&'static str> {
        Some("ctid")
    }

    fn supports_ilike(&self) -> bool {
        true
    }
}

/// SQLite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_nan() => "NULL".to_string(),
            Value::Float(f) if f.is_infinite() => {
                (if f.is_sign_positive() { "9e999" } else { "-9e999" }).to_string()
            }
            Value::Float(f) => finite_float(*f),
            Value::Text(s) => quote_string(s),
            Value::Bytes(b) => format!("X'{}'", hex(b)),
            Value::Json(j) => quote_string(&j.to_string()),
            Value::Uuid(u) => format!("'{u}'"),
            Value::Timestamp(t) => format!("'{}'", t.format(TIMESTAMP_FORMAT)),
            Value::Date(d) => format!("'{}'", d.format(DATE_FORMAT)),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{index}")
    }

    fn write_limit_offset(&self, out: &mut String, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (None, Some(offset)) => {
                let _ = write!(out, " LIMIT -1 OFFSET {offset}");
            }
            (limit, offset) => {
                if let Some(limit) = limit {
                    let _ = write!(out, " LIMIT {limit}");
                }
                if let Some(offset) = offset {
                    let _ = write!(out, " OFFSET {offset}");
                }
            }
        }
    }

    fn row_locator(&self) -> Option<&'static str> {
        Some("rowid")
    }

    fn parenthesize_compound(&self) -> bool {
        false
    }
}
