//! SQL identifier handling.
//!
//! [`Ident`] represents a (possibly dotted) schema/table/column reference. Parts are
//! kept unescaped; quoting is the job of the [`Dialect`](crate::Dialect), which always
//! quotes every part, so identifiers are case-sensitive as written.
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL and escape `"` as `""`
//! - A trailing `*` part selects all columns (`users.*`)
//!
//! # Example
//! ```ignore
//! use qforge::Ident;
//!
//! let t = Ident::parse("public.users")?;
//! let c = Ident::parse(r#""Camel.Case"."UserTable""#)?;
//! # Ok::<(), qforge::DbError>(())
//! ```

use crate::error::{DbError, DbResult};

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentPart {
    /// Plain name; was either unquoted in the input or quoted with `"..."`.
    Name(String),
    /// `*`
    Star,
}

/// A SQL identifier (column, table, or schema name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    parts: Vec<IdentPart>,
}

impl Ident {
    /// Create a single-part identifier taken verbatim (any character except NUL).
    pub fn name(name: &str) -> DbResult<Self> {
        if name.is_empty() {
            return Err(DbError::usage("Empty identifier"));
        }
        if name.contains('\0') {
            return Err(DbError::usage("Identifier cannot contain NUL character"));
        }
        Ok(Self {
            parts: vec![IdentPart::Name(name.to_string())],
        })
    }

    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table.column`
    /// - Quoted: `"CamelCase"."UserTable"`
    /// - Mixed: `public."UserTable".id`
    /// - Wildcard: `*`, `users.*`
    pub fn parse(s: &str) -> DbResult<Self> {
        if s.is_empty() {
            return Err(DbError::usage("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(DbError::usage("Identifier cannot contain NUL character"));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        while chars.peek().is_some() {
            if matches!(parts.last(), Some(IdentPart::Star)) {
                return Err(DbError::usage(format!(
                    "'*' must be the last identifier part in '{s}'"
                )));
            }

            // Consume '.' between parts (but require there is a next part).
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') => {
                        if chars.peek().is_none() {
                            return Err(DbError::usage("Trailing '.' in identifier"));
                        }
                    }
                    Some(c) => {
                        return Err(DbError::usage(format!(
                            "Expected '.' between identifier parts, got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'*') {
                chars.next();
                parts.push(IdentPart::Star);
                continue;
            }

            // Quoted identifier part.
            if chars.peek() == Some(&'"') {
                chars.next(); // opening quote
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            // Escaped quote: ""
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                name.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(c) => name.push(c),
                        None => return Err(DbError::usage("Unclosed quoted identifier")),
                    }
                }
                if name.is_empty() {
                    return Err(DbError::usage("Empty quoted identifier"));
                }
                parts.push(IdentPart::Name(name));
                continue;
            }

            // Unquoted identifier part.
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let valid = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !valid {
                    return Err(DbError::usage(format!(
                        "Invalid character '{c}' in identifier '{s}' (use expr() for raw SQL)"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(DbError::usage("Empty identifier segment"));
            }
            parts.push(IdentPart::Name(name));
        }

        if parts.is_empty() {
            return Err(DbError::usage("Empty identifier"));
        }

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[IdentPart] {
        &self.parts
    }

    /// The last non-wildcard part (the bare column or table name).
    pub fn base_name(&self) -> Option<&str> {
        self.parts.iter().rev().find_map(|p| match p {
            IdentPart::Name(n) => Some(n.as_str()),
            IdentPart::Star => None,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.parts.last(), Some(IdentPart::Star))
    }
}

/// Convert an input into an [`Ident`].
///
/// This is mainly for ergonomics in builder APIs.
pub trait IntoIdent {
    fn into_ident(self) -> DbResult<Ident>;
}

impl IntoIdent for Ident {
    fn into_ident(self) -> DbResult<Ident> {
        Ok(self)
    }
}

impl IntoIdent for &Ident {
    fn into_ident(self) -> DbResult<Ident> {
        Ok(self.clone())
    }
}

impl IntoIdent for &str {
    fn into_ident(self) -> DbResult<Ident> {
        Ident::parse(self)
    }
}

impl IntoIdent for String {
    fn into_ident(self) -> DbResult<Ident> {
        Ident::parse(&self)
    }
}

impl IntoIdent for &String {
    fn into_ident(self) -> DbResult<Ident> {
        Ident::parse(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ident: &Ident) -> Vec<&str> {
        ident
            .parts()
            .iter()
            .map(|p| match p {
                IdentPart::Name(n) => n.as_str(),
                IdentPart::Star => "*",
            })
            .collect()
    }

    #[test]
    fn ident_simple() {
        let ident = Ident::parse("users").unwrap();
        assert_eq!(names(&ident), ["users"]);
    }

    #[test]
    fn ident_three_parts() {
        let ident = Ident::parse("schema.table.column").unwrap();
        assert_eq!(names(&ident), ["schema", "table", "column"]);
        assert_eq!(ident.base_name(), Some("column"));
    }

    #[test]
    fn ident_quoted_with_escape_and_dot() {
        let ident = Ident::parse(r#""has""quote"."a.b""#).unwrap();
        assert_eq!(names(&ident), [r#"has"quote"#, "a.b"]);
    }

    #[test]
    fn ident_wildcards() {
        assert!(Ident::parse("*").unwrap().is_wildcard());
        let ident = Ident::parse("users.*").unwrap();
        assert!(ident.is_wildcard());
        assert_eq!(ident.base_name(), Some("users"));
        assert!(Ident::parse("*.id").is_err());
    }

    #[test]
    fn ident_with_dollar() {
        assert!(Ident::parse("my_var$1").is_ok());
    }

    #[test]
    fn ident_rejects_raw_sql() {
        assert!(Ident::parse("").is_err());
        assert!(Ident::parse("1table").is_err());
        assert!(Ident::parse("my table").is_err());
        assert!(Ident::parse("COUNT(*)").is_err());
        assert!(Ident::parse("schema..table").is_err());
        assert!(Ident::parse("schema.").is_err());
        assert!(Ident::parse(r#""unclosed"#).is_err());
    }

    #[test]
    fn verbatim_name_accepts_anything_but_nul() {
        let ident = Ident::name("we.ird \"name\"").unwrap();
        assert_eq!(names(&ident), ["we.ird \"name\""]);
        assert!(Ident::name("a\0b").is_err());
    }
}
