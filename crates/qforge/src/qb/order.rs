//! ORDER BY terms shared by SELECT, UPDATE and DELETE.

use crate::condition::{ColumnRef, IntoColumn};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use std::fmt::Write as _;
use std::str::FromStr;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            d if d.eq_ignore_ascii_case("asc") => Ok(SortOrder::Asc),
            d if d.eq_ignore_ascii_case("desc") => Ok(SortOrder::Desc),
            other => Err(DbError::usage(format!("Invalid ORDER BY direction '{other}'"))),
        }
    }
}

/// Accepted by `order_by`: a [`SortOrder`] or `"asc"` / `"desc"` in any case.
pub trait IntoSortOrder {
    fn into_sort_order(self) -> DbResult<SortOrder>;
}

impl IntoSortOrder for SortOrder {
    fn into_sort_order(self) -> DbResult<SortOrder> {
        Ok(self)
    }
}

impl IntoSortOrder for &str {
    fn into_sort_order(self) -> DbResult<SortOrder> {
        self.parse()
    }
}

impl IntoSortOrder for String {
    fn into_sort_order(self) -> DbResult<SortOrder> {
        self.parse()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderTerm {
    column: ColumnRef,
    order: SortOrder,
}

impl OrderTerm {
    pub(crate) fn new(column: impl IntoColumn, order: impl IntoSortOrder) -> DbResult<Self> {
        Ok(Self {
            column: column.into_column()?,
            order: order.into_sort_order()?,
        })
    }
}

/// ` ORDER BY "a" ASC, "b" DESC`, or nothing.
pub(crate) fn write_order_by(out: &mut String, terms: &[OrderTerm], dialect: &dyn Dialect) {
    if terms.is_empty() {
        return;
    }
    out.push_str(" ORDER BY ");
    let rendered: Vec<String> = terms
        .iter()
        .map(|t| format!("{} {}", t.column.render(dialect), t.order.keyword()))
        .collect();
    out.push_str(&rendered.join(", "));
}

/// WHERE / ORDER BY / LIMIT of an UPDATE or DELETE on `table`.
///
/// With ordering or a limit, dialects that expose a row locator get
/// `WHERE <loc> IN (SELECT <loc> FROM <table> ...)`; others get the clauses as-is.
pub(crate) fn write_row_filter(
    out: &mut String,
    table: &str,
    where_sql: &str,
    order: &[OrderTerm],
    limit: Option<u64>,
    dialect: &dyn Dialect,
) {
    let mut tail = String::new();
    if !where_sql.is_empty() {
        tail.push_str(" WHERE ");
        tail.push_str(where_sql);
    }
    if order.is_empty() && limit.is_none() {
        out.push_str(&tail);
        return;
    }
    write_order_by(&mut tail, order, dialect);
    dialect.write_limit_offset(&mut tail, limit, None);

    match dialect.row_locator() {
        Some(locator) => {
            let _ = write!(
                out,
                " WHERE {locator} IN (SELECT {locator} FROM {table}{tail})"
            );
        }
        None => out.push_str(&tail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Postgres;

    #[test]
    fn direction_parsing() {
        assert_eq!("desc".into_sort_order().unwrap(), SortOrder::Desc);
        assert_eq!(" ASC ".into_sort_order().unwrap(), SortOrder::Asc);
        assert!("sideways".into_sort_order().unwrap_err().is_usage());
    }

    #[test]
    fn renders_terms() {
        let mut sql = String::new();
        write_order_by(
            &mut sql,
            &[
                OrderTerm::new("a", "asc").unwrap(),
                OrderTerm::new("t.b", SortOrder::Desc).unwrap(),
            ],
            &Postgres,
        );
        assert_eq!(sql, r#" ORDER BY "a" ASC, "t"."b" DESC"#);
    }

    #[test]
    fn row_filter_uses_locator() {
        let mut plain = String::new();
        write_row_filter(&mut plain, "\"t\"", "\"a\" = 1", &[], None, &Postgres);
        assert_eq!(plain, r#" WHERE "a" = 1"#);

        let mut limited = String::new();
        let order = [OrderTerm::new("id", "desc").unwrap()];
        write_row_filter(&mut limited, "\"t\"", "", &order, Some(5), &Postgres);
        assert_eq!(
            limited,
            r#" WHERE ctid IN (SELECT ctid FROM "t" ORDER BY "id" DESC LIMIT 5)"#
        );
    }
}
