//! INSERT statement builder.

use crate::adapter::QueryKind;
use crate::condition::{ColumnRef, IntoColumn, Operand};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::{Ident, IntoIdent};
use crate::qb::error_message;
use crate::qb::param::Params;
use crate::qb::select::SelectQb;
use crate::qb::traits::SqlQb;
use crate::value::Value;

/// INSERT builder.
///
/// Rows and a source SELECT are mutually exclusive; [`InsertQb::values`] and
/// [`InsertQb::select`] fail as soon as both would be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertQb {
    table: Option<Ident>,
    columns: Vec<Ident>,
    rows: Vec<Vec<Operand>>,
    select: Option<Box<SelectQb>>,
    returning: Vec<ColumnRef>,
    params: Params,
    build_error: Option<String>,
}

impl InsertQb {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_error(&mut self, err: DbError) {
        if self.build_error.is_none() {
            self.build_error = Some(error_message(err));
        }
    }

    /// Target table.
    pub fn table(mut self, table: impl IntoIdent) -> Self {
        match table.into_ident() {
            Ok(table) => self.table = Some(table),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Append target columns.
    pub fn columns<I: IntoIdent>(mut self, columns: impl IntoIterator<Item = I>) -> Self {
        for column in columns {
            match column.into_ident() {
                Ok(column) => self.columns.push(column),
                Err(err) => self.record_error(err),
            }
        }
        self
    }

    /// Append one row of values.
    ///
    /// With a column list the row must match its length; without one every row
    /// must match the first.
    pub fn values<V: Into<Operand>>(mut self, row: impl IntoIterator<Item = V>) -> DbResult<Self> {
        if self.select.is_some() {
            return Err(DbError::usage("INSERT cannot combine VALUES with SELECT"));
        }
        let row: Vec<Operand> = row.into_iter().map(Into::into).collect();
        let expected = match self.rows.first() {
            _ if !self.columns.is_empty() => self.columns.len(),
            Some(first) => first.len(),
            None => row.len(),
        };
        if row.is_empty() || row.len() != expected {
            return Err(DbError::usage(format!(
                "INSERT row has {} values, expected {expected}",
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(self)
    }

    /// Insert the rows produced by `sub`.
    pub fn select(mut self, sub: SelectQb) -> DbResult<Self> {
        if !self.rows.is_empty() {
            return Err(DbError::usage("INSERT cannot combine SELECT with VALUES"));
        }
        self.select = Some(Box::new(sub));
        Ok(self)
    }

    /// `RETURNING` columns.
    pub fn returning<C: IntoColumn>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        for column in columns {
            match column.into_column() {
                Ok(column) => self.returning.push(column),
                Err(err) => self.record_error(err),
            }
        }
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    pub fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        if let Some(err) = &self.build_error {
            return Err(DbError::usage(err.clone()));
        }
        let table = self
            .table
            .as_ref()
            .ok_or_else(|| DbError::usage("INSERT needs a table"))?;

        let mut sql = format!("INSERT INTO {}", dialect.quote_ident(table));
        if !self.columns.is_empty() {
            let columns: Vec<String> = self.columns.iter().map(|c| dialect.quote_ident(c)).collect();
            sql.push_str(" (");
            sql.push_str(&columns.join(", "));
            sql.push(')');
        }

        if let Some(sub) = &self.select {
            sql.push(' ');
            sql.push_str(&sub.compile(dialect)?);
        } else if !self.rows.is_empty() {
            let rows = self
                .rows
                .iter()
                .map(|row| {
                    let values = row
                        .iter()
                        .map(|v| v.render(dialect))
                        .collect::<DbResult<Vec<_>>>()?;
                    Ok(format!("({})", values.join(", ")))
                })
                .collect::<DbResult<Vec<_>>>()?;
            sql.push_str(" VALUES ");
            sql.push_str(&rows.join(", "));
        } else if self.columns.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            return Err(DbError::usage("INSERT has columns but no VALUES or SELECT"));
        }

        write_returning(&mut sql, &self.returning, dialect);
        Ok(sql)
    }
}

/// ` RETURNING "a", "b"`, or nothing.
pub(crate) fn write_returning(out: &mut String, columns: &[ColumnRef], dialect: &dyn Dialect) {
    if columns.is_empty() {
        return;
    }
    let rendered: Vec<String> = columns.iter().map(|c| c.render(dialect)).collect();
    out.push_str(" RETURNING ");
    out.push_str(&rendered.join(", "));
}

impl SqlQb for InsertQb {
    fn kind(&self) -> QueryKind {
        QueryKind::Insert
    }

    fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        InsertQb::compile(self, dialect)
    }

    fn params(&self) -> Params {
        let mut params = self.params.clone();
        for value in self.rows.iter().flatten() {
            value.collect_params(&mut params);
        }
        if let Some(sub) = &self.select {
            sub.collect_params(&mut params);
        }
        params
    }

    fn build_error(&self) -> Option<&str> {
        self.build_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use crate::condition::Operand;
    use crate::dialect::{Postgres, Sqlite};
    use crate::qb;
    use crate::sql::expr;

    #[test]
    fn value_rows_in_order() {
        let sql = qb::insert("users")
            .columns(["id", "name"])
            .values([Operand::from(1), Operand::from("a")])
            .unwrap()
            .values([Operand::from(2), Operand::from("b")])
            .unwrap()
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "users" ("id", "name") VALUES (1, 'a'), (2, 'b')"#
        );
    }

    #[test]
    fn row_length_must_match_columns() {
        let err = qb::insert("users")
            .columns(["id", "name"])
            .values([1])
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn values_and_select_exclude_each_other() {
        let sub = qb::select(["id"]).from("old_users");
        let err = qb::insert("users")
            .values([1])
            .unwrap()
            .select(sub.clone())
            .unwrap_err();
        assert!(err.is_usage());

        let err = qb::insert("users").select(sub).unwrap().values([1]).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn insert_from_select() {
        let sql = qb::insert("archive")
            .columns(["id"])
            .select(qb::select(["id"]).from("users").where_("active", "=", false))
            .unwrap()
            .compile(&Sqlite)
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "archive" ("id") SELECT "id" FROM "users" WHERE "active" = 0"#
        );
    }

    #[test]
    fn default_values_and_missing_rows() {
        let sql = qb::insert("events").compile(&Postgres).unwrap();
        assert_eq!(sql, r#"INSERT INTO "events" DEFAULT VALUES"#);

        let err = qb::insert("events").columns(["at"]).compile(&Postgres).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn returning_and_expressions() {
        let sql = qb::insert("users")
            .columns(["name", "created_at"])
            .values([Operand::from("O'Brien"), expr("NOW()").into()])
            .unwrap()
            .returning(["id"])
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            sql,
            r#"INSERT INTO "users" ("name", "created_at") VALUES ('O''Brien', NOW()) RETURNING "id""#
        );
    }
}
