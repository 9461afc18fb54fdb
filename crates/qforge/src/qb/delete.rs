//! DELETE statement builder.

use crate::adapter::QueryKind;
use crate::condition::{ColumnRef, IntoColumn};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::{Ident, IntoIdent};
use crate::qb::error_message;
use crate::qb::expr::{ConditionTree, comparison_shorthands, condition_methods};
use crate::qb::insert::write_returning;
use crate::qb::order::{IntoSortOrder, OrderTerm, write_row_filter};
use crate::qb::param::Params;
use crate::qb::traits::SqlQb;
use crate::value::Value;

/// DELETE builder.
///
/// A DELETE without conditions removes every row; nothing guards against that.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteQb {
    table: Option<Ident>,
    where_tree: ConditionTree,
    order_by: Vec<OrderTerm>,
    limit: Option<u64>,
    returning: Vec<ColumnRef>,
    params: Params,
    build_error: Option<String>,
}

impl DeleteQb {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_error(&mut self, err: DbError) {
        if self.build_error.is_none() {
            self.build_error = Some(error_message(err));
        }
    }

    pub fn table(mut self, table: impl IntoIdent) -> Self {
        match table.into_ident() {
            Ok(table) => self.table = Some(table),
            Err(err) => self.record_error(err),
        }
        self
    }

    condition_methods!(
        where_tree,
        where_, and_where, or_where,
        where_open, and_where_open, or_where_open,
        where_close, and_where_close, or_where_close,
    );

    comparison_shorthands!(and_where);

    pub fn order_by(mut self, column: impl IntoColumn, direction: impl IntoSortOrder) -> Self {
        match OrderTerm::new(column, direction) {
            Ok(term) => self.order_by.push(term),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

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
            .ok_or_else(|| DbError::usage("DELETE needs a table"))?;

        let table = dialect.quote_ident(table);
        let mut sql = format!("DELETE FROM {table}");
        let where_sql = self.where_tree.compile(dialect)?;
        write_row_filter(&mut sql, &table, &where_sql, &self.order_by, self.limit, dialect);
        write_returning(&mut sql, &self.returning, dialect);
        Ok(sql)
    }
}

impl SqlQb for DeleteQb {
    fn kind(&self) -> QueryKind {
        QueryKind::Delete
    }

    fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        DeleteQb::compile(self, dialect)
    }

    fn params(&self) -> Params {
        let mut params = self.params.clone();
        self.where_tree.collect_params(&mut params);
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

    #[test]
    fn filtered_delete() {
        let sql = qb::delete("sessions")
            .lt("expires_at", Operand::param("now"))
            .or_where("user_id", "IN", vec![1, 2])
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            sql,
            r#"DELETE FROM "sessions" WHERE "expires_at" < :now OR "user_id" IN (1, 2)"#
        );
    }

    #[test]
    fn ordered_limit_and_returning() {
        let sql = qb::delete("logs")
            .order_by("created_at", "DESC")
            .limit(100)
            .returning(["id"])
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            sql,
            r#"DELETE FROM "logs" WHERE ctid IN (SELECT ctid FROM "logs" ORDER BY "created_at" DESC LIMIT 100) RETURNING "id""#
        );
    }

    #[test]
    fn unfiltered_and_missing_table() {
        assert_eq!(
            qb::delete("t").compile(&Sqlite).unwrap(),
            r#"DELETE FROM "t""#
        );
        assert!(qb::DeleteQb::new().compile(&Sqlite).unwrap_err().is_usage());
    }
}
