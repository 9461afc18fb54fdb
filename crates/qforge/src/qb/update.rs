//! UPDATE statement builder.

use crate::adapter::QueryKind;
use crate::condition::{ColumnRef, IntoColumn, Operand};
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

#[derive(Debug, Clone, PartialEq)]
enum Assignment {
    Value(Operand),
    /// `"col" + n` (or `- n` when negative).
    Add(i64),
}

/// UPDATE builder. Assignments render in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateQb {
    table: Option<Ident>,
    sets: Vec<(Ident, Assignment)>,
    where_tree: ConditionTree,
    order_by: Vec<OrderTerm>,
    limit: Option<u64>,
    returning: Vec<ColumnRef>,
    params: Params,
    build_error: Option<String>,
}

impl UpdateQb {
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

    fn assign(mut self, column: impl IntoIdent, assignment: Assignment) -> Self {
        match column.into_ident() {
            Ok(column) => self.sets.push((column, assignment)),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// `SET "column" = value`.
    pub fn set(self, column: impl IntoIdent, value: impl Into<Operand>) -> Self {
        self.assign(column, Assignment::Value(value.into()))
    }

    /// Alias of [`UpdateQb::set`].
    pub fn value(self, column: impl IntoIdent, value: impl Into<Operand>) -> Self {
        self.set(column, value)
    }

    pub fn set_many<C, V>(mut self, pairs: impl IntoIterator<Item = (C, V)>) -> Self
    where
        C: IntoIdent,
        V: Into<Operand>,
    {
        for (column, value) in pairs {
            self = self.set(column, value);
        }
        self
    }

    /// `SET "column" = "column" + n`.
    pub fn increment(self, column: impl IntoIdent, n: i64) -> Self {
        self.assign(column, Assignment::Add(n))
    }

    /// `SET "column" = "column" - n`.
    pub fn decrement(mut self, column: impl IntoIdent, n: i64) -> Self {
        match n.checked_neg() {
            Some(neg) => self.assign(column, Assignment::Add(neg)),
            None => {
                self.record_error(DbError::usage("decrement out of range"));
                self
            }
        }
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
            .ok_or_else(|| DbError::usage("UPDATE needs a table"))?;
        if self.sets.is_empty() {
            return Err(DbError::usage("UPDATE needs at least one SET"));
        }

        let table = dialect.quote_ident(table);
        let sets = self
            .sets
            .iter()
            .map(|(column, assignment)| {
                let column = dialect.quote_ident(column);
                Ok(match assignment {
                    Assignment::Value(value) => format!("{column} = {}", value.render(dialect)?),
                    Assignment::Add(n) if *n < 0 => {
                        format!("{column} = {column} - {}", n.unsigned_abs())
                    }
                    Assignment::Add(n) => format!("{column} = {column} + {n}"),
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        let mut sql = format!("UPDATE {table} SET {}", sets.join(", "));
        let where_sql = self.where_tree.compile(dialect)?;
        write_row_filter(&mut sql, &table, &where_sql, &self.order_by, self.limit, dialect);
        write_returning(&mut sql, &self.returning, dialect);
        Ok(sql)
    }
}

impl SqlQb for UpdateQb {
    fn kind(&self) -> QueryKind {
        QueryKind::Update
    }

    fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        UpdateQb::compile(self, dialect)
    }

    fn params(&self) -> Params {
        let mut params = self.params.clone();
        for (_, assignment) in &self.sets {
            if let Assignment::Value(value) = assignment {
                value.collect_params(&mut params);
            }
        }
        self.where_tree.collect_params(&mut params);
        params
    }

    fn build_error(&self) -> Option<&str> {
        self.build_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use crate::dialect::{Postgres, Sqlite};
    use crate::qb;
    use crate::sql::expr;

    #[test]
    fn sets_in_call_order() {
        let sql = qb::update("users")
            .set("name", "Ann")
            .value("active", true)
            .set("seen_at", expr("NOW()"))
            .eq("id", 5)
            .compile(&Postgres)
            .unwrap();
        assert_eq!(
            sql,
            r#"UPDATE "users" SET "name" = 'Ann', "active" = TRUE, "seen_at" = NOW() WHERE "id" = 5"#
        );
    }

    #[test]
    fn counters() {
        let sql = qb::update("stats")
            .increment("hits", 1)
            .decrement("credits", 3)
            .compile(&Sqlite)
            .unwrap();
        assert_eq!(
            sql,
            r#"UPDATE "stats" SET "hits" = "hits" + 1, "credits" = "credits" - 3"#
        );
    }

    #[test]
    fn ordered_limit_goes_through_locator() {
        let sql = qb::update("jobs")
            .set("state", "taken")
            .eq("state", "queued")
            .order_by("id", "asc")
            .limit(1)
            .returning(["id"])
            .compile(&Sqlite)
            .unwrap();
        assert_eq!(
            sql,
            r#"UPDATE "jobs" SET "state" = 'taken' WHERE rowid IN (SELECT rowid FROM "jobs" WHERE "state" = 'queued' ORDER BY "id" ASC LIMIT 1) RETURNING "id""#
        );
    }

    #[test]
    fn reset_chains_for_reuse() {
        let mut qb = qb::update("stats").increment("hits", 1);
        qb.reset().clone_from(&qb::update("other").set("a", 1));
        assert_eq!(qb.compile(&Postgres).unwrap(), r#"UPDATE "other" SET "a" = 1"#);
    }

    #[test]
    fn needs_table_and_sets() {
        assert!(qb::update("t").compile(&Postgres).unwrap_err().is_usage());
        assert!(
            qb::UpdateQb::new()
                .set("a", 1)
                .compile(&Postgres)
                .unwrap_err()
                .is_usage()
        );
    }
}
