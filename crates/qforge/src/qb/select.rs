//! SELECT statement builder.

use crate::adapter::{Adapter, QueryKind};
use crate::condition::{ColumnRef, IntoColumn, IntoOperator, IntoTable, TableRef};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::expr::{ConditionTree, comparison_shorthands, condition_methods};
use crate::qb::join::{JoinClause, JoinKind};
use crate::qb::order::{IntoSortOrder, OrderTerm, SortOrder, write_order_by};
use crate::qb::param::Params;
use crate::qb::traits::SqlQb;
use crate::qb::error_message;
use crate::query::{CachePolicy, Query};
use crate::result::ResultSet;
use crate::row::FromRow;
use crate::value::Value;
use std::collections::HashSet;
use std::time::Duration;

/// SELECT builder.
///
/// Mutators consume and return the builder. A mutator whose input is invalid
/// records the error and [`SelectQb::compile`] reports it; the join predicate
/// methods fail immediately instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQb {
    columns: Vec<ColumnRef>,
    distinct: bool,
    tables: Vec<TableRef>,
    joins: Vec<JoinClause>,
    where_tree: ConditionTree,
    group_by: Vec<ColumnRef>,
    having_tree: ConditionTree,
    order_by: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    unions: Vec<(SelectQb, bool)>,
    params: Params,
    cache: Option<CachePolicy>,
    build_error: Option<String>,
}

impl SelectQb {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_error(&mut self, err: DbError) {
        if self.build_error.is_none() {
            self.build_error = Some(error_message(err));
        }
    }

    // ==================== Columns / FROM ====================

    /// Append one column (`"name"`, `"t.name"`, `("name", "alias")`, `expr(..)`).
    pub fn select(mut self, column: impl IntoColumn) -> Self {
        match column.into_column() {
            Ok(column) => self.columns.push(column),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Append several columns.
    pub fn select_cols<C: IntoColumn>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        for column in columns {
            self = self.select(column);
        }
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Add a FROM source. Several sources render comma-separated.
    pub fn from(mut self, table: impl IntoTable) -> Self {
        match table.into_table() {
            Ok(table) => self.tables.push(table),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn from_as(self, table: &str, alias: &str) -> Self {
        self.from((table, alias))
    }

    /// `FROM (<sub>) AS "alias"`.
    pub fn from_subquery(self, sub: SelectQb, alias: &str) -> Self {
        self.from((sub, alias))
    }

    // ==================== JOIN ====================

    /// Start a join; follow with [`SelectQb::on`] or [`SelectQb::using`].
    pub fn join(mut self, table: impl IntoTable, kind: JoinKind) -> Self {
        match table.into_table() {
            Ok(table) => self.joins.push(JoinClause::new(table, kind)),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn inner_join(self, table: impl IntoTable) -> Self {
        self.join(table, JoinKind::Inner)
    }

    pub fn left_join(self, table: impl IntoTable) -> Self {
        self.join(table, JoinKind::Left)
    }

    pub fn right_join(self, table: impl IntoTable) -> Self {
        self.join(table, JoinKind::Right)
    }

    pub fn full_join(self, table: impl IntoTable) -> Self {
        self.join(table, JoinKind::Full)
    }

    pub fn cross_join(self, table: impl IntoTable) -> Self {
        self.join(table, JoinKind::Cross)
    }

    fn last_join(&mut self) -> DbResult<&mut JoinClause> {
        self.joins
            .last_mut()
            .ok_or_else(|| DbError::usage("ON/USING without a preceding JOIN"))
    }

    /// AND a column-to-column predicate onto the last join.
    pub fn on(
        mut self,
        left: impl IntoColumn,
        op: impl IntoOperator,
        right: impl IntoColumn,
    ) -> DbResult<Self> {
        self.last_join()?.on(left, op, right)?;
        Ok(self)
    }

    /// Join the last join on equally named columns.
    pub fn using<I: crate::ident::IntoIdent>(
        mut self,
        columns: impl IntoIterator<Item = I>,
    ) -> DbResult<Self> {
        self.last_join()?.using(columns)?;
        Ok(self)
    }

    // ==================== WHERE / GROUP BY / HAVING ====================

    condition_methods!(
        where_tree,
        where_, and_where, or_where,
        where_open, and_where_open, or_where_open,
        where_close, and_where_close, or_where_close,
    );

    comparison_shorthands!(and_where);

    pub fn group_by(mut self, column: impl IntoColumn) -> Self {
        match column.into_column() {
            Ok(column) => self.group_by.push(column),
            Err(err) => self.record_error(err),
        }
        self
    }

    condition_methods!(
        having_tree,
        having, and_having, or_having,
        having_open, and_having_open, or_having_open,
        having_close, and_having_close, or_having_close,
    );

    // ==================== ORDER BY / LIMIT ====================

    /// `direction` is a [`SortOrder`] or `"asc"`/`"desc"`.
    pub fn order_by(mut self, column: impl IntoColumn, direction: impl IntoSortOrder) -> Self {
        match OrderTerm::new(column, direction) {
            Ok(term) => self.order_by.push(term),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn order_by_asc(self, column: impl IntoColumn) -> Self {
        self.order_by(column, SortOrder::Asc)
    }

    pub fn order_by_desc(self, column: impl IntoColumn) -> Self {
        self.order_by(column, SortOrder::Desc)
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Pagination helper. `page` is 1-based; both arguments are clamped to >= 1.
    pub fn paginate(mut self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        let size = per_page.max(1);
        self.limit = Some(size);
        self.offset = Some((page - 1) * size);
        self
    }

    // ==================== UNION ====================

    /// Append `UNION <other>` (`UNION ALL` when `all`).
    pub fn union(mut self, other: SelectQb, all: bool) -> Self {
        self.unions.push((other, all));
        self
    }

    // ==================== Parameters / caching ====================

    /// Value for a `:name` placeholder used anywhere in the statement.
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    pub fn parameters<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in values {
            self.params.insert(name.as_ref(), value);
        }
        self
    }

    /// Serve results from the adapter's query cache for `lifetime`.
    pub fn cached(mut self, lifetime: Duration, force: bool) -> Self {
        self.cache = Some(CachePolicy { lifetime, force });
        self
    }

    /// Back to an empty builder, recorded errors included.
    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    // ==================== Compilation ====================

    pub fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        if let Some(err) = &self.build_error {
            return Err(DbError::usage(err.clone()));
        }
        let primary = self.compile_primary(dialect)?;
        if self.unions.is_empty() {
            return Ok(primary);
        }

        // Without parenthesized compound members, ORDER BY / LIMIT / OFFSET (and a
        // nested compound) would bind to the whole UNION, so such members become
        // derived tables instead.
        let wrap = |sql: String, needs_scope: bool| {
            if dialect.parenthesize_compound() {
                format!("({sql})")
            } else if needs_scope {
                format!("SELECT * FROM ({sql})")
            } else {
                sql
            }
        };
        let mut sql = wrap(primary, self.has_row_bounds());
        for (other, all) in &self.unions {
            sql.push_str(if *all { " UNION ALL " } else { " UNION " });
            let scoped = other.has_row_bounds() || !other.unions.is_empty();
            sql.push_str(&wrap(other.compile(dialect)?, scoped));
        }
        Ok(sql)
    }

    fn has_row_bounds(&self) -> bool {
        !self.order_by.is_empty() || self.limit.is_some() || self.offset.is_some()
    }

    fn compile_primary(&self, dialect: &dyn Dialect) -> DbResult<String> {
        if self.tables.is_empty() {
            return Err(DbError::usage("SELECT needs at least one table"));
        }

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        let columns = dedup(self.columns.iter().map(|c| c.render(dialect)));
        if columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&columns.join(", "));
        }

        let tables = dedup(
            self.tables
                .iter()
                .map(|t| t.render(dialect))
                .collect::<DbResult<Vec<_>>>()?,
        );
        sql.push_str(" FROM ");
        sql.push_str(&tables.join(", "));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.compile(dialect)?);
        }

        let where_sql = self.where_tree.compile(dialect)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !self.group_by.is_empty() {
            let groups: Vec<String> = self.group_by.iter().map(|c| c.render(dialect)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        let having_sql = self.having_tree.compile(dialect)?;
        if !having_sql.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having_sql);
        }

        write_order_by(&mut sql, &self.order_by, dialect);
        dialect.write_limit_offset(&mut sql, self.limit, self.offset);
        Ok(sql)
    }

    /// `SELECT COUNT(*)` over the whole statement.
    pub fn compile_count(&self, dialect: &dyn Dialect) -> DbResult<String> {
        Ok(format!(
            "SELECT COUNT(*) AS {} FROM ({}) AS {}",
            dialect.quote_identifier("count"),
            self.compile(dialect)?,
            dialect.quote_identifier("counted")
        ))
    }

    pub(crate) fn collect_params(&self, out: &mut Params) {
        out.merge_missing(&self.params);
        for table in &self.tables {
            table.collect_params(out);
        }
        for join in &self.joins {
            join.collect_params(out);
        }
        self.where_tree.collect_params(out);
        self.having_tree.collect_params(out);
        for (other, _) in &self.unions {
            other.collect_params(out);
        }
    }

    fn cached_query(&self, query: Query) -> Query {
        match self.cache {
            Some(policy) => query.cached(policy.lifetime, policy.force),
            None => query,
        }
    }

    // ==================== Execution ====================

    /// Run and return the rows.
    pub async fn fetch<A: Adapter>(&self, adapter: &A) -> DbResult<ResultSet> {
        self.to_query(adapter.dialect())?.fetch(adapter).await
    }

    /// Run and hydrate every row into `T`.
    pub async fn fetch_as<T: FromRow, A: Adapter>(&self, adapter: &A) -> DbResult<ResultSet<T>> {
        self.to_query(adapter.dialect())?
            .as_object::<T>()
            .fetch(adapter)
            .await
    }

    /// The first row hydrated into `T`, or [`DbError::NotFound`].
    pub async fn fetch_one_as<T: FromRow, A: Adapter>(&self, adapter: &A) -> DbResult<T> {
        self.to_query(adapter.dialect())?
            .as_object::<T>()
            .fetch_one(adapter)
            .await
    }

    /// Number of rows the statement returns.
    pub async fn count<A: Adapter>(&self, adapter: &A) -> DbResult<i64> {
        let sql = self.compile_count(adapter.dialect())?;
        let query = self.cached_query(Query::with_params(QueryKind::Select, sql, self.params()));
        query.fetch_one(adapter).await?.try_get_idx(0)
    }
}

/// Keep the first occurrence of each rendered fragment.
fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

impl SqlQb for SelectQb {
    fn kind(&self) -> QueryKind {
        QueryKind::Select
    }

    fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        SelectQb::compile(self, dialect)
    }

    fn params(&self) -> Params {
        let mut params = Params::new();
        self.collect_params(&mut params);
        params
    }

    fn build_error(&self) -> Option<&str> {
        self.build_error.as_deref()
    }

    fn to_query(&self, dialect: &dyn Dialect) -> DbResult<Query> {
        let query = Query::with_params(QueryKind::Select, self.compile(dialect)?, self.params());
        Ok(self.cached_query(query))
    }
}
