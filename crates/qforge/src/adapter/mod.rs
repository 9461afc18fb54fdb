//! Database adapters.
//!
//! An [`Adapter`] owns one lazily-established connection and executes already
//! compiled SQL. Statement building never touches an adapter; only
//! [`Query::execute`](crate::Query::execute) and friends do.
//!
//! Two implementations ship with the crate: `PgAdapter` over `tokio-postgres`
//! (feature `postgres`) and `SqliteAdapter` over `rusqlite` (feature `sqlite`).

mod config;
#[cfg(feature = "postgres")]
mod postgres;
mod schema;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use config::{ConnectionConfig, SslMode};
#[cfg(feature = "postgres")]
pub use postgres::PgAdapter;
pub use schema::{ColumnInfo, SchemaCache};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAdapter;

use crate::cache::QueryCache;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::Ident;
use crate::value::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statement kind; decides what [`Adapter::query`] reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, transaction control, anything else.
    Other,
}

impl QueryKind {
    /// Detect the kind from SQL text, looking past comments, leading parentheses and
    /// CTE definitions.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") || starts_with_keyword(trimmed, "VALUES") {
            QueryKind::Select
        } else if starts_with_keyword(trimmed, "INSERT") || starts_with_keyword(trimmed, "REPLACE") {
            QueryKind::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            QueryKind::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            QueryKind::Delete
        } else if starts_with_keyword(trimmed, "WITH") {
            Self::detect_cte_dml(trimmed)
        } else {
            QueryKind::Other
        }
    }

    /// The first statement keyword that follows a top-level `)` of the CTE list.
    fn detect_cte_dml(sql: &str) -> Self {
        let mut depth: i32 = 0;
        let bytes = sql.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let rest = sql[i + 1..].trim_start();
                        for (keyword, kind) in [
                            ("SELECT", QueryKind::Select),
                            ("INSERT", QueryKind::Insert),
                            ("UPDATE", QueryKind::Update),
                            ("DELETE", QueryKind::Delete),
                        ] {
                            if starts_with_keyword(rest, keyword) {
                                return kind;
                            }
                        }
                    }
                }
                b'\'' => {
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == b'\'' {
                            if bytes.get(i + 1) == Some(&b'\'') {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        QueryKind::Select
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Insert => "insert",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
            QueryKind::Other => "other",
        }
    }
}

/// Strip leading whitespace, SQL comments (`--` and `/* */`), and parentheses.
fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    match s.get(0..keyword.len()) {
        Some(prefix) => {
            prefix.eq_ignore_ascii_case(keyword)
                && !s[keyword.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// What a driver call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Buffered rows of a SELECT (or a statement with RETURNING).
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// INSERT result. `last_insert_id` is `None` when the driver cannot report one
    /// (Postgres without `RETURNING`).
    Inserted {
        last_insert_id: Option<i64>,
        affected: u64,
    },
    /// Affected row count of UPDATE / DELETE / other statements.
    Affected(u64),
}

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for a new adapter instance (part of result cache keys).
#[cfg_attr(not(any(feature = "postgres", feature = "sqlite")), allow(dead_code))]
pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)
}

const MAX_LOGGED_SQL: usize = 200;

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Emit the statement about to run on `qforge.sql`.
#[cfg_attr(not(any(feature = "postgres", feature = "sqlite")), allow(dead_code))]
pub(crate) fn log_sql(adapter: &'static str, kind: QueryKind, sql: &str, param_count: usize) {
    let shown: Cow<'_, str> = if sql.len() > MAX_LOGGED_SQL {
        Cow::Owned(format!("{}...", truncate_sql_bytes(sql, MAX_LOGGED_SQL)))
    } else {
        Cow::Borrowed(sql)
    };
    tracing::debug!(
        target: "qforge.sql",
        adapter,
        kind = kind.as_str(),
        param_count,
        sql = %shown,
    );
}

/// `BEGIN` modifiers are keywords only (`IMMEDIATE`, `ISOLATION LEVEL SERIALIZABLE`, ...).
fn begin_statement(mode: Option<&str>) -> DbResult<String> {
    match mode.map(str::trim) {
        None | Some("") => Ok("BEGIN".to_string()),
        Some(mode) if mode.chars().all(|c| c.is_ascii_alphabetic() || c == ' ') => {
            Ok(format!("BEGIN {}", mode.to_ascii_uppercase()))
        }
        Some(mode) => Err(DbError::usage(format!("Invalid transaction mode '{mode}'"))),
    }
}

/// A database connection that executes compiled SQL.
///
/// Methods return `Send` futures so adapters can be shared across tasks behind an
/// `Arc`. Each instance owns a single connection: statements issued between
/// [`Adapter::begin`] and [`Adapter::commit`] run inside that transaction.
pub trait Adapter: Send + Sync {
    /// Quoting rules of this database.
    fn dialect(&self) -> &dyn Dialect;

    /// Identity of this instance, used in result cache keys.
    fn instance_id(&self) -> u64;

    /// Establish the connection if it is not already up.
    fn connect(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Drop the connection. Returns whether one was open.
    fn disconnect(&self) -> impl Future<Output = bool> + Send;

    fn is_connected(&self) -> bool;

    /// Execute `sql`, binding `params` natively to the dialect's positional
    /// placeholders. Connects on first use.
    fn query(
        &self,
        kind: QueryKind,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = DbResult<QueryOutput>> + Send;

    /// Result cache consulted by cached queries.
    fn query_cache(&self) -> Option<&QueryCache> {
        None
    }

    /// Memo for [`Adapter::list_tables`] / [`Adapter::list_columns`].
    fn schema_cache(&self) -> Option<&SchemaCache> {
        None
    }

    /// Escape a value as a SQL literal.
    fn escape(&self, value: &Value) -> String {
        self.dialect().quote_literal(value)
    }

    /// Quote a (possibly schema-qualified) table name.
    fn quote_table(&self, table: &str) -> DbResult<String> {
        Ok(self.dialect().quote_ident(&Ident::parse(table)?))
    }

    /// Quote a (possibly table-qualified) column name; `*` is kept.
    fn quote_column(&self, column: &str) -> DbResult<String> {
        Ok(self.dialect().quote_ident(&Ident::parse(column)?))
    }

    /// Run a statement that produces no rows.
    fn execute_raw(&self, sql: &str) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            self.query(QueryKind::Other, sql, &[]).await?;
            Ok(())
        }
    }

    fn begin(&self, mode: Option<&str>) -> impl Future<Output = DbResult<()>> + Send {
        let statement = begin_statement(mode);
        async move {
            let statement = statement?;
            tracing::debug!(target: "qforge.sql", %statement, "transaction begin");
            self.execute_raw(&statement).await
        }
    }

    fn commit(&self) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            tracing::debug!(target: "qforge.sql", "transaction commit");
            self.execute_raw("COMMIT").await
        }
    }

    fn rollback(&self) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            tracing::debug!(target: "qforge.sql", "transaction rollback");
            self.execute_raw("ROLLBACK").await
        }
    }

    fn savepoint(&self, name: &str) -> impl Future<Output = DbResult<()>> + Send {
        let statement = format!("SAVEPOINT {}", self.dialect().quote_identifier(name));
        async move { self.execute_raw(&statement).await }
    }

    fn rollback_to_savepoint(&self, name: &str) -> impl Future<Output = DbResult<()>> + Send {
        let statement = format!(
            "ROLLBACK TO SAVEPOINT {}",
            self.dialect().quote_identifier(name)
        );
        async move { self.execute_raw(&statement).await }
    }

    fn release_savepoint(&self, name: &str) -> impl Future<Output = DbResult<()>> + Send {
        let statement = format!("RELEASE SAVEPOINT {}", self.dialect().quote_identifier(name));
        async move { self.execute_raw(&statement).await }
    }

    /// Uncached table listing; adapters without introspection return a usage error.
    fn load_tables(
        &self,
        _pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Vec<String>>> + Send {
        async { Err(DbError::usage("this adapter does not support schema introspection")) }
    }

    /// Uncached column listing of `table`.
    fn load_columns(
        &self,
        _table: &str,
        _pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<BTreeMap<String, ColumnInfo>>> + Send {
        async { Err(DbError::usage("this adapter does not support schema introspection")) }
    }

    /// Table names matching the optional `LIKE` pattern, memoized per instance.
    fn list_tables(
        &self,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Arc<Vec<String>>>> + Send {
        async move {
            if let Some(hit) = self.schema_cache().and_then(|c| c.tables(pattern)) {
                return Ok(hit);
            }
            let tables = Arc::new(self.load_tables(pattern).await?);
            if let Some(cache) = self.schema_cache() {
                cache.put_tables(pattern, Arc::clone(&tables));
            }
            Ok(tables)
        }
    }

    /// Columns of `table` matching the optional `LIKE` pattern, memoized per
    /// `(table, pattern)`.
    fn list_columns(
        &self,
        table: &str,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Arc<BTreeMap<String, ColumnInfo>>>> + Send {
        async move {
            if let Some(hit) = self.schema_cache().and_then(|c| c.columns(table, pattern)) {
                return Ok(hit);
            }
            let columns = Arc::new(self.load_columns(table, pattern).await?);
            if let Some(cache) = self.schema_cache() {
                cache.put_columns(table, pattern, Arc::clone(&columns));
            }
            Ok(columns)
        }
    }

    /// Forget memoized introspection results.
    fn clear_schema_cache(&self) {
        if let Some(cache) = self.schema_cache() {
            cache.clear();
        }
    }
}

impl<A: Adapter> Adapter for Arc<A> {
    fn dialect(&self) -> &dyn Dialect {
        (**self).dialect()
    }

    fn instance_id(&self) -> u64 {
        (**self).instance_id()
    }

    fn connect(&self) -> impl Future<Output = DbResult<()>> + Send {
        (**self).connect()
    }

    fn disconnect(&self) -> impl Future<Output = bool> + Send {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn query(
        &self,
        kind: QueryKind,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = DbResult<QueryOutput>> + Send {
        (**self).query(kind, sql, params)
    }

    fn query_cache(&self) -> Option<&QueryCache> {
        (**self).query_cache()
    }

    fn schema_cache(&self) -> Option<&SchemaCache> {
        (**self).schema_cache()
    }

    fn escape(&self, value: &Value) -> String {
        (**self).escape(value)
    }

    fn quote_table(&self, table: &str) -> DbResult<String> {
        (**self).quote_table(table)
    }

    fn quote_column(&self, column: &str) -> DbResult<String> {
        (**self).quote_column(column)
    }

    fn execute_raw(&self, sql: &str) -> impl Future<Output = DbResult<()>> + Send {
        (**self).execute_raw(sql)
    }

    fn begin(&self, mode: Option<&str>) -> impl Future<Output = DbResult<()>> + Send {
        (**self).begin(mode)
    }

    fn commit(&self) -> impl Future<Output = DbResult<()>> + Send {
        (**self).commit()
    }

    fn rollback(&self) -> impl Future<Output = DbResult<()>> + Send {
        (**self).rollback()
    }

    fn savepoint(&self, name: &str) -> impl Future<Output = DbResult<()>> + Send {
        (**self).savepoint(name)
    }

    fn rollback_to_savepoint(&self, name: &str) -> impl Future<Output = DbResult<()>> + Send {
        (**self).rollback_to_savepoint(name)
    }

    fn release_savepoint(&self, name: &str) -> impl Future<Output = DbResult<()>> + Send {
        (**self).release_savepoint(name)
    }

    fn load_tables(
        &self,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Vec<String>>> + Send {
        (**self).load_tables(pattern)
    }

    fn load_columns(
        &self,
        table: &str,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<BTreeMap<String, ColumnInfo>>> + Send {
        (**self).load_columns(table, pattern)
    }

    fn list_tables(
        &self,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Arc<Vec<String>>>> + Send {
        (**self).list_tables(pattern)
    }

    fn list_columns(
        &self,
        table: &str,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Arc<BTreeMap<String, ColumnInfo>>>> + Send {
        (**self).list_columns(table, pattern)
    }

    fn clear_schema_cache(&self) {
        (**self).clear_schema_cache()
    }
}
