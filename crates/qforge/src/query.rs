//! Executable queries over already-compiled SQL.
//!
//! A [`Query`] is immutable: every method returns a new query and leaves the receiver
//! untouched, so one query can serve as a template for many executions.
//!
//! ```ignore
//! use qforge::{query, QueryKind};
//!
//! let by_id = query(QueryKind::Select, "SELECT * FROM users WHERE id = :id");
//! let (by_id, id) = by_id.bind("id");
//! let ann = by_id.set(&id, 1).fetch_one(&db).await?;
//! let bob = by_id.set(&id, 2).as_object::<User>().fetch_one(&db).await?;
//! ```

use crate::adapter::{Adapter, QueryKind, QueryOutput};
use crate::cache::{CacheKey, CachedRows};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::{BindHandle, Params};
use crate::result::ResultSet;
use crate::row::{FromRow, Row};
use crate::value::Value;
use std::marker::PhantomData;
use std::time::Duration;

/// How long a SELECT result may be served from the adapter's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub lifetime: Duration,
    /// Skip the lookup and refresh the entry.
    pub force: bool,
}

/// SQL text with named parameters, a row mode and an optional cache policy.
pub struct Query<R = Row> {
    kind: QueryKind,
    sql: String,
    params: Params,
    cache: Option<CachePolicy>,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            sql: self.sql.clone(),
            params: self.params.clone(),
            cache: self.cache,
            _row: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("kind", &self.kind)
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Create a query from raw SQL with `:name` placeholders.
pub fn query(kind: QueryKind, sql: impl Into<String>) -> Query {
    Query::new(kind, sql)
}

impl Query<Row> {
    pub fn new(kind: QueryKind, sql: impl Into<String>) -> Self {
        Self::with_params(kind, sql.into(), Params::new())
    }

    pub(crate) fn with_params(kind: QueryKind, sql: String, params: Params) -> Self {
        Self {
            kind,
            sql,
            params,
            cache: None,
            _row: PhantomData,
        }
    }
}

impl<R> Query<R> {
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// The SQL as written, placeholders included.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache
    }

    fn retype<T>(&self) -> Query<T> {
        Query {
            kind: self.kind,
            sql: self.sql.clone(),
            params: self.params.clone(),
            cache: self.cache,
            _row: PhantomData,
        }
    }

    /// A copy with `:name` set to `value`.
    pub fn param(&self, name: &str, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.params.insert(name, value);
        next
    }

    /// A copy with every `(name, value)` pair set.
    pub fn parameters<K, V, I>(&self, values: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut next = self.clone();
        for (name, value) in values {
            next.params.insert(name.as_ref(), value);
        }
        next
    }

    /// Declare `:name` without a value. Executing before [`Query::set`] fills it is
    /// a usage error.
    pub fn bind(&self, name: &str) -> (Self, BindHandle) {
        let mut next = self.clone();
        let handle = next.params.bind(name);
        (next, handle)
    }

    /// A copy with the bound parameter filled in.
    pub fn set(&self, handle: &BindHandle, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.params.set(handle, value);
        next
    }

    /// The same query hydrating rows into `T`.
    pub fn as_object<T: FromRow>(&self) -> Query<T> {
        self.retype()
    }

    /// The same query returning associative rows.
    pub fn as_assoc(&self) -> Query<Row> {
        self.retype()
    }

    /// A copy whose SELECT results are served from the adapter's cache for
    /// `lifetime`. `force` skips the lookup and refreshes the entry.
    pub fn cached(&self, lifetime: Duration, force: bool) -> Self {
        let mut next = self.clone();
        next.cache = Some(CachePolicy { lifetime, force });
        next
    }

    /// A copy that bypasses the cache.
    pub fn uncached(&self) -> Self {
        let mut next = self.clone();
        next.cache = None;
        next
    }

    /// SQL with parameters inlined as escaped literals, for logging and cache keys.
    /// Unset placeholders stay as `:name`.
    pub fn compile(&self, dialect: &dyn Dialect) -> String {
        self.params.substitute(&self.sql, dialect)
    }

    /// SQL with native positional placeholders and the values to bind, in order.
    pub fn to_positional(&self, dialect: &dyn Dialect) -> DbResult<(String, Vec<Value>)> {
        self.params.to_positional(&self.sql, dialect)
    }
}

impl<R: FromRow> Query<R> {
    /// Run the query.
    ///
    /// Cached SELECTs are looked up by `(adapter instance, compiled SQL)` before the
    /// database is contacted.
    pub async fn execute<A: Adapter>(&self, adapter: &A) -> DbResult<Outcome<R>> {
        let dialect = adapter.dialect();
        let (sql, values) = self.to_positional(dialect)?;

        let cache = match (self.kind, self.cache, adapter.query_cache()) {
            (QueryKind::Select, Some(policy), Some(cache)) => Some((policy, cache)),
            _ => None,
        };
        let Some((policy, cache)) = cache else {
            let output = adapter.query(self.kind, &sql, &values).await?;
            return Outcome::from_output(output);
        };

        let key = CacheKey::new(adapter.instance_id(), self.compile(dialect));
        if !policy.force {
            if let Some(hit) = cache.get(&key) {
                tracing::debug!(target: "qforge.cache", sql = key.sql(), "hit");
                return Ok(Outcome::Rows(ResultSet::from_cached(&hit)?));
            }
        }
        tracing::debug!(target: "qforge.cache", sql = key.sql(), force = policy.force, "miss");

        match adapter.query(self.kind, &sql, &values).await? {
            QueryOutput::Rows { columns, rows } => {
                let stored = cache.insert(key, CachedRows { columns, rows }, policy.lifetime);
                Ok(Outcome::Rows(ResultSet::from_cached(&stored)?))
            }
            other => Outcome::from_output(other),
        }
    }

    /// Run the query and return its rows.
    pub async fn fetch<A: Adapter>(&self, adapter: &A) -> DbResult<ResultSet<R>> {
        self.execute(adapter).await?.into_rows()
    }

    /// The first row, or [`DbError::NotFound`].
    pub async fn fetch_one<A: Adapter>(&self, adapter: &A) -> DbResult<R> {
        self.fetch_opt(adapter)
            .await?
            .ok_or_else(|| DbError::NotFound(self.sql.clone()))
    }

    /// The first row, if any.
    pub async fn fetch_opt<A: Adapter>(&self, adapter: &A) -> DbResult<Option<R>> {
        Ok(self.fetch(adapter).await?.into_vec().into_iter().next())
    }
}

/// What executing a [`Query`] produced.
#[derive(Debug, Clone)]
pub enum Outcome<R = Row> {
    Rows(ResultSet<R>),
    Inserted {
        last_insert_id: Option<i64>,
        affected: u64,
    },
    Affected(u64),
}

impl<R: FromRow> Outcome<R> {
    fn from_output(output: QueryOutput) -> DbResult<Self> {
        Ok(match output {
            QueryOutput::Rows { columns, rows } => Outcome::Rows(ResultSet::from_parts(columns, rows)?),
            QueryOutput::Inserted {
                last_insert_id,
                affected,
            } => Outcome::Inserted {
                last_insert_id,
                affected,
            },
            QueryOutput::Affected(n) => Outcome::Affected(n),
        })
    }
}

impl<R> Outcome<R> {
    /// The rows, or a usage error for statements that produced none.
    pub fn into_rows(self) -> DbResult<ResultSet<R>> {
        match self {
            Outcome::Rows(rows) => Ok(rows),
            _ => Err(DbError::usage("statement did not return rows")),
        }
    }

    /// Rows returned or affected.
    pub fn affected(&self) -> u64 {
        match self {
            Outcome::Rows(rows) => rows.len() as u64,
            Outcome::Inserted { affected, .. } => *affected,
            Outcome::Affected(n) => *n,
        }
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        match self {
            Outcome::Inserted { last_insert_id, .. } => *last_insert_id,
            _ => None,
        }
    }
}
