use super::{
    Adapter, ColumnInfo, ConnectionConfig, QueryKind, QueryOutput, SchemaCache, log_sql,
    next_instance_id,
};
use crate::cache::QueryCache;
use crate::dialect::{Dialect, Sqlite};
use crate::error::{DbError, DbResult};
use crate::value::{DATE_FORMAT, TIMESTAMP_FORMAT, Value};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MEMORY: &str = ":memory:";

/// SQLite adapter over a single `rusqlite` connection.
///
/// The driver is synchronous: every call runs to completion inside the returned
/// future, with the connection mutex held only for that call.
pub struct SqliteAdapter {
    path: String,
    conn: Mutex<Option<Connection>>,
    instance_id: u64,
    cache: Option<Arc<QueryCache>>,
    schema: SchemaCache,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("path", &self.path)
            .field("instance_id", &self.instance_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SqliteAdapter {
    /// Adapter for the database file at `path` (`:memory:` for a private in-memory
    /// database). Nothing is opened until first use.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
            instance_id: next_instance_id(),
            cache: None,
            schema: SchemaCache::new(),
        }
    }

    pub fn memory() -> Self {
        Self::new(MEMORY)
    }

    /// Adapter for `config.sqlite_path`, with a result cache of
    /// `config.cache_capacity` entries unless that is zero.
    pub fn from_config(config: &ConnectionConfig) -> DbResult<Self> {
        let path = config
            .sqlite_path
            .as_deref()
            .ok_or_else(|| DbError::usage("sqlite configuration without a path"))?;
        let adapter = Self::new(path);
        Ok(if config.cache_capacity > 0 {
            adapter.with_cache(Arc::new(QueryCache::new(config.cache_capacity)))
        } else {
            adapter
        })
    }

    /// Share `cache` with this adapter; cached queries consult it.
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> DbResult<Connection> {
        let conn = if self.path == MEMORY {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.path)
        };
        let conn = conn.map_err(|e| {
            let code = match &e {
                rusqlite::Error::SqliteFailure(f, _) => Some(f.extended_code.to_string()),
                _ => None,
            };
            DbError::Connection {
                message: format!("failed to open '{}': {e}", self.path),
                code,
            }
        })?;
        tracing::info!(target: "qforge.sql", adapter = "sqlite", path = %self.path, "connected");
        Ok(conn)
    }

    /// Run `f` on the connection, opening it first if needed.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let mut guard = self.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(DbError::connection("sqlite connection is not open")),
        }
    }

    fn run(&self, kind: QueryKind, sql: &str, params: &[Value]) -> DbResult<QueryOutput> {
        log_sql("sqlite", kind, sql, params.len());
        self.with_conn(|conn| {
            let err = |e: rusqlite::Error| DbError::from_sqlite_error(e, sql);
            let mut stmt = conn.prepare(sql).map_err(err)?;

            if stmt.column_count() == 0 {
                let affected = stmt.execute(params_from_iter(params.iter())).map_err(err)? as u64;
                return Ok(match kind {
                    QueryKind::Insert => QueryOutput::Inserted {
                        last_insert_id: Some(conn.last_insert_rowid()),
                        affected,
                    },
                    _ => QueryOutput::Affected(affected),
                });
            }

            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let width = columns.len();
            let mut rows = Vec::new();
            let mut cursor = stmt.query(params_from_iter(params.iter())).map_err(err)?;
            while let Some(row) = cursor.next().map_err(err)? {
                let values = (0..width)
                    .map(|i| row.get_ref(i).map(from_value_ref))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(err)?;
                rows.push(values);
            }

            Ok(match kind {
                // INSERT ... RETURNING still reports an insert.
                QueryKind::Insert => QueryOutput::Inserted {
                    last_insert_id: Some(conn.last_insert_rowid()),
                    affected: rows.len() as u64,
                },
                _ => QueryOutput::Rows { columns, rows },
            })
        })
    }

    fn tables(&self, pattern: Option<&str>) -> DbResult<Vec<String>> {
        let sql = "SELECT name FROM sqlite_master \
                   WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
                   AND (?1 IS NULL OR name LIKE ?1) ORDER BY name";
        log_sql("sqlite", QueryKind::Select, sql, 1);
        self.with_conn(|conn| {
            let err = |e: rusqlite::Error| DbError::from_sqlite_error(e, sql);
            let mut stmt = conn.prepare(sql).map_err(err)?;
            let names = stmt
                .query_map([pattern], |row| row.get::<_, String>(0))
                .map_err(err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(names)
        })
    }

    fn columns(&self, table: &str, pattern: Option<&str>) -> DbResult<BTreeMap<String, ColumnInfo>> {
        let sql = "SELECT name, type, \"notnull\", dflt_value, pk, cid \
                   FROM pragma_table_info(?1) WHERE ?2 IS NULL OR name LIKE ?2";
        log_sql("sqlite", QueryKind::Select, sql, 2);
        self.with_conn(|conn| {
            let err = |e: rusqlite::Error| DbError::from_sqlite_error(e, sql);
            let mut stmt = conn.prepare(sql).map_err(err)?;
            let infos = stmt
                .query_map(rusqlite::params![table, pattern], |row| {
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        nullable: row.get::<_, i64>(2)? == 0,
                        default: row.get(3)?,
                        primary_key: row.get::<_, i64>(4)? > 0,
                        ordinal: row.get::<_, u32>(5)? + 1,
                    })
                })
                .map_err(err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(err)?;
            Ok(infos.into_iter().map(|c| (c.name.clone(), c)).collect())
        })
    }
}

impl Adapter for SqliteAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &Sqlite
    }

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn connect(&self) -> impl Future<Output = DbResult<()>> + Send {
        async move { self.with_conn(|_| Ok(())) }
    }

    fn disconnect(&self) -> impl Future<Output = bool> + Send {
        async move {
            let closed = self.lock().take();
            match closed {
                Some(conn) => {
                    if let Err((_, e)) = conn.close() {
                        tracing::warn!(target: "qforge.sql", adapter = "sqlite", error = %e, "close failed");
                    }
                    true
                }
                None => false,
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn query(
        &self,
        kind: QueryKind,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = DbResult<QueryOutput>> + Send {
        async move { self.run(kind, sql, params) }
    }

    fn query_cache(&self) -> Option<&QueryCache> {
        self.cache.as_deref()
    }

    fn schema_cache(&self) -> Option<&SchemaCache> {
        Some(&self.schema)
    }

    fn load_tables(
        &self,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<Vec<String>>> + Send {
        async move { self.tables(pattern) }
    }

    fn load_columns(
        &self,
        table: &str,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<BTreeMap<String, ColumnInfo>>> + Send {
        async move { self.columns(table, pattern) }
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Stored the same way the SQLite dialect renders literals.
impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sv;
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(Sv::Null),
            Value::Bool(b) => ToSqlOutput::Owned(Sv::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(Sv::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(Sv::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Json(j) => ToSqlOutput::Owned(Sv::Text(j.to_string())),
            Value::Uuid(u) => ToSqlOutput::Owned(Sv::Text(u.to_string())),
            Value::Timestamp(t) => ToSqlOutput::Owned(Sv::Text(t.format(TIMESTAMP_FORMAT).to_string())),
            Value::Date(d) => ToSqlOutput::Owned(Sv::Text(d.format(DATE_FORMAT).to_string())),
        })
    }
}
