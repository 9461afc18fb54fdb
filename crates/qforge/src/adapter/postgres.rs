use super::{
    Adapter, ColumnInfo, ConnectionConfig, QueryKind, QueryOutput, SchemaCache, log_sql,
    next_instance_id,
};
use crate::cache::QueryCache;
use crate::dialect::{Dialect, Postgres, quote_string};
use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::value::Value;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Socket};
use uuid::Uuid;

/// Postgres adapter over a single `tokio-postgres` connection.
///
/// The connection is opened on first use and its driver task is spawned on the
/// current tokio runtime.
pub struct PgAdapter<T = NoTls> {
    config: ConnectionConfig,
    tls: T,
    client: Mutex<Option<Arc<Client>>>,
    connecting: tokio::sync::Mutex<()>,
    instance_id: u64,
    cache: Option<Arc<QueryCache>>,
    schema: SchemaCache,
}

impl<T> std::fmt::Debug for PgAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgAdapter")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl PgAdapter<NoTls> {
    /// Plain-TCP adapter for `config`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_tls(config, NoTls)
    }

    /// Plain-TCP adapter for a `postgres://` URL.
    pub fn from_url(url: &str) -> DbResult<Self> {
        Ok(Self::new(ConnectionConfig::from_url(url)?))
    }
}

impl<T> PgAdapter<T>
where
    T: MakeTlsConnect<Socket> + Clone + Send + Sync + 'static,
    T::Stream: Send + Sync + 'static,
    T::TlsConnect: Send + Sync,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    /// Adapter using a custom TLS connector. A result cache of
    /// `config.cache_capacity` entries is created unless that is zero.
    pub fn with_tls(config: ConnectionConfig, tls: T) -> Self {
        let cache = (config.cache_capacity > 0)
            .then(|| Arc::new(QueryCache::new(config.cache_capacity)));
        Self {
            config,
            tls,
            client: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
            instance_id: next_instance_id(),
            cache,
            schema: SchemaCache::new(),
        }
    }

    /// Replace the result cache, e.g. to share one between adapters.
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Client>>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_client(&self) -> Option<Arc<Client>> {
        self.slot().as_ref().filter(|c| !c.is_closed()).cloned()
    }

    async fn client(&self) -> DbResult<Arc<Client>> {
        if let Some(client) = self.live_client() {
            return Ok(client);
        }
        let _guard = self.connecting.lock().await;
        if let Some(client) = self.live_client() {
            return Ok(client);
        }

        let (client, connection) = self
            .config
            .to_pg_config()
            .connect(self.tls.clone())
            .await
            .map_err(|e| DbError::Connection {
                code: e.as_db_error().map(|d| d.code().code().to_string()),
                message: e.to_string(),
            })?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(target: "qforge.sql", adapter = "postgres", error = %e, "connection closed");
            }
        });

        if let Some(charset) = &self.config.charset {
            let sql = format!("SET client_encoding TO {}", quote_string(charset));
            client
                .batch_execute(&sql)
                .await
                .map_err(|e| DbError::from_pg_error(e, &sql))?;
        }
        tracing::info!(
            target: "qforge.sql",
            adapter = "postgres",
            host = %self.config.host,
            port = self.config.port,
            "connected"
        );

        let client = Arc::new(client);
        *self.slot() = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn run(&self, kind: QueryKind, sql: &str, params: &[Value]) -> DbResult<QueryOutput> {
        log_sql("postgres", kind, sql, params.len());
        let client = self.client().await?;
        let err = |e: tokio_postgres::Error| DbError::from_pg_error(e, sql);

        // Parameterless utility statements go through the simple protocol.
        if kind == QueryKind::Other && params.is_empty() {
            client.batch_execute(sql).await.map_err(err)?;
            return Ok(QueryOutput::Affected(0));
        }

        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let stmt = client.prepare(sql).await.map_err(err)?;

        if stmt.columns().is_empty() {
            let affected = client.execute(&stmt, &refs).await.map_err(err)?;
            return Ok(match kind {
                QueryKind::Insert => QueryOutput::Inserted {
                    last_insert_id: None,
                    affected,
                },
                _ => QueryOutput::Affected(affected),
            });
        }

        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let pg_rows = client.query(&stmt, &refs).await.map_err(err)?;
        let mut rows = Vec::with_capacity(pg_rows.len());
        for row in &pg_rows {
            let values = row
                .columns()
                .iter()
                .enumerate()
                .map(|(i, col)| decode_column(row, i, col.name(), col.type_()))
                .collect::<DbResult<Vec<_>>>()?;
            rows.push(values);
        }

        Ok(match kind {
            QueryKind::Insert => QueryOutput::Inserted {
                last_insert_id: rows.last().and_then(|r| r.first()).and_then(Value::as_i64),
                affected: rows.len() as u64,
            },
            _ => QueryOutput::Rows { columns, rows },
        })
    }

    async fn select_rows(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        match self.run(QueryKind::Select, sql, params).await? {
            QueryOutput::Rows { columns, rows } => {
                let columns: Arc<[String]> = Arc::from(columns);
                rows.into_iter()
                    .map(|values| Row::new(Arc::clone(&columns), values))
                    .collect()
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn tables(&self, pattern: Option<&str>) -> DbResult<Vec<String>> {
        let sql = "SELECT table_name::text AS name FROM information_schema.tables \
                   WHERE table_schema = ANY (current_schemas(false)) \
                   AND table_type = 'BASE TABLE' \
                   AND ($1::text IS NULL OR table_name LIKE $1::text) \
                   ORDER BY table_name";
        self.select_rows(sql, &[Value::from(pattern)])
            .await?
            .iter()
            .map(|row| row.try_get::<String>("name"))
            .collect()
    }

    async fn columns(
        &self,
        table: &str,
        pattern: Option<&str>,
    ) -> DbResult<BTreeMap<String, ColumnInfo>> {
        let (schema, table) = match table.split_once('.') {
            Some((schema, table)) => (Some(schema), table),
            None => (None, table),
        };
        let sql = "SELECT c.column_name::text AS name, c.data_type::text AS data_type, \
                   c.is_nullable = 'YES' AS nullable, c.column_default::text AS dflt, \
                   c.ordinal_position::int4 AS ordinal, \
                   EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
                     JOIN information_schema.key_column_usage k \
                       ON k.constraint_name = tc.constraint_name \
                      AND k.table_schema = tc.table_schema AND k.table_name = tc.table_name \
                     WHERE tc.constraint_type = 'PRIMARY KEY' \
                       AND tc.table_schema = c.table_schema AND tc.table_name = c.table_name \
                       AND k.column_name = c.column_name) AS pk \
                   FROM information_schema.columns c \
                   WHERE c.table_name = $1::text \
                   AND (($3::text IS NULL AND c.table_schema = ANY (current_schemas(false))) \
                        OR c.table_schema = $3::text) \
                   AND ($2::text IS NULL OR c.column_name LIKE $2::text) \
                   ORDER BY c.ordinal_position";
        let params = [Value::from(table), Value::from(pattern), Value::from(schema)];
        self.select_rows(sql, &params)
            .await?
            .iter()
            .map(|row| {
                let info = ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get("nullable")?,
                    default: row.try_get("dflt")?,
                    ordinal: row.try_get("ordinal")?,
                    primary_key: row.try_get("pk")?,
                };
                Ok((info.name.clone(), info))
            })
            .collect()
    }
}

impl<T> Adapter for PgAdapter<T>
where
    T: MakeTlsConnect<Socket> + Clone + Send + Sync + 'static,
    T::Stream: Send + Sync + 'static,
    T::TlsConnect: Send + Sync,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    fn dialect(&self) -> &dyn Dialect {
        &Postgres
    }

    fn instance_id(&self) -> u64 {
        self.instance_id
    }

    fn connect(&self) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            self.client().await?;
            Ok(())
        }
    }

    fn disconnect(&self) -> impl Future<Output = bool> + Send {
        // Dropping the last client handle ends the spawned connection task.
        async move { self.slot().take().is_some() }
    }

    fn is_connected(&self) -> bool {
        self.live_client().is_some()
    }

    fn query(
        &self,
        kind: QueryKind,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = DbResult<QueryOutput>> + Send {
        self.run(kind, sql, params)
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
        self.tables(pattern)
    }

    fn load_columns(
        &self,
        table: &str,
        pattern: Option<&str>,
    ) -> impl Future<Output = DbResult<BTreeMap<String, ColumnInfo>>> + Send {
        self.columns(table, pattern)
    }
}

fn decode_column(row: &tokio_postgres::Row, idx: usize, name: &str, ty: &Type) -> DbResult<Value> {
    fn get<'a, V: FromSql<'a>>(
        row: &'a tokio_postgres::Row,
        idx: usize,
        name: &str,
    ) -> DbResult<Option<V>> {
        row.try_get::<_, Option<V>>(idx)
            .map_err(|e| DbError::decode(name, e.to_string()))
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx, name)?.map(Value::Bool),
        Type::INT2 => get::<i16>(row, idx, name)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx, name)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx, name)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx, name)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx, name)?.map(Value::from),
        Type::FLOAT8 => get::<f64>(row, idx, name)?.map(Value::Float),
        Type::NUMERIC => get::<NumericText>(row, idx, name)?.map(|n| Value::Text(n.0)),
        Type::BYTEA => get::<Vec<u8>>(row, idx, name)?.map(Value::Bytes),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx, name)?.map(Value::Json),
        Type::UUID => get::<Uuid>(row, idx, name)?.map(Value::Uuid),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx, name)?.map(Value::Timestamp),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx, name)?.map(Value::from),
        Type::DATE => get::<NaiveDate>(row, idx, name)?.map(Value::Date),
        ref other if <String as FromSql>::accepts(other) => {
            get::<String>(row, idx, name)?.map(Value::Text)
        }
        ref other => {
            return Err(DbError::decode(
                name,
                format!("unsupported column type '{other}'; cast it to text"),
            ));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// `NUMERIC` in its exact decimal text form.
struct NumericText(String);

impl<'a> FromSql<'a> for NumericText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        const NEGATIVE: u16 = 0x4000;
        const NAN: u16 = 0xC000;

        let word = |i: usize| -> Result<u16, Box<dyn Error + Sync + Send>> {
            raw.get(i..i + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or_else(|| "truncated numeric".into())
        };
        let ndigits = usize::from(word(0)?);
        let weight = word(2)? as i16;
        let sign = word(4)?;
        let dscale = usize::from(word(6)?);
        if sign == NAN {
            return Ok(NumericText("NaN".to_string()));
        }
        let digits = (0..ndigits)
            .map(|i| word(8 + 2 * i))
            .collect::<Result<Vec<_>, _>>()?;
        let digit = |i: i32| -> u16 {
            usize::try_from(i)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut out = String::new();
        if sign == NEGATIVE {
            out.push('-');
        }
        if weight < 0 {
            out.push('0');
        } else {
            for i in 0..=i32::from(weight) {
                if i == 0 {
                    let _ = write!(out, "{}", digit(i));
                } else {
                    let _ = write!(out, "{:04}", digit(i));
                }
            }
        }
        if dscale > 0 {
            let mut frac = String::with_capacity(dscale + 4);
            let mut i = i32::from(weight) + 1;
            while frac.len() < dscale {
                let _ = write!(frac, "{:04}", digit(i));
                i += 1;
            }
            frac.truncate(dscale);
            out.push('.');
            out.push_str(&frac);
        }
        Ok(NumericText(out))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Values are encoded according to the parameter type Postgres inferred, so an
/// `Int` can bind to `int2`/`int4`/`int8`/`numeric` and a `Timestamp` to either timestamp type.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql_checked(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql_checked(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql_checked(ty, out),
                Type::OID => u32::try_from(*i)?.to_sql_checked(ty, out),
                Type::FLOAT4 | Type::FLOAT8 => (*i as f64).to_sql_checked(ty, out),
                Type::BOOL => (*i != 0).to_sql_checked(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql_checked(ty, out),
                _ => i.to_sql_checked(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql_checked(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql_checked(ty, out),
                _ => f.to_sql_checked(ty, out),
            },
            Value::Text(s) => match *ty {
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?
                    .to_sql_checked(ty, out),
                Type::UUID => Uuid::parse_str(s)?.to_sql_checked(ty, out),
                // Exact: more digits than a Decimal holds is an error, not rounding.
                Type::NUMERIC => Decimal::from_str_exact(s.trim())?.to_sql_checked(ty, out),
                _ => s.as_str().to_sql_checked(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql_checked(ty, out),
            Value::Json(j) => j.to_sql_checked(ty, out),
            Value::Uuid(u) => match *ty {
                Type::UUID => u.to_sql_checked(ty, out),
                _ => u.to_string().as_str().to_sql_checked(ty, out),
            },
            Value::Timestamp(t) => match *ty {
                Type::TIMESTAMPTZ => t.and_utc().to_sql_checked(ty, out),
                Type::DATE => t.date().to_sql_checked(ty, out),
                _ => t.to_sql_checked(ty, out),
            },
            Value::Date(d) => d.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> String {
        let mut raw = Vec::new();
        for w in [ndigits, weight as u16, sign, dscale] {
            raw.extend_from_slice(&w.to_be_bytes());
        }
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        NumericText::from_sql(&Type::NUMERIC, &raw).unwrap().0
    }

    #[test]
    fn numeric_text() {
        assert_eq!(numeric(2, 1, 0, 0, &[1, 2345]), "12345");
        assert_eq!(numeric(1, -1, 0, 2, &[500]), "0.05");
        assert_eq!(numeric(2, 0, 0x4000, 3, &[12, 3400]), "-12.340");
        assert_eq!(numeric(1, -2, 0, 5, &[5000]), "0.00005");
        assert_eq!(numeric(0, 0, 0, 0, &[]), "0");
        assert_eq!(numeric(0, 0, 0xC000, 0, &[]), "NaN");
    }

    #[test]
    fn ints_narrow_to_parameter_type() {
        let mut out = BytesMut::new();
        Value::Int(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(out.as_ref(), 7i32.to_be_bytes());
        assert!(Value::Int(i64::MAX).to_sql(&Type::INT4, &mut out).is_err());
        assert!(matches!(Value::Null.to_sql(&Type::TEXT, &mut out), Ok(IsNull::Yes)));
    }

    #[test]
    fn numeric_parameters_bind_exactly() {
        let encode = |value: Value| {
            let mut out = BytesMut::new();
            value.to_sql_checked(&Type::NUMERIC, &mut out).unwrap();
            NumericText::from_sql(&Type::NUMERIC, &out).unwrap().0
        };
        assert_eq!(encode(Value::Int(5)), "5");
        assert_eq!(encode(Value::Int(-120)), "-120");
        assert_eq!(encode(Value::Float(12.5)), "12.5");
        assert_eq!(encode(Value::Text("12.50".into())), "12.50");
        assert_eq!(encode(Value::Text("-0.0001".into())), "-0.0001");

        let mut out = BytesMut::new();
        assert!(Value::Text("abc".into()).to_sql_checked(&Type::NUMERIC, &mut out).is_err());
        assert!(Value::Float(f64::NAN).to_sql_checked(&Type::NUMERIC, &mut out).is_err());
    }

    #[test]
    fn adapter_is_lazy() {
        let adapter = PgAdapter::new(ConnectionConfig::new().database("none"));
        assert!(!adapter.is_connected());
        assert_eq!(adapter.dialect().name(), "postgres");
        assert!(adapter.query_cache().is_some());
    }
}
