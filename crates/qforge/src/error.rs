//! Error types for qforge

use thiserror::Error;

/// Result type alias for qforge operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for statement building and database operations
#[derive(Debug, Error)]
pub enum DbError {
    /// Programmer error: missing table, conflicting clauses, invalid tokens, ...
    #[error("Usage error: {0}")]
    Usage(String),

    /// A condition tree or statement could not be compiled
    #[error("Compile error: {0}")]
    Compile(String),

    /// The adapter could not establish (or has lost) its connection
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        code: Option<String>,
    },

    /// The database rejected a statement
    #[error("Query error: {message} [{sql}]")]
    Query {
        message: String,
        sql: String,
        code: Option<String>,
    },

    /// A query that must return a row returned none
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Serialization error (cached result buffers)
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a compile error
    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a connection error without a driver code
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            code: None,
        }
    }

    /// Check if this is a usage error
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The driver-native error code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Connection { code, .. } | Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// The SQL text that failed, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Check if this is a unique constraint violation (Postgres `23505`, SQLite `2067`/`1555`).
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.code(), Some("23505" | "2067" | "1555"))
    }

    /// Convert a tokio_postgres error raised while running `sql`.
    #[cfg(feature = "postgres")]
    pub fn from_pg_error(err: tokio_postgres::Error, sql: &str) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = match db_err.constraint() {
                Some(constraint) => format!("{constraint}: {}", db_err.message()),
                None => db_err.message().to_string(),
            };
            return Self::Query {
                message,
                sql: sql.to_string(),
                code: Some(db_err.code().code().to_string()),
            };
        }
        if err.is_closed() {
            return Self::Connection {
                message: err.to_string(),
                code: None,
            };
        }
        Self::Query {
            message: err.to_string(),
            sql: sql.to_string(),
            code: None,
        }
    }

    /// Convert a rusqlite error raised while running `sql`.
    #[cfg(feature = "sqlite")]
    pub fn from_sqlite_error(err: rusqlite::Error, sql: &str) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code.to_string()),
            _ => None,
        };
        Self::Query {
            message: err.to_string(),
            sql: sql.to_string(),
            code,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_keeps_sql_and_code() {
        let err = DbError::Query {
            message: "duplicate key".into(),
            sql: "INSERT INTO t VALUES (1)".into(),
            code: Some("23505".into()),
        };
        assert!(err.is_unique_violation());
        assert_eq!(err.sql(), Some("INSERT INTO t VALUES (1)"));
        assert!(err.to_string().contains("INSERT INTO t"));
    }

    #[test]
    fn usage_has_no_code() {
        let err = DbError::usage("no table");
        assert!(err.is_usage());
        assert_eq!(err.code(), None);
    }
}
