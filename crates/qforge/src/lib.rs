//! # qforge
//!
//! A SQL statement builder and compiler with pluggable database adapters.
//!
//! ## Features
//!
//! - **Builders as values**: SELECT / INSERT / UPDATE / DELETE builders are plain data,
//!   compiled purely and deterministically for a [`Dialect`]
//! - **Safe by construction**: identifiers are always quoted, literals always escaped,
//!   raw SQL only enters through [`expr()`]
//! - **Grouped conditions**: explicit `where_open()` / `where_close()` groups with
//!   AND/OR logic, checked at compile time
//! - **Explicit adapters**: `PgAdapter` (tokio-postgres, feature `postgres`) and
//!   `SqliteAdapter` (rusqlite, feature `sqlite`), passed wherever a statement runs;
//!   no global connection
//! - **Immutable queries**: [`Query`] methods return new queries, with two-phase
//!   `bind()` / `set()` parameters and an opt-in result cache
//!
//! ## Query Builder (qb)
//!
//! ```ignore
//! use qforge::{qb, SqlQb, SqliteAdapter};
//!
//! let db = SqliteAdapter::memory();
//!
//! // SELECT
//! let users = qb::select(["id", "name"])
//!     .from("users")
//!     .where_("status", "=", "active")
//!     .order_by_desc("created_at")
//!     .limit(10)
//!     .fetch(&db)
//!     .await?;
//!
//! // INSERT
//! let id = qb::insert("users")
//!     .columns(["username", "email"])
//!     .values(["alice", "alice@example.com"])?
//!     .execute(&db)
//!     .await?
//!     .last_insert_id();
//!
//! // UPDATE
//! qb::update("users")
//!     .set("status", "inactive")
//!     .eq("id", 1)
//!     .execute(&db)
//!     .await?;
//!
//! // DELETE
//! qb::delete("users").eq("id", 1).execute(&db).await?;
//! ```
//!
//! ## Raw SQL
//!
//! ```ignore
//! use qforge::{query, QueryKind};
//!
//! let rows = query(QueryKind::Select, "SELECT * FROM users WHERE id = :id")
//!     .param("id", 1)
//!     .fetch(&db)
//!     .await?;
//! ```

pub mod adapter;
pub mod cache;
pub mod condition;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod qb;
pub mod query;
pub mod result;
pub mod row;
pub mod sql;
pub mod transaction;
pub mod value;

pub use adapter::{
    Adapter, ColumnInfo, ConnectionConfig, QueryKind, QueryOutput, SchemaCache, SslMode,
};
#[cfg(feature = "postgres")]
pub use adapter::PgAdapter;
#[cfg(feature = "sqlite")]
pub use adapter::SqliteAdapter;
pub use cache::{CacheKey, CachedRows, QueryCache};
pub use condition::{ColumnRef, Condition, IntoColumn, IntoOperator, IntoTable, Operand, Operator, TableRef};
pub use dialect::{Dialect, Postgres, Sqlite};
pub use error::{DbError, DbResult};
pub use ident::{Ident, IntoIdent};
pub use query::{CachePolicy, Outcome, Query, query};
pub use result::{CursorState, ResultSet};
pub use row::{FromRow, Row};
pub use sql::{Expression, expr};
pub use value::{FromValue, Value};

// Re-export qb module for easy access
pub use qb::{
    BindHandle, ConditionTree, DeleteQb, InsertQb, JoinKind, Logic, Params, SelectQb, SortOrder,
    SqlQb, UpdateQb,
};
