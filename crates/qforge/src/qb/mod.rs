//! Statement builders.
//!
//! Every builder is a plain value: mutators consume and return it, compilation is
//! pure and can run any number of times against any [`Dialect`](crate::Dialect).
//! Literals are inlined as escaped text; values that should be bound natively go
//! through named parameters (`Operand::param("id")` plus `.param("id", 5)`).
//!
//! # Usage
//!
//! ```ignore
//! use qforge::qb;
//!
//! // SELECT
//! let users = qb::select(["id", "name"])
//!     .from("users")
//!     .where_("status", "=", "active")
//!     .order_by_desc("created_at")
//!     .limit(20)
//!     .fetch_as::<User, _>(&db)
//!     .await?;
//!
//! // INSERT
//! qb::insert("users")
//!     .columns(["username", "email"])
//!     .values(["alice", "alice@example.com"])?
//!     .execute(&db)
//!     .await?;
//!
//! // UPDATE
//! qb::update("users")
//!     .set("status", "inactive")
//!     .eq("id", user_id)
//!     .execute(&db)
//!     .await?;
//!
//! // DELETE
//! qb::delete("users").eq("id", user_id).execute(&db).await?;
//! ```

mod delete;
mod expr;
mod insert;
mod join;
mod order;
mod param;
mod select;
mod traits;
mod update;


pub use delete::DeleteQb;
pub use expr::{ConditionTree, Logic};
pub use insert::InsertQb;
pub use join::{JoinClause, JoinKind};
pub use order::{IntoSortOrder, SortOrder};
pub use param::{BindHandle, Params};
pub use select::SelectQb;
pub use traits::SqlQb;
pub use update::UpdateQb;

use crate::condition::IntoColumn;
use crate::error::DbError;
use crate::ident::IntoIdent;

/// A SELECT of `columns`; add the source with [`SelectQb::from`].
///
/// # Example
/// ```ignore
/// let qb = qforge::qb::select(["id", "name"]).from("users");
/// ```
pub fn select<C: IntoColumn>(columns: impl IntoIterator<Item = C>) -> SelectQb {
    SelectQb::new().select_cols(columns)
}

/// `SELECT * FROM table`, ready for further clauses.
pub fn select_from(table: &str) -> SelectQb {
    SelectQb::new().from(table)
}

pub fn insert(table: impl IntoIdent) -> InsertQb {
    InsertQb::new().table(table)
}

pub fn update(table: impl IntoIdent) -> UpdateQb {
    UpdateQb::new().table(table)
}

pub fn delete(table: impl IntoIdent) -> DeleteQb {
    DeleteQb::new().table(table)
}

/// Message kept by a builder for an error it records instead of returning.
/// `compile` re-raises it as a usage error.
pub(crate) fn error_message(err: DbError) -> String {
    match err {
        DbError::Usage(message) | DbError::Compile(message) => message,
        other => other.to_string(),
    }
}
