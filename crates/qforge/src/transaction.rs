//! Transaction helpers: macros and a savepoint guard.
//!
//! An adapter owns a single connection, so a transaction is simply every statement
//! issued on that adapter between `BEGIN` and `COMMIT`/`ROLLBACK`. The
//! [`transaction!`] macro takes care of the commit/rollback bookkeeping.
//!
//! # Example
//!
//! ```ignore
//! use qforge::{qb, DbResult, SqlQb, SqliteAdapter};
//!
//! # async fn demo(db: &SqliteAdapter) -> DbResult<()> {
//! qforge::transaction!(db, {
//!     qb::update("accounts").decrement("balance", 100).eq("id", 1).execute(db).await?;
//!     qb::update("accounts").increment("balance", 100).eq("id", 2).execute(db).await?;
//!     Ok(())
//! })?;
//! # Ok(()) }
//! ```

use crate::adapter::Adapter;
use crate::error::DbResult;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for anonymous savepoint names.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Runs the given block inside a database transaction.
///
/// - Begins a transaction via [`Adapter::begin`] (optionally with a mode such as
///   `"IMMEDIATE"`).
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)` and returns the block's error.
///
/// The block must evaluate to `qforge::DbResult<T>`.
#[macro_export]
macro_rules! transaction {
    ($adapter:expr, $mode:expr, $body:block) => {{
        let __qforge_adapter = $adapter;
        $crate::Adapter::begin(__qforge_adapter, Some($mode)).await?;
        let __qforge_tx_result = async { $body }.await;
        $crate::transaction::__finish_transaction(__qforge_adapter, __qforge_tx_result).await
    }};
    ($adapter:expr, $body:block) => {{
        let __qforge_adapter = $adapter;
        $crate::Adapter::begin(__qforge_adapter, None).await?;
        let __qforge_tx_result = async { $body }.await;
        $crate::transaction::__finish_transaction(__qforge_adapter, __qforge_tx_result).await
    }};
}

/// Runs the given block inside a savepoint of the current transaction.
///
/// - Creates the savepoint (named, or auto-numbered when the name is omitted).
/// - Releases it on `Ok(_)`.
/// - Rolls back to it on `Err(_)`; the outer transaction stays usable.
///
/// # Example
///
/// ```ignore
/// qforge::transaction!(&db, {
///     let order = create_order(&db, &data).await?;
///
///     // A failed notification does not undo the order.
///     let notified = qforge::savepoint!(&db, "notify", {
///         send_notification(&db, order.id).await?;
///         Ok(())
///     });
///     if let Err(e) = notified {
///         tracing::warn!("notification failed: {e}");
///     }
///
///     Ok(order)
/// })?;
/// ```
#[macro_export]
macro_rules! savepoint {
    ($adapter:expr, $name:expr, $body:block) => {{
        let __qforge_sp = $crate::transaction::Savepoint::create($adapter, $name).await?;
        let __qforge_sp_result = async { $body }.await;
        __qforge_sp.finish(__qforge_sp_result).await
    }};
    ($adapter:expr, $body:block) => {{
        let __qforge_sp = $crate::transaction::Savepoint::anonymous($adapter).await?;
        let __qforge_sp_result = async { $body }.await;
        __qforge_sp.finish(__qforge_sp_result).await
    }};
}

#[doc(hidden)]
pub async fn __finish_transaction<A: Adapter, T>(adapter: &A, result: DbResult<T>) -> DbResult<T> {
    match result {
        Ok(value) => {
            adapter.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_err) = adapter.rollback().await {
                tracing::warn!(target: "qforge.sql", %error, %rollback_err, "rollback failed");
            }
            Err(error)
        }
    }
}

/// Generate a unique anonymous savepoint name.
pub fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("qforge_sp_{n}")
}

/// A named savepoint on an adapter's open transaction.
///
/// Consume it with [`Savepoint::release`] or [`Savepoint::rollback`]. Dropping it
/// without either leaves the savepoint in place and logs a warning.
///
/// # Example
///
/// ```ignore
/// use qforge::transaction::Savepoint;
///
/// qforge::transaction!(&db, {
///     let sp = Savepoint::create(&db, "before_items").await?;
///     match insert_items(&db, &items).await {
///         Ok(_) => sp.release().await?,
///         Err(e) => {
///             sp.rollback().await?;
///             tracing::warn!("failed to insert items: {e}");
///         }
///     }
///     Ok(())
/// })?;
/// ```
#[derive(Debug)]
pub struct Savepoint<'a, A: Adapter> {
    adapter: &'a A,
    name: String,
    done: bool,
}

impl<'a, A: Adapter> Savepoint<'a, A> {
    /// `SAVEPOINT "name"`.
    pub async fn create(adapter: &'a A, name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        adapter.savepoint(&name).await?;
        Ok(Self {
            adapter,
            name,
            done: false,
        })
    }

    /// A savepoint with a generated name.
    pub async fn anonymous(adapter: &'a A) -> DbResult<Self> {
        Self::create(adapter, next_savepoint_name()).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `RELEASE SAVEPOINT`: keep the changes made since the savepoint.
    pub async fn release(mut self) -> DbResult<()> {
        self.done = true;
        self.adapter.release_savepoint(&self.name).await
    }

    /// `ROLLBACK TO SAVEPOINT`: undo the changes made since the savepoint.
    pub async fn rollback(mut self) -> DbResult<()> {
        self.done = true;
        self.adapter.rollback_to_savepoint(&self.name).await
    }

    /// Release on `Ok`, roll back on `Err`; the block's result is passed through.
    pub async fn finish<T>(self, result: DbResult<T>) -> DbResult<T> {
        match result {
            Ok(value) => {
                self.release().await?;
                Ok(value)
            }
            Err(error) => {
                let name = self.name.clone();
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!(
                        target: "qforge.sql",
                        savepoint = %name,
                        %error,
                        %rollback_err,
                        "savepoint rollback failed"
                    );
                }
                Err(error)
            }
        }
    }
}

impl<A: Adapter> Drop for Savepoint<'_, A> {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(
                target: "qforge.sql",
                "Savepoint '{}' dropped without explicit release or rollback",
                self.name,
            );
        }
    }
}
