//! Raw SQL fragments.
//!
//! An [`Expression`] is inserted into compiled statements verbatim: it is never
//! quoted or escaped. Use it for function calls, arithmetic and anything else the
//! identifier parser rejects. Values belong in the expression's own parameters,
//! which are inlined as escaped literals when the expression is compiled.
//!
//! ```ignore
//! use qforge::{expr, qb};
//!
//! let recent = qb::select(["id"])
//!     .from("posts")
//!     .where_("created_at", ">", expr("NOW() - :age::interval").param("age", "7 days"));
//! ```

use crate::dialect::Dialect;
use crate::qb::Params;
use crate::value::Value;

/// A raw SQL fragment with its own named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    sql: String,
    params: Params,
}

/// Create an [`Expression`] from raw SQL.
pub fn expr(sql: impl Into<String>) -> Expression {
    Expression::new(sql)
}

impl Expression {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Attach a value for a `:name` placeholder inside this fragment.
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// The fragment as written.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Render with set parameters inlined; unknown placeholders are kept so an
    /// enclosing statement can still bind them.
    pub fn compile(&self, dialect: &dyn Dialect) -> String {
        self.params.substitute(&self.sql, dialect)
    }
}
