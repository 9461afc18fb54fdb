//! Trait shared by the statement builders.

use crate::adapter::{Adapter, QueryKind};
use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::qb::Params;
use crate::query::{Outcome, Query};

/// A statement builder that compiles to SQL with `:name` placeholders.
///
/// Building is pure; only [`SqlQb::execute`] touches an adapter.
pub trait SqlQb: Sync {
    /// Statement kind reported to the adapter.
    fn kind(&self) -> QueryKind;

    /// Render the statement for `dialect`. Literals are inlined as escaped text;
    /// named parameters stay as `:name` until execution. Fails with the first
    /// error recorded while building.
    fn compile(&self, dialect: &dyn Dialect) -> DbResult<String>;

    /// Parameters of the statement and every nested subquery. Values set on the
    /// outer statement win over nested ones of the same name.
    fn params(&self) -> Params;

    /// The error recorded while building, if any.
    fn build_error(&self) -> Option<&str>;

    /// An executable [`Query`] for `dialect`.
    fn to_query(&self, dialect: &dyn Dialect) -> DbResult<Query> {
        Ok(Query::with_params(self.kind(), self.compile(dialect)?, self.params()))
    }

    /// Compile for the adapter's dialect and run.
    fn execute<A: Adapter>(
        &self,
        adapter: &A,
    ) -> impl std::future::Future<Output = DbResult<Outcome>> + Send {
        async move { self.to_query(adapter.dialect())?.execute(adapter).await }
    }
}
