//! JOIN clauses.

use crate::condition::{Condition, IntoColumn, IntoOperator, Operand, TableRef};
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::{Ident, IntoIdent};
use crate::qb::expr::{ConditionTree, Logic};
use crate::qb::param::Params;

/// Join type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum JoinPredicate {
    On(ConditionTree),
    Using(Vec<Ident>),
}

/// One `<KIND> JOIN <table> [ON ... | USING (...)]` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    table: TableRef,
    kind: JoinKind,
    predicate: Option<JoinPredicate>,
}

impl JoinClause {
    pub fn new(table: TableRef, kind: JoinKind) -> Self {
        Self {
            table,
            kind,
            predicate: None,
        }
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    /// AND-chain a column-to-column predicate.
    pub fn on(
        &mut self,
        left: impl IntoColumn,
        op: impl IntoOperator,
        right: impl IntoColumn,
    ) -> DbResult<()> {
        let condition = Condition::new(left, op, Operand::column(right)?)?;
        match &mut self.predicate {
            Some(JoinPredicate::Using(_)) => {
                Err(DbError::usage("JOIN ... ON cannot be combined with USING"))
            }
            Some(JoinPredicate::On(tree)) => {
                tree.push(Logic::And, condition);
                Ok(())
            }
            None => {
                let mut tree = ConditionTree::new();
                tree.push(Logic::And, condition);
                self.predicate = Some(JoinPredicate::On(tree));
                Ok(())
            }
        }
    }

    /// Join on equally named columns.
    pub fn using<I: IntoIdent>(&mut self, columns: impl IntoIterator<Item = I>) -> DbResult<()> {
        let columns = columns
            .into_iter()
            .map(IntoIdent::into_ident)
            .collect::<DbResult<Vec<_>>>()?;
        match &mut self.predicate {
            Some(JoinPredicate::On(_)) => {
                Err(DbError::usage("JOIN ... USING cannot be combined with ON"))
            }
            Some(JoinPredicate::Using(existing)) => {
                existing.extend(columns);
                Ok(())
            }
            None => {
                self.predicate = Some(JoinPredicate::Using(columns));
                Ok(())
            }
        }
    }

    pub(crate) fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        let mut sql = format!("{} {}", self.kind.keyword(), self.table.render(dialect)?);
        match &self.predicate {
            Some(JoinPredicate::On(tree)) => {
                sql.push_str(" ON (");
                sql.push_str(&tree.compile(dialect)?);
                sql.push(')');
            }
            Some(JoinPredicate::Using(columns)) => {
                let cols: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
                sql.push_str(" USING (");
                sql.push_str(&cols.join(", "));
                sql.push(')');
            }
            None => {}
        }
        Ok(sql)
    }

    pub(crate) fn collect_params(&self, out: &mut Params) {
        self.table.collect_params(out);
        if let Some(JoinPredicate::On(tree)) = &self.predicate {
            tree.collect_params(out);
        }
    }
}
