//! Condition trees for WHERE / HAVING / ON.
//!
//! A [`ConditionTree`] is a flat, ordered list of entries: conditions and explicit
//! group open/close markers, each tagged with the logic keyword that joins it to what
//! came before. Compiling walks the list once:
//!
//! - no keyword before the first entry, nor right after `(`;
//! - a close marker emits `)` and never a keyword;
//! - markers must balance, otherwise compilation fails.
//!
//! ```ignore
//! // WHERE ("a" = 1 OR "b" = 2) AND "c" = 3
//! qb::select_from("t")
//!     .where_open()
//!         .where_("a", "=", 1)
//!         .or_where("b", "=", 2)
//!     .where_close()
//!     .and_where("c", "=", 3);
//! ```

use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::qb::param::Params;

/// How an entry is joined to the entry before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    pub fn keyword(self) -> &'static str {
        match self {
            Logic::And => "AND",
            Logic::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Open,
    Close,
    Cond(Condition),
}

/// Ordered condition list with explicit grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionTree {
    entries: Vec<(Logic, Entry)>,
}

impl ConditionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append a condition.
    pub fn push(&mut self, logic: Logic, condition: Condition) {
        self.entries.push((logic, Entry::Cond(condition)));
    }

    /// Open a parenthesised group.
    pub fn open(&mut self, logic: Logic) {
        self.entries.push((logic, Entry::Open));
    }

    /// Close the innermost open group.
    pub fn close(&mut self, logic: Logic) {
        self.entries.push((logic, Entry::Close));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render the tree; empty trees render as an empty string.
    pub fn compile(&self, dialect: &dyn Dialect) -> DbResult<String> {
        let mut out = String::new();
        let mut depth = 0usize;
        let mut group_start = true;

        for (logic, entry) in &self.entries {
            match entry {
                Entry::Open => {
                    if !group_start {
                        out.push(' ');
                        out.push_str(logic.keyword());
                        out.push(' ');
                    }
                    out.push('(');
                    depth += 1;
                    group_start = true;
                }
                Entry::Close => {
                    if depth == 0 {
                        return Err(DbError::compile("closing a condition group that was never opened"));
                    }
                    if group_start {
                        return Err(DbError::compile("empty condition group"));
                    }
                    out.push(')');
                    depth -= 1;
                    group_start = false;
                }
                Entry::Cond(condition) => {
                    if !group_start {
                        out.push(' ');
                        out.push_str(logic.keyword());
                        out.push(' ');
                    }
                    out.push_str(&condition.render(dialect)?);
                    group_start = false;
                }
            }
        }

        if depth != 0 {
            return Err(DbError::compile(format!(
                "{depth} condition group(s) left open"
            )));
        }
        Ok(out)
    }

    pub(crate) fn collect_params(&self, out: &mut Params) {
        for (_, entry) in &self.entries {
            if let Entry::Cond(condition) = entry {
                condition.collect_params(out);
            }
        }
    }
}

/// Generates the `where`-style method family over a [`ConditionTree`] field.
///
/// The builder must provide `fn record_error(&mut self, err: DbError)`.
macro_rules! condition_methods {
    (
        $tree:ident,
        $where_:ident, $and:ident, $or:ident,
        $open:ident, $and_open:ident, $or_open:ident,
        $close:ident, $and_close:ident, $or_close:ident $(,)?
    ) => {
        /// Add a condition joined with AND.
        pub fn $where_(
            self,
            column: impl $crate::condition::IntoColumn,
            op: impl $crate::condition::IntoOperator,
            value: impl Into<$crate::condition::Operand>,
        ) -> Self {
            self.$and(column, op, value)
        }

        /// Add a condition joined with AND.
        pub fn $and(
            mut self,
            column: impl $crate::condition::IntoColumn,
            op: impl $crate::condition::IntoOperator,
            value: impl Into<$crate::condition::Operand>,
        ) -> Self {
            match $crate::condition::Condition::new(column, op, value) {
                Ok(cond) => self.$tree.push($crate::qb::Logic::And, cond),
                Err(err) => self.record_error(err),
            }
            self
        }

        /// Add a condition joined with OR.
        pub fn $or(
            mut self,
            column: impl $crate::condition::IntoColumn,
            op: impl $crate::condition::IntoOperator,
            value: impl Into<$crate::condition::Operand>,
        ) -> Self {
            match $crate::condition::Condition::new(column, op, value) {
                Ok(cond) => self.$tree.push($crate::qb::Logic::Or, cond),
                Err(err) => self.record_error(err),
            }
            self
        }

        /// Open a group joined with AND.
        pub fn $open(self) -> Self {
            self.$and_open()
        }

        pub fn $and_open(mut self) -> Self {
            self.$tree.open($crate::qb::Logic::And);
            self
        }

        pub fn $or_open(mut self) -> Self {
            self.$tree.open($crate::qb::Logic::Or);
            self
        }

        /// Close the innermost group.
        pub fn $close(self) -> Self {
            self.$and_close()
        }

        pub fn $and_close(mut self) -> Self {
            self.$tree.close($crate::qb::Logic::And);
            self
        }

        pub fn $or_close(mut self) -> Self {
            self.$tree.close($crate::qb::Logic::Or);
            self
        }
    };
}

pub(crate) use condition_methods;

/// Comparison shorthands (`eq`, `gt`, `is_null`, ...) that AND a condition through
/// the builder's `$and` method.
macro_rules! comparison_shorthands {
    ($and:ident) => {
        /// `column = value` (`IS NULL` when `value` is null).
        pub fn eq(self, column: impl $crate::condition::IntoColumn, value: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::Eq, value)
        }

        /// `column <> value`.
        pub fn ne(self, column: impl $crate::condition::IntoColumn, value: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::NotEq, value)
        }

        pub fn gt(self, column: impl $crate::condition::IntoColumn, value: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::Gt, value)
        }

        pub fn gte(self, column: impl $crate::condition::IntoColumn, value: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::GtEq, value)
        }

        pub fn lt(self, column: impl $crate::condition::IntoColumn, value: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::Lt, value)
        }

        pub fn lte(self, column: impl $crate::condition::IntoColumn, value: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::LtEq, value)
        }

        pub fn like(self, column: impl $crate::condition::IntoColumn, pattern: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::Like, pattern)
        }

        /// Case-insensitive `LIKE`; plain `LIKE` on dialects without `ILIKE`.
        pub fn ilike(self, column: impl $crate::condition::IntoColumn, pattern: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::ILike, pattern)
        }

        pub fn in_list(self, column: impl $crate::condition::IntoColumn, values: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::In, values)
        }

        pub fn not_in(self, column: impl $crate::condition::IntoColumn, values: impl Into<$crate::condition::Operand>) -> Self {
            self.$and(column, $crate::condition::Operator::NotIn, values)
        }

        pub fn between(
            self,
            column: impl $crate::condition::IntoColumn,
            low: impl Into<$crate::condition::Operand>,
            high: impl Into<$crate::condition::Operand>,
        ) -> Self {
            self.$and(column, $crate::condition::Operator::Between, (low, high))
        }

        pub fn is_null(self, column: impl $crate::condition::IntoColumn) -> Self {
            self.$and(column, $crate::condition::Operator::Is, $crate::value::Value::Null)
        }

        pub fn is_not_null(self, column: impl $crate::condition::IntoColumn) -> Self {
            self.$and(column, $crate::condition::Operator::IsNot, $crate::value::Value::Null)
        }
    };
}

pub(crate) use comparison_shorthands;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Postgres;

    fn cond(col: &str, value: i32) -> Condition {
        Condition::new(col, "=", value).unwrap()
    }

    #[test]
    fn no_leading_keyword() {
        let mut tree = ConditionTree::new();
        tree.push(Logic::Or, cond("a", 1));
        tree.push(Logic::And, cond("b", 2));
        assert_eq!(tree.compile(&Postgres).unwrap(), r#""a" = 1 AND "b" = 2"#);
    }

    #[test]
    fn no_keyword_after_open() {
        let mut tree = ConditionTree::new();
        tree.push(Logic::And, cond("a", 1));
        tree.open(Logic::Or);
        tree.push(Logic::Or, cond("b", 2));
        tree.push(Logic::And, cond("c", 3));
        tree.close(Logic::And);
        assert_eq!(
            tree.compile(&Postgres).unwrap(),
            r#""a" = 1 OR ("b" = 2 AND "c" = 3)"#
        );
    }

    #[test]
    fn nested_groups() {
        let mut tree = ConditionTree::new();
        tree.open(Logic::And);
        tree.open(Logic::And);
        tree.push(Logic::And, cond("a", 1));
        tree.close(Logic::And);
        tree.push(Logic::Or, cond("b", 2));
        tree.close(Logic::And);
        assert_eq!(tree.compile(&Postgres).unwrap(), r#"(("a" = 1) OR "b" = 2)"#);
    }

    #[test]
    fn empty_tree_is_empty_string() {
        assert_eq!(ConditionTree::new().compile(&Postgres).unwrap(), "");
    }

    #[test]
    fn unbalanced_groups_fail() {
        let mut open = ConditionTree::new();
        open.open(Logic::And);
        open.push(Logic::And, cond("a", 1));
        assert!(matches!(open.compile(&Postgres), Err(DbError::Compile(_))));

        let mut close = ConditionTree::new();
        close.push(Logic::And, cond("a", 1));
        close.close(Logic::And);
        assert!(matches!(close.compile(&Postgres), Err(DbError::Compile(_))));

        let mut empty = ConditionTree::new();
        empty.open(Logic::And);
        empty.close(Logic::And);
        assert!(empty.compile(&Postgres).is_err());
    }
}
