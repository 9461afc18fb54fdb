//! Condition primitives shared by all builders.
//!
//! A [`Condition`] is `column OPERATOR operand`. Columns go through the identifier
//! parser (or are an explicit [`Expression`]); operands are resolved once, at the API
//! boundary, into an [`Operand`] so the compiler never guesses how to render a value.

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::ident::{Ident, IntoIdent};
use crate::qb::{Params, SelectQb};
use crate::sql::Expression;
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    /// `!=` and `<>` both parse to this; it renders as `<>`.
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Like,
    NotLike,
    /// Rendered as `LIKE` on dialects without `ILIKE`.
    ILike,
    NotILike,
    In,
    NotIn,
    Between,
    NotBetween,
    Is,
    IsNot,
}

impl Operator {
    /// Canonical keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::LtEq => "<=",
            Operator::GtEq => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
        }
    }

    /// Keyword as rendered for `dialect`.
    pub fn as_sql(self, dialect: &dyn Dialect) -> &'static str {
        match self {
            Operator::ILike if !dialect.supports_ilike() => "LIKE",
            Operator::NotILike if !dialect.supports_ilike() => "NOT LIKE",
            op => op.keyword(),
        }
    }

    fn is_range(self) -> bool {
        matches!(self, Operator::Between | Operator::NotBetween)
    }

    fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        let op = match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::LtEq,
            ">=" => Operator::GtEq,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "ILIKE" => Operator::ILike,
            "NOT ILIKE" => Operator::NotILike,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "BETWEEN" => Operator::Between,
            "NOT BETWEEN" => Operator::NotBetween,
            "IS" => Operator::Is,
            "IS NOT" => Operator::IsNot,
            _ => return Err(DbError::usage(format!("Unknown operator '{s}'"))),
        };
        Ok(op)
    }
}

/// Accepts an [`Operator`] or its textual form in builder signatures.
pub trait IntoOperator {
    fn into_operator(self) -> DbResult<Operator>;
}

impl IntoOperator for Operator {
    fn into_operator(self) -> DbResult<Operator> {
        Ok(self)
    }
}

impl IntoOperator for &str {
    fn into_operator(self) -> DbResult<Operator> {
        self.parse()
    }
}

impl IntoOperator for String {
    fn into_operator(self) -> DbResult<Operator> {
        self.parse()
    }
}

/// The right-hand side of a condition, assignment, or value row.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Escaped by the dialect at compile time.
    Literal(Value),
    /// Inserted verbatim.
    Expr(Expression),
    /// Compiled and parenthesised.
    Subquery(Box<SelectQb>),
    /// Another column, quoted like any identifier.
    Column(ColumnRef),
    /// Named placeholder, bound at execution time.
    Param(String),
    /// Parenthesised, comma-separated operands (`IN`) or a `BETWEEN` pair.
    List(Vec<Operand>),
}

impl Operand {
    /// Reference a named parameter (`"id"` or `":id"`).
    pub fn param(name: &str) -> Self {
        Operand::Param(name.strip_prefix(':').unwrap_or(name).to_string())
    }

    /// Compare against another column instead of a value.
    pub fn column(column: impl IntoColumn) -> DbResult<Self> {
        Ok(Operand::Column(column.into_column()?))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Literal(Value::Null))
    }

    pub(crate) fn render(&self, dialect: &dyn Dialect) -> DbResult<String> {
        match self {
            Operand::Literal(value) => Ok(dialect.quote_literal(value)),
            Operand::Expr(e) => Ok(e.compile(dialect)),
            Operand::Subquery(sub) => Ok(format!("({})", sub.compile(dialect)?)),
            Operand::Column(column) => Ok(column.render(dialect)),
            Operand::Param(name) => Ok(format!(":{name}")),
            Operand::List(items) => {
                let rendered = items
                    .iter()
                    .map(|item| item.render(dialect))
                    .collect::<DbResult<Vec<_>>>()?;
                Ok(format!("({})", rendered.join(", ")))
            }
        }
    }

    pub(crate) fn collect_params(&self, out: &mut Params) {
        match self {
            Operand::Subquery(sub) => sub.collect_params(out),
            Operand::List(items) => items.iter().for_each(|item| item.collect_params(out)),
            _ => {}
        }
    }
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Literal(v.into())
                }
            }
        )*
    };
}

operand_from_value!(
    Value,
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    String,
    &str,
    &String,
    serde_json::Value,
    uuid::Uuid,
    chrono::NaiveDateTime,
    chrono::NaiveDate,
    chrono::DateTime<chrono::Utc>,
);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Literal(v.into())
    }
}

impl From<Expression> for Operand {
    fn from(e: Expression) -> Self {
        Operand::Expr(e)
    }
}

impl From<SelectQb> for Operand {
    fn from(q: SelectQb) -> Self {
        Operand::Subquery(Box::new(q))
    }
}

impl<T: Into<Operand>> From<Vec<T>> for Operand {
    fn from(items: Vec<T>) -> Self {
        Operand::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Operand>, const N: usize> From<[T; N]> for Operand {
    fn from(items: [T; N]) -> Self {
        Operand::List(items.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Operand>, B: Into<Operand>> From<(A, B)> for Operand {
    fn from((a, b): (A, B)) -> Self {
        Operand::List(vec![a.into(), b.into()])
    }
}

/// A selectable / comparable column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRef {
    Name(Ident),
    Expr(Expression),
    Aliased(Box<ColumnRef>, String),
}

impl ColumnRef {
    pub(crate) fn render(&self, dialect: &dyn Dialect) -> String {
        match self {
            ColumnRef::Name(ident) => dialect.quote_ident(ident),
            ColumnRef::Expr(e) => e.compile(dialect),
            ColumnRef::Aliased(inner, alias) => format!(
                "{} AS {}",
                inner.render(dialect),
                dialect.quote_identifier(alias)
            ),
        }
    }
}

/// Convert an input into a [`ColumnRef`].
///
/// Strings are parsed as identifiers (`name`, `t.name`, `"Odd Name"`, `t.*`); raw SQL
/// must be passed as an [`Expression`].
pub trait IntoColumn {
    fn into_column(self) -> DbResult<ColumnRef>;
}

impl IntoColumn for ColumnRef {
    fn into_column(self) -> DbResult<ColumnRef> {
        Ok(self)
    }
}

impl IntoColumn for Ident {
    fn into_column(self) -> DbResult<ColumnRef> {
        Ok(ColumnRef::Name(self))
    }
}

impl IntoColumn for &str {
    fn into_column(self) -> DbResult<ColumnRef> {
        Ok(ColumnRef::Name(self.into_ident()?))
    }
}

impl IntoColumn for String {
    fn into_column(self) -> DbResult<ColumnRef> {
        Ok(ColumnRef::Name(self.into_ident()?))
    }
}

impl IntoColumn for &String {
    fn into_column(self) -> DbResult<ColumnRef> {
        Ok(ColumnRef::Name(self.into_ident()?))
    }
}

impl IntoColumn for Expression {
    fn into_column(self) -> DbResult<ColumnRef> {
        Ok(ColumnRef::Expr(self))
    }
}

impl<C: IntoColumn> IntoColumn for (C, &str) {
    fn into_column(self) -> DbResult<ColumnRef> {
        let (column, alias) = self;
        if alias.is_empty() {
            return Err(DbError::usage("Empty column alias"));
        }
        Ok(ColumnRef::Aliased(Box::new(column.into_column()?), alias.to_string()))
    }
}

/// A FROM / JOIN source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Name(Ident, Option<String>),
    Subquery(Box<SelectQb>, String),
    Expr(Expression),
}

impl TableRef {
    pub(crate) fn render(&self, dialect: &dyn Dialect) -> DbResult<String> {
        match self {
            TableRef::Name(ident, None) => Ok(dialect.quote_ident(ident)),
            TableRef::Name(ident, Some(alias)) => Ok(format!(
                "{} AS {}",
                dialect.quote_ident(ident),
                dialect.quote_identifier(alias)
            )),
            TableRef::Subquery(sub, alias) => Ok(format!(
                "({}) AS {}",
                sub.compile(dialect)?,
                dialect.quote_identifier(alias)
            )),
            TableRef::Expr(e) => Ok(e.compile(dialect)),
        }
    }

    pub(crate) fn collect_params(&self, out: &mut Params) {
        if let TableRef::Subquery(sub, _) = self {
            sub.collect_params(out);
        }
    }
}

/// Convert an input into a [`TableRef`].
pub trait IntoTable {
    fn into_table(self) -> DbResult<TableRef>;
}

impl IntoTable for TableRef {
    fn into_table(self) -> DbResult<TableRef> {
        Ok(self)
    }
}

impl IntoTable for Ident {
    fn into_table(self) -> DbResult<TableRef> {
        Ok(TableRef::Name(self, None))
    }
}

impl IntoTable for &str {
    fn into_table(self) -> DbResult<TableRef> {
        Ok(TableRef::Name(self.into_ident()?, None))
    }
}

impl IntoTable for String {
    fn into_table(self) -> DbResult<TableRef> {
        Ok(TableRef::Name(self.into_ident()?, None))
    }
}

impl IntoTable for &String {
    fn into_table(self) -> DbResult<TableRef> {
        Ok(TableRef::Name(self.into_ident()?, None))
    }
}

impl IntoTable for Expression {
    fn into_table(self) -> DbResult<TableRef> {
        Ok(TableRef::Expr(self))
    }
}

impl IntoTable for (&str, &str) {
    fn into_table(self) -> DbResult<TableRef> {
        let (table, alias) = self;
        if alias.is_empty() {
            return Err(DbError::usage("Empty table alias"));
        }
        Ok(TableRef::Name(table.into_ident()?, Some(alias.to_string())))
    }
}

impl IntoTable for (SelectQb, &str) {
    fn into_table(self) -> DbResult<TableRef> {
        let (sub, alias) = self;
        if alias.is_empty() {
            return Err(DbError::usage("A subquery in FROM needs an alias"));
        }
        Ok(TableRef::Subquery(Box::new(sub), alias.to_string()))
    }
}

/// A single `column OPERATOR operand` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    column: ColumnRef,
    op: Operator,
    value: Operand,
}

impl Condition {
    /// Build a condition, validating the operator/operand combination.
    pub fn new(
        column: impl IntoColumn,
        op: impl IntoOperator,
        value: impl Into<Operand>,
    ) -> DbResult<Self> {
        let column = column.into_column()?;
        let op = op.into_operator()?;
        let value = value.into();
        if op.is_range() && !matches!(&value, Operand::List(items) if items.len() == 2) {
            return Err(DbError::usage(format!(
                "{} expects a two-element list",
                op.keyword()
            )));
        }
        Ok(Self { column, op, value })
    }

    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Operand {
        &self.value
    }

    pub(crate) fn render(&self, dialect: &dyn Dialect) -> DbResult<String> {
        let column = self.column.render(dialect);
        let op = match (self.op, self.value.is_null()) {
            (Operator::Eq, true) => Operator::Is,
            (Operator::NotEq, true) => Operator::IsNot,
            (op, _) => op,
        };
        let keyword = op.as_sql(dialect);

        if op.is_range() {
            if let Operand::List(items) = &self.value {
                if let [min, max] = items.as_slice() {
                    return Ok(format!(
                        "{column} {keyword} {} AND {}",
                        min.render(dialect)?,
                        max.render(dialect)?
                    ));
                }
            }
            return Err(DbError::usage(format!("{keyword} expects a two-element list")));
        }

        if op.is_membership() {
            let rendered = match &self.value {
                Operand::List(items) if items.is_empty() => {
                    // Nothing can be IN an empty set.
                    return Ok(if op == Operator::In { "1 = 0" } else { "1 = 1" }.to_string());
                }
                // A single value or placeholder still needs the parentheses.
                scalar @ (Operand::Literal(_) | Operand::Param(_) | Operand::Column(_)) => {
                    format!("({})", scalar.render(dialect)?)
                }
                other => other.render(dialect)?,
            };
            return Ok(format!("{column} {keyword} {rendered}"));
        }

        Ok(format!("{column} {keyword} {}", self.value.render(dialect)?))
    }

    pub(crate) fn collect_params(&self, out: &mut Params) {
        self.value.collect_params(out);
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}
