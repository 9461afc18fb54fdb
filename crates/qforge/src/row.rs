//! Rows and row mapping.
//!
//! Every adapter decodes driver rows into [`Row`]: shared column names plus one
//! [`Value`] per column. [`FromRow`] maps a `Row` into something richer.

use crate::error::{DbError, DbResult};
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// An associative row: column names (shared across the result) and values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Fails when `values` does not hold exactly one value per column.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> DbResult<Self> {
        if columns.len() != values.len() {
            let column = columns
                .get(values.len())
                .cloned()
                .unwrap_or_else(|| format!("#{}", columns.len()));
            return Err(DbError::decode(
                column,
                format!("row has {} values for {} columns", values.len(), columns.len()),
            ));
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of `column`; the first match wins when names repeat.
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Raw value of `column`.
    pub fn get_value(&self, column: &str) -> Option<&Value> {
        self.index_of(column).and_then(|i| self.values.get(i))
    }

    /// Typed value of `column`.
    pub fn try_get<T: FromValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get_value(column)
            .ok_or_else(|| DbError::decode(column, "no such column"))?;
        T::from_value(value).ok_or_else(|| {
            DbError::decode(
                column,
                format!(
                    "cannot convert {} to {}",
                    value.type_name(),
                    std::any::type_name::<T>()
                ),
            )
        })
    }

    /// Typed value at `index`.
    pub fn try_get_idx<T: FromValue>(&self, index: usize) -> DbResult<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| DbError::decode(index.to_string(), "column index out of range"))?;
        T::from_value(value).ok_or_else(|| {
            let column = self.columns.get(index).cloned().unwrap_or_default();
            DbError::decode(column, format!("cannot convert {}", value.type_name()))
        })
    }

    /// The row as a JSON object.
    pub fn to_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), value_to_json(v)))
            .collect()
    }

    /// Deserialize the row (as a JSON object) into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(serde_json::Value::Object(self.to_json()))?)
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Int(i) => J::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(J::Null, J::Number),
        Value::Text(s) => J::String(s.clone()),
        Value::Bytes(b) => J::from(b.clone()),
        Value::Json(j) => j.clone(),
        Value::Uuid(u) => J::String(u.to_string()),
        // Same shapes chrono's serde impls accept back.
        Value::Timestamp(t) => J::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Value::Date(d) => J::String(d.format("%Y-%m-%d").to_string()),
    }
}

/// Map a [`Row`] into a Rust type.
///
/// ```ignore
/// struct User { id: i64, name: String }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> DbResult<Self> {
///         Ok(Self { id: row.try_get("id")?, name: row.try_get("name")? })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> DbResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(row.clone())
    }
}

impl FromRow for serde_json::Map<String, serde_json::Value> {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(row.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn row() -> Row {
        Row::new(
            Arc::from(vec!["id".to_string(), "name".to_string(), "score".to_string()]),
            vec![Value::Int(1), Value::Text("ann".into()), Value::Null],
        )
        .unwrap()
    }

    #[test]
    fn width_must_match_columns() {
        let columns: Arc<[String]> = Arc::from(vec!["a".to_string(), "b".to_string()]);
        let err = Row::new(Arc::clone(&columns), vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, DbError::Decode { ref column, .. } if column == "b"));

        let err = Row::new(columns, vec![Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap_err();
        assert!(matches!(err, DbError::Decode { ref column, .. } if column == "#2"));
    }

    #[test]
    fn typed_access() {
        let r = row();
        assert_eq!(r.try_get::<i64>("id").unwrap(), 1);
        assert_eq!(r.try_get::<String>("name").unwrap(), "ann");
        assert_eq!(r.try_get::<Option<f64>>("score").unwrap(), None);
        assert_eq!(r.try_get_idx::<i32>(0).unwrap(), 1);
    }

    #[test]
    fn decode_errors_name_the_column() {
        let err = row().try_get::<i64>("name").unwrap_err();
        assert!(matches!(err, DbError::Decode { ref column, .. } if column == "name"));
        assert!(row().try_get::<i64>("missing").is_err());
    }

    #[test]
    fn deserializes_through_json() {
        #[derive(Deserialize)]
        struct User {
            id: i64,
            name: String,
            score: Option<f64>,
        }
        let user: User = row().deserialize().unwrap();
        assert_eq!((user.id, user.name.as_str(), user.score), (1, "ann", None));
    }
}
