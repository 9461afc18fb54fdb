//! Buffered, read-only result sets.
//!
//! A [`ResultSet`] owns every row of a SELECT (drivers are drained up front), so
//! positional access is O(1) and the cursor can be rewound or seeked freely. The row
//! mode is fixed by the type parameter: `ResultSet<Row>` is associative,
//! `ResultSet<T: FromRow>` hydrates each row into `T` when the set is built.
//!
//! There is no mutable accessor: the set cannot be written through.

use crate::cache::CachedRows;
use crate::error::{DbError, DbResult};
use crate::row::{FromRow, Row};
use crate::value::{FromValue, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where the cursor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing read yet; the next `next()` yields row 0.
    Unconsumed,
    /// `current()` is the last row read or seeked to.
    Iterating,
    /// Iteration ran past the last row.
    Exhausted,
}

/// Read-only cursor over a buffered result.
#[derive(Debug, Clone)]
pub struct ResultSet<R = Row> {
    columns: Arc<[String]>,
    raw: Vec<Row>,
    items: Vec<R>,
    position: usize,
    state: CursorState,
}

impl<R: FromRow> ResultSet<R> {
    /// Build from column names and raw values, hydrating every row.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> DbResult<Self> {
        let columns: Arc<[String]> = Arc::from(columns);
        let raw = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect::<DbResult<Vec<_>>>()?;
        let items = raw.iter().map(R::from_row).collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            columns,
            raw,
            items,
            position: 0,
            state: CursorState::Unconsumed,
        })
    }

    /// Rebuild from a cached buffer.
    pub fn from_cached(cached: &CachedRows) -> DbResult<Self> {
        Self::from_parts(cached.columns.clone(), cached.rows.clone())
    }
}

impl<R> ResultSet<R> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Index of the current row, `None` before the first read or after the end.
    pub fn position(&self) -> Option<usize> {
        match self.state {
            CursorState::Iterating => Some(self.position),
            _ => None,
        }
    }

    /// The current row. Before any read this is the first row.
    pub fn current(&self) -> Option<&R> {
        match self.state {
            CursorState::Exhausted => None,
            _ => self.items.get(self.position),
        }
    }

    /// Move the cursor to `index`. Returns `false` (cursor unchanged) if out of range.
    pub fn seek(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.position = index;
        self.state = CursorState::Iterating;
        true
    }

    /// Row at `index`, without moving the cursor.
    pub fn get(&self, index: usize) -> Option<&R> {
        self.items.get(index)
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.state = CursorState::Unconsumed;
    }

    /// All rows, ignoring the cursor.
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<R> {
        self.items
    }

    /// Raw rows, regardless of the row mode.
    pub fn rows(&self) -> &[Row] {
        &self.raw
    }

    fn column_index(&self, column: &str) -> DbResult<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DbError::usage(format!("result has no column '{column}'")))
    }

    fn cell<'r>(row: &'r Row, column: &str, idx: usize) -> DbResult<&'r Value> {
        row.values()
            .get(idx)
            .ok_or_else(|| DbError::decode(column, "row is shorter than the result columns"))
    }

    fn decode<V: FromValue>(column: &str, value: &Value) -> DbResult<V> {
        V::from_value(value).ok_or_else(|| {
            DbError::decode(
                column,
                format!(
                    "cannot convert {} to {}",
                    value.type_name(),
                    std::any::type_name::<V>()
                ),
            )
        })
    }

    /// Every value of one column, in row order.
    pub fn column_values<V: FromValue>(&self, column: &str) -> DbResult<Vec<V>> {
        let idx = self.column_index(column)?;
        self.raw
            .iter()
            .map(|row| Self::decode(column, Self::cell(row, column, idx)?))
            .collect()
    }

    /// `column` of the current row; `None` when there is no current row.
    pub fn get_value<V: FromValue>(&self, column: &str) -> DbResult<Option<V>> {
        let idx = self.column_index(column)?;
        if self.state == CursorState::Exhausted {
            return Ok(None);
        }
        match self.raw.get(self.position) {
            Some(row) => Self::decode(column, Self::cell(row, column, idx)?).map(Some),
            None => Ok(None),
        }
    }

    /// `key column → value column`. Later rows win on duplicate keys.
    pub fn as_value_map<K, V>(&self, key: &str, value: &str) -> DbResult<BTreeMap<K, V>>
    where
        K: FromValue + Ord,
        V: FromValue,
    {
        let k = self.column_index(key)?;
        let v = self.column_index(value)?;
        self.raw
            .iter()
            .map(|row| {
                Ok((
                    Self::decode(key, Self::cell(row, key, k)?)?,
                    Self::decode(value, Self::cell(row, value, v)?)?,
                ))
            })
            .collect()
    }

    /// Buffer that can be stored in a [`QueryCache`](crate::QueryCache) or serialized.
    pub fn to_cached(&self) -> CachedRows {
        CachedRows {
            columns: self.columns.to_vec(),
            rows: self.raw.iter().map(|r| r.values().to_vec()).collect(),
        }
    }
}

impl<R: Clone> ResultSet<R> {
    pub fn as_vec(&self) -> Vec<R> {
        self.items.clone()
    }

    /// Rows keyed by `key` column. Later rows win on duplicate keys.
    pub fn as_map<K: FromValue + Ord>(&self, key: &str) -> DbResult<BTreeMap<K, R>> {
        let k = self.column_index(key)?;
        self.raw
            .iter()
            .zip(&self.items)
            .map(|(row, item)| Ok((Self::decode(key, Self::cell(row, key, k)?)?, item.clone())))
            .collect()
    }
}

impl<R: Clone> Iterator for ResultSet<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        match self.state {
            CursorState::Unconsumed => self.position = 0,
            CursorState::Iterating => self.position += 1,
            CursorState::Exhausted => return None,
        }
        match self.items.get(self.position) {
            Some(item) => {
                self.state = CursorState::Iterating;
                Some(item.clone())
            }
            None => {
                self.state = CursorState::Exhausted;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.state {
            CursorState::Unconsumed => self.items.len(),
            CursorState::Iterating => self.items.len().saturating_sub(self.position + 1),
            CursorState::Exhausted => 0,
        };
        (remaining, Some(remaining))
    }
}

impl<'a, R> IntoIterator for &'a ResultSet<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> ResultSet {
        ResultSet::from_parts(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int(1), Value::Text("ann".into())],
                vec![Value::Int(2), Value::Text("bob".into())],
                vec![Value::Int(3), Value::Text("cy".into())],
            ],
        )
        .unwrap()
    }

    #[test]
    fn cursor_lifecycle() {
        let mut rs = people();
        assert_eq!(rs.state(), CursorState::Unconsumed);
        assert_eq!(rs.position(), None);
        assert_eq!(rs.current().unwrap().try_get::<i64>("id").unwrap(), 1);

        let ids: Vec<i64> = rs.by_ref().map(|r| r.try_get("id").unwrap()).collect();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(rs.state(), CursorState::Exhausted);
        assert!(rs.current().is_none());
        assert!(rs.next().is_none());

        rs.rewind();
        assert_eq!(rs.state(), CursorState::Unconsumed);
        assert_eq!(rs.len(), 3);
        assert_eq!(rs.count(), 3);
    }

    #[test]
    fn seek_and_positional_access() {
        let mut rs = people();
        assert!(rs.seek(2));
        assert_eq!(rs.position(), Some(2));
        assert_eq!(rs.get_value::<String>("name").unwrap().as_deref(), Some("cy"));
        assert!(!rs.seek(3));
        assert_eq!(rs.position(), Some(2));
        assert_eq!(rs.get(0).unwrap().try_get::<String>("name").unwrap(), "ann");
        assert!(rs.get(9).is_none());
    }

    #[test]
    fn seek_then_next_continues() {
        let mut rs = people();
        rs.seek(0);
        let next = rs.next().unwrap();
        assert_eq!(next.try_get::<i64>("id").unwrap(), 2);
    }

    #[test]
    fn maps_and_columns() {
        let rs = people();
        let names: BTreeMap<i64, String> = rs.as_value_map("id", "name").unwrap();
        assert_eq!(names.get(&2).map(String::as_str), Some("bob"));
        let by_name = rs.as_map::<String>("name").unwrap();
        assert_eq!(by_name["cy"].try_get::<i64>("id").unwrap(), 3);
        assert_eq!(rs.column_values::<i64>("id").unwrap(), [1, 2, 3]);
        assert!(rs.column_values::<i64>("nope").unwrap_err().is_usage());
    }

    #[test]
    fn empty_result() {
        let mut rs: ResultSet = ResultSet::from_parts(vec!["id".into()], vec![]).unwrap();
        assert!(rs.is_empty());
        assert!(rs.current().is_none());
        assert_eq!(rs.get_value::<i64>("id").unwrap(), None);
        assert!(rs.next().is_none());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = ResultSet::<Row>::from_parts(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Int(1)]],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Decode { ref column, .. } if column == "b"));

        let cached: CachedRows =
            serde_json::from_str(r#"{"columns":["a"],"rows":[[{"Int":1}],[]]}"#).unwrap();
        assert!(ResultSet::<Row>::from_cached(&cached).is_err());
    }

    #[test]
    fn hydrated_mode() {
        #[derive(Clone, Debug, PartialEq)]
        struct Person {
            id: i64,
        }
        impl FromRow for Person {
            fn from_row(row: &Row) -> DbResult<Self> {
                Ok(Self { id: row.try_get("id")? })
            }
        }
        let cached = people().to_cached();
        let rs = ResultSet::<Person>::from_cached(&cached).unwrap();
        assert_eq!(rs.as_vec(), vec![Person { id: 1 }, Person { id: 2 }, Person { id: 3 }]);
    }
}
