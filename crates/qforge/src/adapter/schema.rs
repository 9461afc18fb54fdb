//! Schema introspection results and their per-adapter memo.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as the database spells it (`integer`, `character varying`, `TEXT`).
    pub data_type: String,
    pub nullable: bool,
    /// Default expression, verbatim.
    pub default: Option<String>,
    /// 1-based position in the table.
    pub ordinal: u32,
    pub primary_key: bool,
}

type ColumnMap = Arc<BTreeMap<String, ColumnInfo>>;

#[derive(Debug, Default)]
struct SchemaCacheInner {
    tables: HashMap<Option<String>, Arc<Vec<String>>>,
    columns: HashMap<(String, Option<String>), ColumnMap>,
}

/// Memoized introspection keyed by `(table, pattern)`. Never invalidated
/// automatically; call [`SchemaCache::clear`] after DDL.
#[derive(Debug, Default)]
pub struct SchemaCache {
    inner: Mutex<SchemaCacheInner>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SchemaCacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tables(&self, pattern: Option<&str>) -> Option<Arc<Vec<String>>> {
        self.lock().tables.get(&pattern.map(str::to_string)).cloned()
    }

    pub fn put_tables(&self, pattern: Option<&str>, tables: Arc<Vec<String>>) {
        self.lock().tables.insert(pattern.map(str::to_string), tables);
    }

    pub fn columns(&self, table: &str, pattern: Option<&str>) -> Option<ColumnMap> {
        self.lock()
            .columns
            .get(&(table.to_string(), pattern.map(str::to_string)))
            .cloned()
    }

    pub fn put_columns(&self, table: &str, pattern: Option<&str>, columns: ColumnMap) {
        self.lock()
            .columns
            .insert((table.to_string(), pattern.map(str::to_string)), columns);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.tables.clear();
        inner.columns.clear();
    }
}
