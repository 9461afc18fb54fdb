//! Result caching through a fake adapter that counts database round trips.

use qforge::{
    Adapter, DbResult, Dialect, QueryCache, QueryKind, QueryOutput, Sqlite, Value, qb, query,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

static NEXT_ID: AtomicU64 = AtomicU64::new(1_000);

#[derive(Debug)]
struct CountingAdapter {
    id: u64,
    calls: AtomicUsize,
    cache: Option<Arc<QueryCache>>,
}

impl CountingAdapter {
    fn new(cache: Option<Arc<QueryCache>>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            calls: AtomicUsize::new(0),
            cache,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Adapter for CountingAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &Sqlite
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    async fn connect(&self) -> DbResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn query(&self, kind: QueryKind, _sql: &str, params: &[Value]) -> DbResult<QueryOutput> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(match kind {
            QueryKind::Select => QueryOutput::Rows {
                columns: vec!["call".into(), "params".into()],
                rows: vec![vec![Value::Int(n as i64), Value::Int(params.len() as i64)]],
            },
            _ => QueryOutput::Affected(1),
        })
    }

    fn query_cache(&self) -> Option<&QueryCache> {
        self.cache.as_deref()
    }
}

fn cache() -> Option<Arc<QueryCache>> {
    Some(Arc::new(QueryCache::new(16)))
}

#[tokio::test]
async fn cached_select_hits_database_once_per_lifetime() -> DbResult<()> {
    let db = CountingAdapter::new(cache());
    let q = query(QueryKind::Select, "SELECT * FROM t").cached(Duration::from_millis(150), false);

    let first = q.fetch_one(&db).await?;
    let second = q.fetch_one(&db).await?;
    assert_eq!(db.calls(), 1);
    assert_eq!(first, second);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let third = q.fetch_one(&db).await?;
    assert_eq!(db.calls(), 2);
    assert_eq!(third.try_get::<i64>("call")?, 2);
    Ok(())
}

#[tokio::test]
async fn force_refreshes_entry() -> DbResult<()> {
    let db = CountingAdapter::new(cache());
    let q = query(QueryKind::Select, "SELECT 1");
    q.cached(Duration::from_secs(60), false).fetch(&db).await?;
    let forced = q.cached(Duration::from_secs(60), true).fetch_one(&db).await?;
    assert_eq!(forced.try_get::<i64>("call")?, 2);

    let reused = q.cached(Duration::from_secs(60), false).fetch_one(&db).await?;
    assert_eq!(reused.try_get::<i64>("call")?, 2);
    assert_eq!(db.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn uncached_and_non_select_always_run() -> DbResult<()> {
    let db = CountingAdapter::new(cache());
    let q = query(QueryKind::Select, "SELECT 1");
    q.fetch(&db).await?;
    q.fetch(&db).await?;
    assert_eq!(db.calls(), 2);

    let update = query(QueryKind::Update, "UPDATE t SET a = 1").cached(Duration::from_secs(60), false);
    update.execute(&db).await?;
    update.execute(&db).await?;
    assert_eq!(db.calls(), 4);

    let no_cache = CountingAdapter::new(None);
    let cached = query(QueryKind::Select, "SELECT 1").cached(Duration::from_secs(60), false);
    cached.fetch(&no_cache).await?;
    cached.fetch(&no_cache).await?;
    assert_eq!(no_cache.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn keys_include_instance_and_bound_values() -> DbResult<()> {
    let shared = cache();
    let a = CountingAdapter::new(shared.clone());
    let b = CountingAdapter::new(shared.clone());
    let by_id = query(QueryKind::Select, "SELECT * FROM t WHERE id = :id")
        .cached(Duration::from_secs(60), false);

    by_id.param("id", 1).fetch(&a).await?;
    by_id.param("id", 1).fetch(&a).await?;
    by_id.param("id", 2).fetch(&a).await?;
    assert_eq!(a.calls(), 2);

    let row = by_id.param("id", 1).fetch_one(&b).await?;
    assert_eq!(b.calls(), 1);
    assert_eq!(row.try_get::<i64>("params")?, 1);
    assert_eq!(shared.map(|c| c.len()), Some(3));
    Ok(())
}

#[tokio::test]
async fn builder_cache_policy_and_count() -> DbResult<()> {
    let db = CountingAdapter::new(cache());
    let select = qb::select_from("t")
        .eq("a", 1)
        .cached(Duration::from_secs(60), false);

    select.fetch(&db).await?;
    select.fetch(&db).await?;
    assert_eq!(db.calls(), 1);

    // COUNT(*) is a different statement, cached separately.
    assert_eq!(select.count(&db).await?, 2);
    assert_eq!(select.count(&db).await?, 2);
    assert_eq!(db.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn zero_lifetime_never_hits() -> DbResult<()> {
    let db = CountingAdapter::new(cache());
    let q = query(QueryKind::Select, "SELECT 1").cached(Duration::ZERO, false);
    q.fetch(&db).await?;
    q.fetch(&db).await?;
    assert_eq!(db.calls(), 2);
    Ok(())
}
