//! Postgres integration tests.
//!
//! Set `DATABASE_URL` (directly or in `.env`) to run them; without it every test
//! returns early.

use qforge::{
    Adapter, ConnectionConfig, DbResult, Operand, PgAdapter, QueryCache, SqlQb, Value, expr, qb,
};
use std::sync::Arc;
use std::time::Duration;

fn adapter() -> Option<PgAdapter> {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_url(&url).ok()?;
    Some(PgAdapter::new(config).with_cache(Arc::new(QueryCache::new(32))))
}

/// A per-test table name so tests can run concurrently.
fn table(name: &str) -> String {
    format!("qforge_{name}_{}", std::process::id())
}

async fn create(db: &PgAdapter, table: &str) -> DbResult<()> {
    let quoted = db.quote_table(table)?;
    db.execute_raw(&format!("DROP TABLE IF EXISTS {quoted}")).await?;
    db.execute_raw(&format!(
        "CREATE TABLE {quoted} (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            score NUMERIC(10, 2),
            tags JSONB,
            created_at TIMESTAMP NOT NULL DEFAULT NOW()
        )"
    ))
    .await
}

async fn drop_table(db: &PgAdapter, table: &str) -> DbResult<()> {
    let quoted = db.quote_table(table)?;
    db.execute_raw(&format!("DROP TABLE IF EXISTS {quoted}")).await
}

#[tokio::test]
async fn crud_round_trip() -> DbResult<()> {
    let Some(db) = adapter() else {
        return Ok(());
    };
    let t = table("crud");
    create(&db, &t).await?;

    let inserted = qb::insert(t.as_str())
        .columns(["name", "score", "tags"])
        .values([
            Operand::from("O'Brien"),
            Operand::from(12.5),
            Operand::from(serde_json::json!(["a", "b"])),
        ])?
        .returning(["id"])
        .execute(&db)
        .await?;
    let id = inserted.last_insert_id().expect("RETURNING id");

    // Multi-row inserts report the id of the last row, like SQLite's last_insert_rowid.
    let batch = qb::insert(t.as_str())
        .columns(["name"])
        .values(["b1"])?
        .values(["b2"])?
        .returning(["id"])
        .execute(&db)
        .await?;
    assert_eq!(batch.affected(), 2);
    assert_eq!(batch.last_insert_id(), Some(id + 2));

    let row = qb::select(["name", "score", "tags"])
        .from(t.as_str())
        .eq("id", Operand::param("id"))
        .param("id", id)
        .to_query(db.dialect())?
        .fetch_one(&db)
        .await?;
    assert_eq!(row.try_get::<String>("name")?, "O'Brien");
    assert_eq!(row.get_value("score"), Some(&Value::Text("12.50".into())));
    assert_eq!(row.try_get::<serde_json::Value>("tags")?, serde_json::json!(["a", "b"]));

    let updated = qb::update(t.as_str())
        .set("score", expr("score * 2"))
        .eq("id", id)
        .execute(&db)
        .await?;
    assert_eq!(updated.affected(), 1);

    let deleted = qb::delete(t.as_str()).eq("id", id).execute(&db).await?;
    assert_eq!(deleted.affected(), 1);

    drop_table(&db, &t).await
}

#[tokio::test]
async fn unique_violation_and_transactions() -> DbResult<()> {
    let Some(db) = adapter() else {
        return Ok(());
    };
    let t = table("tx");
    create(&db, &t).await?;

    qb::insert(t.as_str()).columns(["name"]).values(["ann"])?.execute(&db).await?;
    let err = qb::insert(t.as_str())
        .columns(["name"])
        .values(["ann"])?
        .execute(&db)
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    let failed: DbResult<()> = qforge::transaction!(&db, {
        qb::insert(t.as_str()).columns(["name"]).values(["bob"])?.execute(&db).await?;
        qb::insert(t.as_str()).columns(["name"]).values(["ann"])?.execute(&db).await?;
        Ok(())
    });
    assert!(failed.is_err());
    assert_eq!(qb::select_from(t.as_str()).count(&db).await?, 1);

    drop_table(&db, &t).await
}

#[tokio::test]
async fn introspection_and_cache() -> DbResult<()> {
    let Some(db) = adapter() else {
        return Ok(());
    };
    let t = table("meta");
    create(&db, &t).await?;

    let tables = db.list_tables(Some(&t)).await?;
    assert_eq!(tables.as_slice(), [t.clone()]);
    let columns = db.list_columns(&t, None).await?;
    assert!(columns["id"].primary_key);
    assert!(!columns["name"].nullable);

    let cached = qb::select_from(t.as_str()).cached(Duration::from_secs(60), false);
    assert!(cached.fetch(&db).await?.is_empty());
    qb::insert(t.as_str()).columns(["name"]).values(["cid"])?.execute(&db).await?;
    // Served from the cache until it expires.
    assert!(cached.fetch(&db).await?.is_empty());

    drop_table(&db, &t).await?;
    assert!(db.disconnect().await);
    Ok(())
}
