//! End-to-end tests against an in-memory SQLite database.

use qforge::{
    Adapter, CursorState, DbError, DbResult, FromRow, Operand, Outcome, QueryKind, Row, SqlQb,
    SqliteAdapter, expr, qb, query,
};

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: Option<i64>,
}

impl FromRow for User {
    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            age: row.try_get("age")?,
        })
    }
}

async fn setup() -> DbResult<SqliteAdapter> {
    let db = SqliteAdapter::memory();
    db.execute_raw(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            age INTEGER,
            active INTEGER NOT NULL DEFAULT 1
        )",
    )
    .await?;
    for (name, age) in [("Ann", Some(31)), ("Bob", None), ("O'Brien", Some(45))] {
        qb::insert("users")
            .columns(["name", "age"])
            .values([Operand::from(name), Operand::from(age)])?
            .execute(&db)
            .await?;
    }
    Ok(db)
}

async fn user_count(db: &SqliteAdapter) -> DbResult<i64> {
    qb::select_from("users").count(db).await
}

#[tokio::test]
async fn insert_reports_last_id() -> DbResult<()> {
    let db = setup().await?;
    let outcome = qb::insert("users")
        .columns(["name"])
        .values(["Cid"])?
        .execute(&db)
        .await?;
    assert_eq!(outcome.last_insert_id(), Some(4));
    assert_eq!(outcome.affected(), 1);

    let batch = qb::insert("users")
        .columns(["name"])
        .values(["Dee"])?
        .values(["Eve"])?
        .execute(&db)
        .await?;
    assert_eq!(batch.affected(), 2);
    assert_eq!(batch.last_insert_id(), Some(6));
    Ok(())
}

#[tokio::test]
async fn select_hydrates_objects() -> DbResult<()> {
    let db = setup().await?;
    let users = qb::select(["id", "name", "age"])
        .from("users")
        .where_open()
        .where_("age", ">", 40)
        .or_where("age", "=", None::<i64>)
        .where_close()
        .order_by_asc("id")
        .fetch_as::<User, _>(&db)
        .await?;

    assert_eq!(
        users.as_vec(),
        vec![
            User {
                id: 2,
                name: "Bob".into(),
                age: None
            },
            User {
                id: 3,
                name: "O'Brien".into(),
                age: Some(45)
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn literals_and_bound_params_round_trip() -> DbResult<()> {
    let db = setup().await?;

    let inlined = qb::select_from("users").eq("name", "O'Brien").fetch(&db).await?;
    assert_eq!(inlined.len(), 1);

    let bound = qb::select_from("users")
        .eq("name", Operand::param("name"))
        .param("name", "O'Brien")
        .fetch(&db)
        .await?;
    assert_eq!(bound.column_values::<i64>("id")?, vec![3]);
    Ok(())
}

#[tokio::test]
async fn cursor_navigation() -> DbResult<()> {
    let db = setup().await?;
    let mut rows = qb::select(["id", "name"])
        .from("users")
        .order_by_asc("id")
        .fetch(&db)
        .await?;

    assert_eq!(rows.state(), CursorState::Unconsumed);
    assert_eq!(rows.len(), 3);
    assert!(rows.seek(1));
    assert_eq!(rows.get_value::<String>("name")?, Some("Bob".to_string()));
    let next = rows.next().map(|r| r.try_get::<i64>("id"));
    assert_eq!(next.transpose()?, Some(3));
    assert!(rows.next().is_none());
    assert_eq!(rows.state(), CursorState::Exhausted);
    assert_eq!(rows.get_value::<String>("name")?, None);

    rows.rewind();
    assert_eq!(rows.state(), CursorState::Unconsumed);
    assert_eq!(rows.count(), 3);

    let rows = qb::select(["id", "name"]).from("users").fetch(&db).await?;
    let by_id = rows.as_value_map::<i64, String>("id", "name")?;
    assert_eq!(by_id.get(&1).map(String::as_str), Some("Ann"));
    assert!(rows.get(7).is_none());
    Ok(())
}

#[tokio::test]
async fn update_with_returning_yields_rows() -> DbResult<()> {
    let db = setup().await?;
    let outcome = qb::update("users")
        .increment("age", 1)
        .is_not_null("age")
        .returning(["id", "age"])
        .execute(&db)
        .await?;
    let Outcome::Rows(rows) = outcome else {
        panic!("expected rows");
    };
    assert_eq!(rows.column_values::<i64>("age")?, vec![32, 46]);

    let outcome = qb::update("users")
        .set("active", false)
        .where_("id", "IN", vec![1, 2])
        .execute(&db)
        .await?;
    assert_eq!(outcome.affected(), 2);
    Ok(())
}

#[tokio::test]
async fn ordered_limited_delete() -> DbResult<()> {
    let db = setup().await?;
    let outcome = qb::delete("users")
        .order_by("id", "desc")
        .limit(2)
        .execute(&db)
        .await?;
    assert_eq!(outcome.affected(), 2);

    let left = qb::select(["name"]).from("users").fetch(&db).await?;
    assert_eq!(left.column_values::<String>("name")?, vec!["Ann".to_string()]);
    Ok(())
}

#[tokio::test]
async fn union_without_parentheses() -> DbResult<()> {
    let db = setup().await?;
    let rows = qb::select(["name"])
        .from("users")
        .eq("id", 1)
        .union(qb::select(["name"]).from("users").eq("id", 3), false)
        .fetch(&db)
        .await?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[tokio::test]
async fn union_with_ordered_limited_members() -> DbResult<()> {
    let db = setup().await?;
    let rows = qb::select(["id"])
        .from("users")
        .order_by_desc("id")
        .limit(1)
        .union(
            qb::select(["id"]).from("users").order_by_asc("id").limit(1),
            true,
        )
        .fetch(&db)
        .await?;
    let mut ids = rows.column_values::<i64>("id")?;
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3]);
    Ok(())
}

#[tokio::test]
async fn grouped_aggregates() -> DbResult<()> {
    let db = setup().await?;
    let rows = qb::select(["active"])
        .select((expr("COUNT(*)"), "n"))
        .from("users")
        .group_by("active")
        .having(expr("COUNT(*)"), ">=", 1)
        .fetch(&db)
        .await?;
    assert_eq!(rows.column_values::<i64>("n")?, vec![3]);
    Ok(())
}

#[tokio::test]
async fn fetch_one_not_found() -> DbResult<()> {
    let db = setup().await?;
    let err = query(QueryKind::Select, "SELECT * FROM users WHERE id = :id")
        .param("id", 99)
        .fetch_one(&db)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn bind_then_set_reuses_template() -> DbResult<()> {
    let db = setup().await?;
    let (by_id, id) = query(QueryKind::Select, "SELECT name FROM users WHERE id = :id").bind("id");

    assert!(by_id.fetch(&db).await.unwrap_err().is_usage());

    let ann = by_id.set(&id, 1).fetch_one(&db).await?;
    let bob = by_id.set(&id, 2).fetch_one(&db).await?;
    assert_eq!(ann.try_get::<String>("name")?, "Ann");
    assert_eq!(bob.try_get::<String>("name")?, "Bob");
    Ok(())
}

#[tokio::test]
async fn transaction_commits_and_rolls_back() -> DbResult<()> {
    let db = setup().await?;

    let failed: DbResult<()> = qforge::transaction!(&db, {
        qb::delete("users").execute(&db).await?;
        Err(DbError::usage("abort"))
    });
    assert!(failed.unwrap_err().is_usage());
    assert_eq!(user_count(&db).await?, 3);

    qforge::transaction!(&db, "IMMEDIATE", {
        qb::delete("users").eq("id", 1).execute(&db).await?;
        Ok(())
    })?;
    assert_eq!(user_count(&db).await?, 2);
    Ok(())
}

#[tokio::test]
async fn savepoint_keeps_outer_work() -> DbResult<()> {
    let db = setup().await?;

    qforge::transaction!(&db, {
        qb::delete("users").eq("id", 1).execute(&db).await?;

        let inner: DbResult<()> = qforge::savepoint!(&db, "inner", {
            qb::delete("users").execute(&db).await?;
            Err(DbError::usage("undo me"))
        });
        assert!(inner.is_err());

        qforge::savepoint!(&db, {
            qb::delete("users").eq("id", 2).execute(&db).await?;
            Ok(())
        })
    })?;

    let names = qb::select(["name"]).from("users").fetch(&db).await?;
    assert_eq!(names.column_values::<String>("name")?, vec!["O'Brien".to_string()]);
    Ok(())
}

#[tokio::test]
async fn constraint_errors_carry_sql_and_code() -> DbResult<()> {
    let db = setup().await?;
    let err = qb::insert("users")
        .columns(["id", "name"])
        .values([Operand::from(1), Operand::from("dup")])?
        .execute(&db)
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
    assert!(err.sql().is_some_and(|sql| sql.starts_with("INSERT INTO \"users\"")));
    Ok(())
}

#[tokio::test]
async fn introspection() -> DbResult<()> {
    let db = setup().await?;
    let tables = db.list_tables(None).await?;
    assert_eq!(tables.as_slice(), ["users".to_string()]);

    let columns = db.list_columns("users", None).await?;
    let id = &columns["id"];
    assert!(id.primary_key);
    assert_eq!(id.ordinal, 1);
    assert!(!columns["name"].nullable);
    assert_eq!(columns["active"].default.as_deref(), Some("1"));

    let only_a = db.list_columns("users", Some("a%")).await?;
    assert_eq!(only_a.keys().collect::<Vec<_>>(), ["active", "age"]);
    Ok(())
}
