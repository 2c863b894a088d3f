//! Store integration tests.
//!
//! Eager and streaming queries against an in-memory database, error normalization,
//! scoped acquisition and release.

use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use reqvisor::{ErrorKind, ResourceError, Store, StoreConfig, Value};

async fn users() -> Store {
    let store = Store::open(StoreConfig::in_memory()).await.unwrap();
    store
        .query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE)",
            vec![],
        )
        .await
        .unwrap();
    store
}

async fn insert(store: &Store, name: &str) -> Result<(), ResourceError> {
    let rows = store
        .query(
            "INSERT INTO users (name) VALUES (?1)",
            vec![Value::Text(name.to_string())],
        )
        .await?;
    assert!(rows.is_empty());
    Ok(())
}

/// 30 sequential inserts, then a streamed `SELECT *` sees all 30 rows in key order.
#[tokio::test]
async fn thirty_inserts_then_stream_in_order() {
    let store = users().await;
    for i in 0..30 {
        insert(&store, &format!("user-{i:02}")).await.unwrap();
    }

    let rows: Vec<_> = store
        .stream("SELECT * FROM users", vec![])
        .try_collect()
        .await
        .unwrap();

    assert_eq!(rows.len(), 30);
    let ids: Vec<i64> = rows.iter().map(|r| r.get("id").unwrap()).collect();
    assert_eq!(ids, (1..=30).collect::<Vec<_>>());
    assert_eq!(rows[0].columns(), ["id", "name"]);
    assert_eq!(rows[29].get::<String>("name").unwrap(), "user-29");
}

/// Selections come back eagerly in the backend's result order.
#[tokio::test]
async fn query_returns_rows_for_selections() {
    let store = users().await;
    for name in ["carol", "alice", "bob"] {
        insert(&store, name).await.unwrap();
    }

    let rows = store
        .query(
            "SELECT name FROM users WHERE id >= ?1 ORDER BY name",
            vec![Value::Integer(1)],
        )
        .await
        .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("name").unwrap()).collect();
    assert_eq!(names, ["alice", "bob", "carol"]);
}

/// Stopping a stream early is not an error, and the store stays usable.
#[tokio::test]
async fn stream_can_stop_early() {
    let store = users().await;
    for i in 0..100 {
        insert(&store, &format!("u{i}")).await.unwrap();
    }

    let mut stream = store.stream("SELECT id FROM users ORDER BY id", vec![]);
    let mut seen = Vec::new();
    while let Some(row) = stream.next().await {
        seen.push(row.unwrap().get::<i64>("id").unwrap());
        if seen.len() == 5 {
            break;
        }
    }
    drop(stream);
    assert_eq!(seen, [1, 2, 3, 4, 5]);

    insert(&store, "after-stream").await.unwrap();
}

/// A stream that is never polled does not execute its statement.
#[tokio::test]
async fn stream_is_lazy() {
    let store = users().await;
    let pending = store.stream(
        "INSERT INTO users (name) VALUES (?1)",
        vec![Value::Text("ghost".into())],
    );
    drop(pending);

    let rows = store
        .query("SELECT COUNT(*) AS n FROM users", vec![])
        .await
        .unwrap();
    assert_eq!(rows[0].get::<i64>("n").unwrap(), 0);
}

/// A paused stream does not hold up other operations, even from the same task.
#[tokio::test]
async fn paused_stream_does_not_block_other_operations() {
    let store = Store::open(StoreConfig {
        stream_buffer: 2,
        ..StoreConfig::in_memory()
    })
    .await
    .unwrap();
    store
        .query("CREATE TABLE n (v INTEGER PRIMARY KEY)", vec![])
        .await
        .unwrap();
    for v in 1..=20 {
        store
            .query("INSERT INTO n (v) VALUES (?1)", vec![Value::Integer(v)])
            .await
            .unwrap();
    }

    let mut stream = store.stream("SELECT v FROM n ORDER BY v", vec![]);
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.get::<i64>("v").unwrap(), 1);

    let counted = tokio::time::timeout(
        Duration::from_secs(2),
        store.query("SELECT COUNT(*) AS c FROM n", vec![]),
    )
    .await
    .expect("query waited on the paused stream")
    .unwrap();
    assert_eq!(counted[0].get::<i64>("c").unwrap(), 20);

    let rest: Vec<i64> = stream
        .map(|row| row.unwrap().get::<i64>("v").unwrap())
        .collect()
        .await;
    assert_eq!(rest, (2..=20).collect::<Vec<_>>());
}

/// Closing the store ends a live stream with an error item.
#[tokio::test]
async fn close_ends_live_stream() {
    let store = Store::open(StoreConfig {
        stream_buffer: 1,
        ..StoreConfig::in_memory()
    })
    .await
    .unwrap();
    store
        .query("CREATE TABLE n (v INTEGER PRIMARY KEY)", vec![])
        .await
        .unwrap();
    for v in 1..=10 {
        store
            .query("INSERT INTO n (v) VALUES (?1)", vec![Value::Integer(v)])
            .await
            .unwrap();
    }

    let mut stream = store.stream("SELECT v FROM n ORDER BY v", vec![]);
    assert!(stream.next().await.unwrap().is_ok());
    store.close().await.unwrap();

    let rest: Vec<_> = stream.collect().await;
    assert!(rest.len() < 9);
    assert!(rest.last().is_some_and(|item| item.is_err()));
}

/// Malformed SQL and constraint violations surface as `ResourceError` with the native cause.
#[tokio::test]
async fn native_failures_are_normalized() {
    let store = users().await;
    insert(&store, "dup").await.unwrap();

    let err = insert(&store, "dup").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert!(err.downcast_ref::<rusqlite::Error>().is_some());

    let err = store.query("SELEC nope", vec![]).await.unwrap_err();
    assert!(err.to_string().starts_with("resource error:"));

    let first = store
        .stream("SELECT * FROM missing", vec![])
        .next()
        .await
        .unwrap();
    assert!(first.is_err());
}

/// Operations issued by one task observe each other in order, inside a transaction.
#[tokio::test]
async fn with_connection_runs_arbitrary_operations() {
    let store = users().await;
    let inserted = store
        .with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("INSERT INTO users (name) VALUES ('a')", [])?;
            tx.execute("INSERT INTO users (name) VALUES ('b')", [])?;
            tx.commit()?;
            Ok(2)
        })
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    let rows = store.query("SELECT id FROM users", vec![]).await.unwrap();
    assert_eq!(rows.len(), 2);
}

/// Concurrent tasks share one connection without losing writes.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_share_the_connection() {
    let store = users().await;
    let mut joins = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        joins.push(tokio::spawn(async move { insert(&store, &format!("w{i}")).await }));
    }
    for j in joins {
        j.await.unwrap().unwrap();
    }

    let rows = store
        .query("SELECT COUNT(*) AS n FROM users", vec![])
        .await
        .unwrap();
    assert_eq!(rows[0].get::<i64>("n").unwrap(), 16);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPED ACQUISITION
// ═══════════════════════════════════════════════════════════════════════════════

/// `scoped` releases the store after success.
#[tokio::test]
async fn scoped_releases_on_success() {
    let mut kept = None;
    let n = Store::scoped(StoreConfig::in_memory(), |store| {
        kept = Some(store.clone());
        async move {
            let rows = store.query("SELECT 41 + 1 AS n", vec![]).await?;
            rows[0].get::<i64>("n")
        }
    })
    .await
    .unwrap();

    assert_eq!(n, 42);
    assert!(kept.unwrap().is_closed());
}

/// `scoped` releases the store on failure and returns the body's error.
#[tokio::test]
async fn scoped_releases_on_failure() {
    let mut kept = None;
    let res: anyhow::Result<()> = Store::scoped(StoreConfig::in_memory(), |store| {
        kept = Some(store.clone());
        async move {
            store.query("DROP TABLE nothing_here", vec![]).await?;
            Ok::<_, anyhow::Error>(())
        }
    })
    .await;

    let err = res.unwrap_err();
    assert!(err.downcast_ref::<ResourceError>().is_some());
    let kept = kept.unwrap();
    assert!(kept.is_closed());

    let err = kept.query("SELECT 1", vec![]).await.unwrap_err();
    assert!(err.to_string().contains("store closed"));
}

/// Concurrent `close` calls on clones release the connection once and all succeed.
#[tokio::test]
async fn release_happens_once() {
    let store = Store::open(StoreConfig::in_memory()).await.unwrap();
    let clones: Vec<_> = (0..4).map(|_| store.clone()).collect();

    let results = futures::future::join_all(clones.iter().map(|s| s.close())).await;
    assert!(results.iter().all(Result::is_ok));
    assert!(store.is_closed());
}

/// A file-backed store keeps its data across handles.
#[tokio::test]
async fn file_store_persists_between_handles() {
    let path = std::env::temp_dir().join(format!("reqvisor-store-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    Store::scoped(StoreConfig::file(&path), |store| async move {
        store.query("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)", vec![]).await?;
        store
            .query(
                "INSERT INTO kv VALUES (?1, ?2)",
                vec![Value::Text("answer".into()), Value::Text("42".into())],
            )
            .await?;
        Ok::<_, ResourceError>(())
    })
    .await
    .unwrap();

    let v: String = Store::scoped(StoreConfig::file(&path), |store| async move {
        let rows = store
            .query("SELECT v FROM kv WHERE k = ?1", vec![Value::Text("answer".into())])
            .await?;
        rows[0].get("v")
    })
    .await
    .unwrap();
    assert_eq!(v, "42");

    let _ = std::fs::remove_file(&path);
}
