//! # Example: request_flow
//!
//! Drives a few requests through the adapter against an in-memory store.
//!
//! Shows how to:
//! - Open a [`Store`] and share it with route logic as application state
//! - Turn inbound requests into supervised tasks with [`RequestAdapter`]
//! - See the response finalized once per outcome (200 / 204 / 500 / disconnect)
//! - Shut the scope down and release the store
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Store::open(in_memory) ─► CREATE TABLE notes
//!   ├─► Supervisor::builder(cfg).with_subscriber(LogWriter).build()
//!   ├─► RequestAdapter::new(sup, store, route)
//!   │
//!   ├─► POST /notes        → insert, 204 No Content
//!   ├─► GET  /notes        → stream rows, 200 + body
//!   ├─► GET  /notes/broken → store fault, 500 + warning
//!   ├─► GET  /notes/slow   → client disconnects, cancelled, no status
//!   │
//!   └─► sup.shutdown() ─► store.close()
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example request_flow
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqvisor::{
    ClosedSignal, Inbound, LogWriter, MemorySink, RequestAdapter, RequestContext, RequestHead,
    Store, StoreConfig, Supervisor, SupervisorConfig, TaskContext, TaskError, Value,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

async fn notes(store: Arc<Store>, req: RequestContext, ctx: TaskContext) -> Result<(), TaskError> {
    match (req.method(), req.path()) {
        ("POST", "/notes") => {
            let body = req.head().header("x-note").unwrap_or("empty").to_string();
            store
                .query("INSERT INTO notes (body) VALUES (?1)", vec![Value::Text(body)])
                .await?;
            Ok(())
        }
        ("GET", "/notes") => {
            let mut rows = store.stream("SELECT id, body FROM notes ORDER BY id", vec![]);
            let mut out = String::new();
            while let Some(row) = rows.next().await {
                ctx.checkpoint()?;
                let row = row?;
                out.push_str(&format!(
                    "{}: {}\n",
                    row.get::<i64>("id")?,
                    row.get::<String>("body")?
                ));
            }
            let res = req.response();
            res.write_status(200).await.map_err(TaskError::fail)?;
            res.write_body(out.as_bytes()).await.map_err(TaskError::fail)?;
            Ok(())
        }
        ("GET", "/notes/broken") => {
            store.query("SELECT * FROM missing_table", vec![]).await?;
            Ok(())
        }
        ("GET", "/notes/slow") => {
            ctx.until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
                .await?;
            Ok(())
        }
        _ => {
            req.response()
                .write_status(404)
                .await
                .map_err(TaskError::fail)?;
            Ok(())
        }
    }
}

async fn send(adapter: &RequestAdapter<Store>, head: RequestHead) {
    let sink = MemorySink::new();
    let label = format!("{} {}", head.method, head.path);
    let outcome = adapter
        .on_request(Inbound::new(head, sink.clone()))
        .await
        .join()
        .await;
    let rec = sink.record();
    println!(
        "{label:<22} → {:<9} status={:?} ends={} body={:?}",
        outcome.as_label(),
        rec.status(),
        rec.ends,
        String::from_utf8_lossy(&rec.body)
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== request_flow example ===\n");

    // 1. Acquire the store
    let store = Store::open(StoreConfig::in_memory()).await?;
    store
        .query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)", vec![])
        .await?;

    // 2. Supervising scope with the built-in log subscriber
    let cfg = SupervisorConfig {
        grace: Duration::from_secs(5),
        ..SupervisorConfig::default()
    };
    let sup = Supervisor::builder(cfg)
        .with_subscriber(Arc::new(LogWriter::new()))
        .build();

    // 3. Adapter: one supervised task per request
    let adapter = RequestAdapter::new(Arc::clone(&sup), Arc::new(store.clone()), notes);

    // 4. Requests
    send(&adapter, RequestHead::new("POST", "/notes").with_header("x-note", "first")).await;
    send(&adapter, RequestHead::new("POST", "/notes").with_header("x-note", "second")).await;
    send(&adapter, RequestHead::new("GET", "/notes")).await;
    send(&adapter, RequestHead::new("GET", "/notes/broken")).await;
    send(&adapter, RequestHead::new("GET", "/unknown")).await;

    // 5. A client that goes away mid-request
    let closed = CancellationToken::new();
    let sink = MemorySink::new();
    let handle = adapter
        .on_request(
            Inbound::new(RequestHead::new("GET", "/notes/slow"), sink.clone())
                .with_closed(ClosedSignal::from_token(closed.clone())),
        )
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    closed.cancel();
    let outcome = handle.join().await;
    println!(
        "{:<22} → {:<9} status={:?} ends={}",
        "GET /notes/slow",
        outcome.as_label(),
        sink.record().status(),
        sink.record().ends
    );

    // 6. Teardown
    sup.shutdown().await?;
    store.close().await?;
    println!("\n=== done ===");
    Ok(())
}
