//! Warning log emitted by the request adapter.
//!
//! A capturing `tracing-subscriber` layer records every `WARN` event with its
//! fields, so the tests see exactly what an external collector would receive.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use reqvisor::{
    Inbound, MemorySink, RequestAdapter, RequestContext, RequestHead, Supervisor,
    SupervisorConfig, TaskContext, TaskError,
};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

type Record = HashMap<String, String>;

#[derive(Clone, Default)]
struct WarnCapture {
    records: Arc<Mutex<Vec<Record>>>,
}

impl WarnCapture {
    fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }
}

struct Fields<'a>(&'a mut Record);

impl Visit for Fields<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for WarnCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::WARN {
            return;
        }
        let mut record = Record::new();
        event.record(&mut Fields(&mut record));
        self.records.lock().unwrap().push(record);
    }
}

fn capture() -> (WarnCapture, tracing::subscriber::DefaultGuard) {
    let layer = WarnCapture::default();
    let guard = tracing::subscriber::set_default(Registry::default().with(layer.clone()));
    (layer, guard)
}

async fn failing(_: Arc<()>, _: RequestContext, _: TaskContext) -> Result<(), TaskError> {
    Err(TaskError::fail("ledger out of sync"))
}

async fn hangs(_: Arc<()>, _: RequestContext, ctx: TaskContext) -> Result<(), TaskError> {
    ctx.cancelled().await;
    Err(TaskError::Canceled)
}

/// A failed request logs one warning carrying method, path, headers and the error.
#[tokio::test]
async fn failure_logs_one_warning_with_request_metadata() {
    let (logs, _guard) = capture();
    let sup = Supervisor::builder(SupervisorConfig::default()).build();
    let adapter = RequestAdapter::new(Arc::clone(&sup), Arc::new(()), failing);

    let head = RequestHead::new("POST", "/orders").with_header("x-request-id", "req-7f3a");
    let handle = adapter
        .on_request(Inbound::new(head, MemorySink::new()))
        .await;
    assert!(handle.join().await.is_failed());

    let records = logs.records();
    assert_eq!(records.len(), 1, "unexpected warnings: {records:?}");
    let warning = &records[0];
    assert_eq!(warning["method"], "POST");
    assert_eq!(warning["path"], "/orders");
    assert!(warning["headers"].contains("x-request-id"));
    assert!(warning["headers"].contains("req-7f3a"));
    assert!(warning["error"].contains("ledger out of sync"));
    assert_eq!(warning["message"], "request task failed");

    sup.shutdown().await.unwrap();
}

/// Cancellation, by disconnect-style cancel or by shutdown, logs no warning.
#[tokio::test]
async fn cancellation_logs_no_warning() {
    let (logs, _guard) = capture();
    let sup = Supervisor::builder(SupervisorConfig::default()).build();
    let adapter = RequestAdapter::new(Arc::clone(&sup), Arc::new(()), hangs);

    let head = RequestHead::new("GET", "/stream").with_header("x-request-id", "req-0001");
    let cancelled = adapter
        .on_request(Inbound::new(head, MemorySink::new()))
        .await;
    cancelled.cancel();
    assert!(cancelled.join().await.is_cancelled());

    let in_flight = adapter
        .on_request(Inbound::new(RequestHead::new("GET", "/later"), MemorySink::new()))
        .await;
    sup.shutdown().await.unwrap();
    assert!(in_flight.join().await.is_cancelled());

    assert!(logs.records().is_empty(), "unexpected warnings: {:?}", logs.records());
}
