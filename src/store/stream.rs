//! # Streaming cursor over one statement execution.
//!
//! [`RowStream`] is lazy, finite, forward-only and not restartable. The first poll
//! enqueues the statement on the connection worker; the worker steps the native
//! cursor and hands rows over a bounded channel (`stream_buffer` rows of
//! read-ahead).
//!
//! ```text
//! poll ──► Idle ──Command::Stream──► Running{rx} ──► rx.recv()
//!                                         │
//!                 Err item or channel end └──► Done
//! ```
//!
//! Dropping the stream closes the channel; the worker sees it at the next row and
//! finalizes the native cursor.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::Span;

use super::worker::{Command, Item, StreamRequest};
use super::{StoreInner, Value};

enum State {
    Idle {
        inner: Arc<StoreInner>,
        sql: String,
        params: Vec<Value>,
        span: Span,
    },
    Running {
        rx: mpsc::Receiver<Item>,
        // keeps the worker alive while rows are pending
        _inner: Arc<StoreInner>,
    },
    Done,
}

/// Lazy sequence of rows produced by [`Store::stream`](crate::Store::stream).
pub struct RowStream {
    rows: BoxStream<'static, Item>,
}

impl RowStream {
    pub(super) fn new(inner: Arc<StoreInner>, sql: String, params: Vec<Value>, span: Span) -> Self {
        let init = State::Idle {
            inner,
            sql,
            params,
            span,
        };
        let rows = stream::unfold(init, |state| async move {
            let (mut rx, inner) = match state {
                State::Idle {
                    inner,
                    sql,
                    params,
                    span,
                } => {
                    // one extra slot for the terminal error item
                    let (tx, rx) = mpsc::channel(inner.config.stream_buffer_clamped() + 1);
                    let request = StreamRequest {
                        sql,
                        params,
                        span,
                        rows: tx,
                    };
                    if let Err(e) = inner.send(Command::Stream(request)) {
                        return Some((Err(e), State::Done));
                    }
                    (rx, inner)
                }
                State::Running { rx, _inner } => (rx, _inner),
                State::Done => return None,
            };
            match rx.recv().await {
                Some(Ok(row)) => Some((Ok(row), State::Running { rx, _inner: inner })),
                Some(Err(e)) => Some((Err(e), State::Done)),
                None => None,
            }
        });
        Self { rows: rows.boxed() }
    }
}

impl Stream for RowStream {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Item>> {
        self.rows.poll_next_unpin(cx)
    }
}
