//! # Request adapter: one supervised task per inbound request.
//!
//! ```text
//! on_request(Inbound)
//!   ├─► RequestContext::new(task_id, head, response)
//!   ├─► Supervisor::spawn_as(task_id, route task, completion hook)
//!   │       route task: span "request"{method, path} ─► Running ─► route.call(..)
//!   │       completion hook (exactly once, any outcome):
//!   │         try_finalize ─► state ─► status if none sent ─► end if not ended
//!   │                       └► non-cancellation failure: warn! + RequestFailed
//!   └─► disconnect listener: select { task finished => finalize as Cancelled if the
//!                                                       hook never ran (aborted task),
//!                                     closed        => cancel task + ClientDisconnected }
//! ```
//!
//! The hook runs after the route's children finished. A task aborted once the
//! shutdown grace period ran out never reaches its hook; the listener then ends the
//! response instead, still behind the same finalized flag.
//!
//! | Outcome                 | Status written (if none sent yet) | Warning |
//! |-------------------------|-----------------------------------|---------|
//! | `Completed`             | 204                               | no      |
//! | `Failed` (not cancel)   | 500                               | yes     |
//! | `Cancelled`             | none, stream is only ended        | no      |

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::Instrument;

use crate::adapter::transport::{ClosedSignal, Inbound};
use crate::adapter::{RequestContext, RequestState, Route};
use crate::core::Supervisor;
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Outcome, TaskCanceller, TaskContext, TaskFn, TaskHandle, TaskId};

const NO_CONTENT: u16 = 204;
const INTERNAL_SERVER_ERROR: u16 = 500;

/// Turns inbound requests into supervised, cancellable route tasks.
pub struct RequestAdapter<S> {
    supervisor: Arc<Supervisor>,
    state: Arc<S>,
    route: Arc<dyn Route<S>>,
}

impl<S> Clone for RequestAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            supervisor: Arc::clone(&self.supervisor),
            state: Arc::clone(&self.state),
            route: Arc::clone(&self.route),
        }
    }
}

impl<S: Send + Sync + 'static> RequestAdapter<S> {
    /// Creates an adapter running `route` with shared `state` under `supervisor`.
    pub fn new(supervisor: Arc<Supervisor>, state: Arc<S>, route: impl Route<S>) -> Self {
        Self {
            supervisor,
            state,
            route: Arc::new(route),
        }
    }

    /// Supervisor owning the request tasks.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Application state handed to every route call.
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Spawns the route task for one inbound request.
    ///
    /// Returns immediately; the response is finalized by the completion hook.
    pub async fn on_request(&self, inbound: Inbound) -> RequestHandle {
        let Inbound {
            head,
            response,
            closed,
        } = inbound;
        let req = RequestContext::new(TaskId::next(), head, response);
        let span = tracing::info_span!("request", method = req.method(), path = req.path());

        let task = {
            let route = Arc::clone(&self.route);
            let state = Arc::clone(&self.state);
            let req = req.clone();
            let span = span.clone();
            TaskFn::new(
                format!("{} {}", req.method(), req.path()),
                move |ctx: TaskContext| {
                    async move {
                        req.mark_running();
                        route.call(state, req, ctx).await
                    }
                    .instrument(span)
                },
            )
        };

        let hook = {
            let req = req.clone();
            let bus = self.supervisor.bus().clone();
            move |outcome: &Outcome<()>| -> BoxFuture<'static, ()> {
                finalize(req, Verdict::of(outcome), bus)
                    .instrument(span)
                    .boxed()
            }
        };

        let task = self.supervisor.spawn_as(req.task_id(), task, hook).await;
        watch_disconnect(&task, closed, &req, self.supervisor.bus().clone());
        RequestHandle { context: req, task }
    }
}

/// Caller-side view of one request task.
#[derive(Debug)]
pub struct RequestHandle {
    context: RequestContext,
    task: TaskHandle<()>,
}

impl RequestHandle {
    /// Shared request state.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Identity of the request task.
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Cancels the request task.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Cloneable canceller for the request task.
    pub fn canceller(&self) -> TaskCanceller {
        self.task.canceller()
    }

    /// True once the task (and its completion hook) finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task outcome. The response is already finalized when this
    /// resolves.
    pub async fn join(self) -> Outcome<()> {
        self.task.join().await
    }
}

/// What the completion hook needs from the outcome.
enum Verdict {
    Completed,
    Failed { error: String, label: &'static str },
    Cancelled,
}

impl Verdict {
    fn of(outcome: &Outcome<()>) -> Self {
        match outcome {
            Outcome::Completed(()) => Verdict::Completed,
            Outcome::Failed(e) if e.is_cancellation() => Verdict::Cancelled,
            Outcome::Failed(e) => Verdict::failed(e),
            Outcome::Cancelled => Verdict::Cancelled,
        }
    }

    fn failed(e: &TaskError) -> Self {
        Verdict::Failed {
            error: e.to_string(),
            label: e.as_label(),
        }
    }
}

async fn finalize(req: RequestContext, verdict: Verdict, bus: Bus) {
    if !req.try_finalize() {
        tracing::debug!("request already finalized");
        return;
    }

    let (state, status) = match verdict {
        Verdict::Completed => (RequestState::Completed, Some(NO_CONTENT)),
        Verdict::Failed { .. } => (RequestState::Failed, Some(INTERNAL_SERVER_ERROR)),
        Verdict::Cancelled => (RequestState::Cancelled, None),
    };
    req.set_state(state);
    let written = req.response().finish(status).await;

    if let Verdict::Failed { error, label } = &verdict {
        tracing::warn!(
            method = req.method(),
            path = req.path(),
            headers = ?req.head().headers,
            kind = label,
            error = %error,
            "request task failed"
        );
        bus.publish(
            Event::new(EventKind::RequestFailed)
                .with_task_id(req.task_id())
                .with_request(req.method(), req.path())
                .with_reason(error.as_str()),
        );
    }
    bus.publish(
        Event::new(EventKind::RequestFinalized)
            .with_task_id(req.task_id())
            .with_request(req.method(), req.path())
            .with_status(written),
    );
}

/// Cancels the task when the transport reports an early close. Firing after the
/// task finished is a no-op.
///
/// Also finalizes the request as cancelled if the task finished without its hook
/// having run, which only happens when the task was aborted.
fn watch_disconnect(task: &TaskHandle<()>, closed: ClosedSignal, req: &RequestContext, bus: Bus) {
    let canceller = task.canceller();
    let req = req.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = canceller.finished() => {
                if !req.is_finalized() {
                    tracing::debug!(
                        id = %req.task_id(),
                        method = req.method(),
                        path = req.path(),
                        "request task aborted before finalization"
                    );
                    finalize(req, Verdict::Cancelled, bus).await;
                }
            }
            _ = closed => {
                if !canceller.is_finished() {
                    canceller.cancel();
                    tracing::debug!(
                        id = %req.task_id(),
                        method = req.method(),
                        path = req.path(),
                        "client disconnected; cancelling request"
                    );
                    bus.publish(
                        Event::new(EventKind::ClientDisconnected)
                            .with_task_id(req.task_id())
                            .with_request(req.method(), req.path()),
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MemorySink, RequestHead};
    use crate::core::SupervisorConfig;

    async fn ok_route(_: Arc<()>, _: RequestContext, _: TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    #[tokio::test]
    async fn success_writes_no_content_once() {
        let sup = Supervisor::builder(SupervisorConfig::default()).build();
        let adapter = RequestAdapter::new(Arc::clone(&sup), Arc::new(()), ok_route);
        let sink = MemorySink::new();

        let handle = adapter
            .on_request(Inbound::new(RequestHead::new("GET", "/ping"), sink.clone()))
            .await;
        let ctx = handle.context().clone();
        assert!(handle.join().await.is_completed());

        assert_eq!(ctx.state(), RequestState::Completed);
        assert!(ctx.is_finalized());
        let rec = sink.record();
        assert_eq!(rec.statuses, [NO_CONTENT]);
        assert_eq!(rec.ends, 1);
        sup.shutdown().await.unwrap();
    }

    #[test]
    fn cancellation_failure_is_not_a_failure_verdict() {
        let outcome: Outcome<()> = Outcome::Failed(TaskError::Canceled);
        assert!(matches!(Verdict::of(&outcome), Verdict::Cancelled));

        let outcome: Outcome<()> = Outcome::Failed(TaskError::fail("boom"));
        assert!(matches!(
            Verdict::of(&outcome),
            Verdict::Failed { label: "task_failed", .. }
        ));
    }
}
