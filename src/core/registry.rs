//! # Task registry - the supervising scope's arena of running tasks.
//!
//! The registry owns one entry per in-flight task, keyed by [`TaskId`]:
//! - `spawn` derives a child token, starts the runner and inserts the entry
//! - the task's wrapper removes its own entry once the outcome is delivered
//! - `close_and_cancel_all` closes the scope, cancels every entry and joins them
//!
//! ## Architecture
//! ```text
//! spawn(task, parent_token)
//!   ├─► write lock ─► closed? ─► yes: Outcome::Cancelled, hook, return
//!   │                          └► no:  tokio::spawn(wrapper) + insert entry
//!   │
//! wrapper:
//!   run_once(task) ─► cancel scope ─► await children ─► completion hook
//!                  ─► send outcome ─► done ─► forget(id)
//! ```
//!
//! ## Rules
//! - The entry is inserted under the same write lock that spawns the wrapper, so
//!   the wrapper's own removal can never run before the insertion.
//! - After the scope is closed nothing new is started; late spawns resolve
//!   `Cancelled` immediately (their completion hook still runs once).
//! - The completion hook runs inside the wrapper, so shutdown waits for it.
//! - Children spawned through the task's context hang off a scope token that is
//!   cancelled once the task body is over. The wrapper awaits them before the hook,
//!   so no child outlives the outcome of its parent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, Semaphore, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::runner::run_once;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Outcome, Task, TaskCanceller, TaskContext, TaskHandle, TaskId};

/// Callback run exactly once with the terminal outcome, before it is delivered.
pub(crate) type CompletionHook<T> =
    Box<dyn FnOnce(&Outcome<T>) -> BoxFuture<'static, ()> + Send + 'static>;

/// Snapshot of one registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task identity.
    pub id: TaskId,
    /// Task name.
    pub name: String,
    /// Parent task for structured children.
    pub parent: Option<TaskId>,
}

struct Entry {
    name: Arc<str>,
    parent: Option<TaskId>,
    cancel: CancellationToken,
    done: CancellationToken,
    join: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, Entry>,
    closed: bool,
}

/// Arena of running tasks bound to one supervising scope.
pub struct Registry {
    inner: RwLock<Inner>,
    bus: Bus,
    semaphore: Option<Arc<Semaphore>>,
}

impl Registry {
    /// Creates a new, open registry.
    pub(crate) fn new(bus: Bus, semaphore: Option<Arc<Semaphore>>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            bus,
            semaphore,
        })
    }

    /// Starts `task` as `id` under a token derived from `parent` and registers it.
    pub(crate) async fn spawn<T: Task>(
        self: &Arc<Self>,
        id: TaskId,
        task: T,
        parent: &CancellationToken,
        parent_id: Option<TaskId>,
        hook: Option<CompletionHook<T::Output>>,
    ) -> TaskHandle<T::Output> {
        let name: Arc<str> = Arc::from(task.name());
        let cancel = parent.child_token();
        let done = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new(
            id,
            Arc::clone(&name),
            TaskCanceller::new(cancel.clone(), done.clone()),
            rx,
        );

        let mut inner = self.inner.write().await;
        if inner.closed {
            drop(inner);
            cancel.cancel();
            tracing::debug!(task = %name, id = %id, "scope closed; task not started");
            self.bus.publish(
                Event::new(EventKind::TaskCancelled)
                    .with_task(Arc::clone(&name))
                    .with_task_id(id)
                    .with_reason("scope_closed"),
            );
            let outcome = Outcome::Cancelled;
            if let Some(hook) = hook {
                hook(&outcome).await;
            }
            let _ = tx.send(outcome);
            done.cancel();
            return handle;
        }

        let scope = cancel.child_token();
        let ctx = TaskContext::new(id, Arc::clone(&name), scope.clone(), Arc::clone(self));
        let me = Arc::clone(self);
        let semaphore = self.semaphore.clone();
        // dropped with the wrapper, so an aborted task still reports finished
        let done_guard = done.clone().drop_guard();
        let join = tokio::spawn(async move {
            let outcome = run_once(task, ctx, semaphore, &me.bus).await;
            scope.cancel();
            me.await_children(id).await;
            if let Some(hook) = hook {
                hook(&outcome).await;
            }
            let _ = tx.send(outcome);
            drop(done_guard);
            me.forget(id).await;
        });

        inner.tasks.insert(
            id,
            Entry {
                name,
                parent: parent_id,
                cancel,
                done,
                join,
            },
        );
        handle
    }

    /// Raises cancellation on one task. Returns `false` if it is not registered.
    pub(crate) async fn cancel(&self, id: TaskId) -> bool {
        match self.inner.read().await.tasks.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns the registered tasks sorted by id.
    pub(crate) async fn list(&self) -> Vec<TaskInfo> {
        let inner = self.inner.read().await;
        let mut out: Vec<TaskInfo> = inner
            .tasks
            .iter()
            .map(|(id, e)| TaskInfo {
                id: *id,
                name: e.name.to_string(),
                parent: e.parent,
            })
            .collect();
        out.sort_unstable_by_key(|t| t.id);
        out
    }

    /// Number of registered tasks.
    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.tasks.len()
    }

    /// Closes the scope, cancels every registered task and waits up to `grace`.
    ///
    /// Returns the names of tasks that were still running after `grace`; those
    /// are aborted.
    pub(crate) async fn close_and_cancel_all(&self, grace: Duration) -> Result<(), Vec<String>> {
        let entries: Vec<Entry> = {
            let mut inner = self.inner.write().await;
            inner.closed = true;
            inner.tasks.drain().map(|(_, e)| e).collect()
        };

        for e in &entries {
            e.cancel.cancel();
        }

        let mut joins: Vec<(Arc<str>, JoinHandle<()>)> =
            entries.into_iter().map(|e| (e.name, e.join)).collect();

        let all = async {
            for (_, join) in joins.iter_mut() {
                let _ = join.await;
            }
        };

        match tokio::time::timeout(grace, all).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => {
                let mut stuck = Vec::new();
                for (name, join) in &joins {
                    if !join.is_finished() {
                        stuck.push(name.to_string());
                        join.abort();
                    }
                }
                stuck.sort_unstable();
                Err(stuck)
            }
        }
    }

    /// Waits until every registered child of `id` reached its terminal outcome.
    ///
    /// A child's own wrapper awaits its children first, so this covers the whole
    /// subtree.
    async fn await_children(&self, id: TaskId) {
        let children: Vec<CancellationToken> = self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|e| e.parent == Some(id))
            .map(|e| e.done.clone())
            .collect();
        for done in children {
            done.cancelled().await;
        }
    }

    async fn forget(&self, id: TaskId) {
        self.inner.write().await.tasks.remove(&id);
    }
}
