//! # Supervisor: the supervising scope for request tasks.
//!
//! The [`Supervisor`] owns the event bus, the [`SubscriberSet`] listener, the task
//! registry and the runtime cancellation token. Every task it spawns is registered
//! and bound to its lifetime.
//!
//! ## Key responsibilities
//! - spawn tasks (optionally with a completion hook) under child tokens
//! - cancel individual tasks by id
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//! - perform graceful shutdown within [`SupervisorConfig::grace`]
//!
//! ## High-level architecture
//! ```text
//! spawn(task) ──► Registry::spawn ──► tokio::spawn(wrapper(run_once))
//!                     │                        │
//!                     └── child of runtime_token
//!
//! Event flow:
//!   runner / registry / adapter ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!
//! Shutdown path:
//!   shutdown()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► runtime_token.cancel()   → propagates to every child token
//!     └─► Registry::close_and_cancel_all(grace):
//!            ├─ all joined      → Bus.publish(AllStoppedWithin)
//!            └─ grace exceeded  → abort stuck, Bus.publish(GraceExceeded)
//!     └─► stop listener (drains pending events, flushes subscribers)
//! ```
//!
//! ## Example
//! ```rust
//! use reqvisor::{Supervisor, SupervisorConfig, TaskContext, TaskError, TaskFn};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default()).build();
//!
//!     let handle = sup
//!         .spawn(TaskFn::new("hello", |ctx: TaskContext| async move {
//!             ctx.checkpoint()?;
//!             Ok::<_, TaskError>("hi")
//!         }))
//!         .await;
//!
//!     assert!(handle.join().await.is_completed());
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::registry::{Registry, TaskInfo};
use crate::core::{SupervisorBuilder, SupervisorConfig, shutdown};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::tasks::{Outcome, Task, TaskHandle, TaskId};

#[derive(Default)]
struct ShutdownState {
    done: bool,
    listener: Option<JoinHandle<()>>,
}

/// Supervising scope: spawns, tracks and finally reclaims every task.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    registry: Arc<Registry>,
    runtime_token: CancellationToken,
    listener_token: CancellationToken,
    state: Mutex<ShutdownState>,
}

impl Supervisor {
    /// Returns a builder for a supervisor with the given config.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: SubscriberSet,
        registry: Arc<Registry>,
    ) -> Self {
        let listener_token = CancellationToken::new();
        let listener = Self::subscriber_listener(bus.subscribe(), subs, listener_token.clone());
        Self {
            cfg,
            bus,
            registry,
            runtime_token: CancellationToken::new(),
            listener_token,
            state: Mutex::new(ShutdownState {
                done: false,
                listener: Some(listener),
            }),
        }
    }

    /// Forwards bus events to the subscriber set until the listener token fires,
    /// then drains what is left and flushes the subscribers.
    fn subscriber_listener(
        mut rx: broadcast::Receiver<Event>,
        set: SubscriberSet,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                    }
                }
            }
            while let Ok(ev) = rx.try_recv() {
                set.emit(&ev);
            }
            set.shutdown().await;
        })
    }

    /// Configuration this supervisor was built with.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Spawns `task` in this scope.
    pub async fn spawn<T: Task>(&self, task: T) -> TaskHandle<T::Output> {
        self.registry
            .spawn(TaskId::next(), task, &self.runtime_token, None, None)
            .await
    }

    /// Spawns `task` in this scope with a hook that runs exactly once with its
    /// terminal outcome, before the outcome reaches the [`TaskHandle`].
    ///
    /// The hook runs even when the task is cancelled (including by shutdown, which
    /// waits for it) and when the scope is already closed.
    pub async fn spawn_with_completion<T, H>(&self, task: T, hook: H) -> TaskHandle<T::Output>
    where
        T: Task,
        H: FnOnce(&Outcome<T::Output>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.spawn_as(TaskId::next(), task, hook).await
    }

    /// Same as [`spawn_with_completion`](Self::spawn_with_completion) with an id
    /// allocated by the caller, so the hook can refer to it.
    pub(crate) async fn spawn_as<T, H>(&self, id: TaskId, task: T, hook: H) -> TaskHandle<T::Output>
    where
        T: Task,
        H: FnOnce(&Outcome<T::Output>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.registry
            .spawn(id, task, &self.runtime_token, None, Some(Box::new(hook)))
            .await
    }

    /// Raises cancellation on a registered task (and its children).
    ///
    /// Returns `false` if no such task is registered.
    pub async fn cancel(&self, id: TaskId) -> bool {
        self.registry.cancel(id).await
    }

    /// Lists the currently registered tasks, sorted by id.
    pub async fn active(&self) -> Vec<TaskInfo> {
        self.registry.list().await
    }

    /// Number of currently registered tasks.
    pub async fn active_count(&self) -> usize {
        self.registry.len().await
    }

    /// Creates a receiver observing subsequent runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.bus
    }

    /// True once shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.runtime_token.is_cancelled()
    }

    /// Cancels every registered task and waits until all reach a terminal outcome.
    ///
    /// Idempotent: concurrent or repeated calls wait for the first shutdown and
    /// then return `Ok(())`.
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] if some tasks did not stop within
    /// [`SupervisorConfig::grace`]; those tasks were aborted.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        if state.done {
            return Ok(());
        }
        state.done = true;

        tracing::info!(active = self.registry.len().await, "supervisor shutting down");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.runtime_token.cancel();

        let grace = self.cfg.grace;
        let res = match self.registry.close_and_cancel_all(grace).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(stuck) => {
                tracing::error!(?grace, ?stuck, "shutdown grace exceeded; aborting tasks");
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        };

        self.listener_token.cancel();
        if let Some(listener) = state.listener.take() {
            let _ = listener.await;
        }
        res
    }

    /// Waits for an OS termination signal, then shuts down.
    ///
    /// If signal registration fails, shuts down immediately.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        if let Err(e) = shutdown::wait_for_shutdown_signal().await {
            tracing::error!(error = %e, "signal registration failed");
        }
        self.shutdown().await
    }
}
