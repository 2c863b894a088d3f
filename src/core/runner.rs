//! # Run a single supervised task to its terminal outcome.
//!
//! Executes one [`Task`] under its cancellation token and publishes lifecycle events
//! to the [`Bus`].
//!
//! ## Event flow
//!
//! ```text
//! Cancelled before start (incl. while waiting for a permit):
//!   publish TaskCancelled
//!
//! Started:
//!   publish TaskStarting → body
//!     ├─ Ok(v)                 → publish TaskCompleted   → Outcome::Completed(v)
//!     ├─ token cancelled first → publish TaskCancelled   → Outcome::Cancelled
//!     ├─ Err(Canceled)         → publish TaskCancelled   → Outcome::Cancelled
//!     ├─ Err(e)                → publish TaskFailed      → Outcome::Failed(e)
//!     └─ panic                 → publish TaskFailed      → Outcome::Failed(Panicked)
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event.
//! - Cancellation is checked before the body is first polled, so a task cancelled
//!   before its first suspension point never resolves `Completed`.
//! - When cancellation and completion race, cancellation wins (`biased` select).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Outcome, Task, TaskContext, TaskId};

/// Runs `task` to a terminal outcome, publishing lifecycle events to `bus`.
pub(crate) async fn run_once<T: Task>(
    task: T,
    ctx: TaskContext,
    semaphore: Option<Arc<Semaphore>>,
    bus: &Bus,
) -> Outcome<T::Output> {
    let id = ctx.id();
    let name: Arc<str> = Arc::from(ctx.name());
    let token = ctx.token().clone();

    let _permit = match semaphore {
        Some(sem) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return finish(bus, id, &name, Outcome::Cancelled);
                }
                res = sem.acquire_owned() => match res {
                    Ok(permit) => Some(permit),
                    Err(_closed) => return finish(bus, id, &name, Outcome::Cancelled),
                },
            }
        }
        None => None,
    };

    if token.is_cancelled() {
        return finish(bus, id, &name, Outcome::Cancelled);
    }

    bus.publish(
        Event::new(EventKind::TaskStarting)
            .with_task(Arc::clone(&name))
            .with_task_id(id),
    );

    let body = AssertUnwindSafe(async move { task.spawn(ctx).await }).catch_unwind();
    let res = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        res = body => Some(res),
    };

    let outcome = match res {
        None => Outcome::Cancelled,
        Some(Ok(Ok(value))) => Outcome::Completed(value),
        Some(Ok(Err(e))) if e.is_cancellation() => Outcome::Cancelled,
        Some(Ok(Err(e))) => Outcome::Failed(e),
        Some(Err(panic)) => Outcome::Failed(TaskError::Panicked {
            message: panic_message(panic.as_ref()),
        }),
    };
    finish(bus, id, &name, outcome)
}

/// Publishes the terminal event matching `outcome` and hands it back.
fn finish<T>(bus: &Bus, id: TaskId, name: &Arc<str>, outcome: Outcome<T>) -> Outcome<T> {
    let ev = match &outcome {
        Outcome::Completed(_) => Event::new(EventKind::TaskCompleted),
        Outcome::Failed(e) => Event::new(EventKind::TaskFailed).with_reason(e.to_string()),
        Outcome::Cancelled => Event::new(EventKind::TaskCancelled),
    };
    bus.publish(ev.with_task(Arc::clone(name)).with_task_id(id));
    outcome
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_from_str_and_string() {
        let a: Box<dyn Any + Send> = Box::new("boom");
        let b: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let c: Box<dyn Any + Send> = Box::new(7u8);

        assert_eq!(panic_message(a.as_ref()), "boom");
        assert_eq!(panic_message(b.as_ref()), "bang");
        assert_eq!(panic_message(c.as_ref()), "unknown panic");
    }
}
