//! Supervising scope tests.
//!
//! Cover cancellation before start, structured nesting, shutdown reclaiming
//! never-ending tasks, late spawns, panics, the concurrency cap and the grace period.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use reqvisor::{
    EventKind, Outcome, RuntimeError, Supervisor, SupervisorConfig, Task, TaskCanceller,
    TaskContext, TaskError, TaskFn,
};
use tokio::sync::oneshot;

fn supervisor() -> Arc<Supervisor> {
    Supervisor::builder(SupervisorConfig::default()).build()
}

fn forever(name: &'static str) -> impl Task<Output = ()> {
    TaskFn::new(name, |_ctx: TaskContext| std::future::pending::<Result<(), TaskError>>())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CANCELLATION
// ═══════════════════════════════════════════════════════════════════════════════

/// A task cancelled before its first poll resolves `Cancelled`, and its body never runs.
#[tokio::test]
async fn cancel_before_start_never_completes() {
    let sup = supervisor();
    let ran = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&ran);
    let handle = sup
        .spawn(TaskFn::new("eager", move |_ctx: TaskContext| async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, TaskError>(())
        }))
        .await;
    handle.cancel();

    assert!(handle.join().await.is_cancelled());
    assert!(!ran.load(Ordering::SeqCst));
    sup.shutdown().await.unwrap();
}

/// Cancelling a parent cancels the children it spawned through its context.
#[tokio::test]
async fn cancelling_parent_cancels_descendants() {
    let sup = supervisor();
    let (tx, rx) = oneshot::channel();

    let parent = sup
        .spawn(TaskFn::new("parent", move |ctx: TaskContext| async move {
            let child = ctx
                .spawn(TaskFn::new("child", move |ctx: TaskContext| async move {
                    let grandchild = ctx.spawn(forever("grandchild")).await;
                    let _ = tx.send(grandchild.canceller());
                    grandchild.join().await.into_result()
                }))
                .await;
            child.join().await.into_result()
        }))
        .await;

    let grandchild = rx.await.unwrap();
    let active = sup.active().await;
    assert_eq!(active.len(), 3);
    assert_eq!(active[0].id, parent.id());
    assert_eq!(active[1].parent, Some(parent.id()));
    assert_eq!(active[2].parent, Some(active[1].id));
    assert_eq!(active[2].name, "grandchild");

    parent.cancel();
    assert!(parent.join().await.is_cancelled());
    grandchild.finished().await;
    assert!(grandchild.is_cancelled());

    sup.shutdown().await.unwrap();
    assert_eq!(sup.active_count().await, 0);
}

/// Children left running when the parent returns are cancelled and reclaimed
/// before the parent's outcome is delivered.
#[tokio::test]
async fn finished_parent_leaves_no_running_children() {
    let sup = supervisor();
    let slot: Arc<Mutex<Option<TaskCanceller>>> = Arc::new(Mutex::new(None));
    let child_done_at_hook = Arc::new(AtomicBool::new(false));

    let body_slot = Arc::clone(&slot);
    let hook_slot = Arc::clone(&slot);
    let seen = Arc::clone(&child_done_at_hook);
    let parent = sup
        .spawn_with_completion(
            TaskFn::new("fan-out", move |ctx: TaskContext| async move {
                let child = ctx
                    .spawn(TaskFn::new("background", |ctx: TaskContext| async move {
                        ctx.cancelled().await;
                        Err::<(), _>(TaskError::Canceled)
                    }))
                    .await;
                *body_slot.lock().unwrap() = Some(child.canceller());
                Ok::<_, TaskError>(())
            }),
            move |_outcome: &Outcome<()>| {
                let finished = hook_slot
                    .lock()
                    .unwrap()
                    .as_ref()
                    .is_some_and(TaskCanceller::is_finished);
                seen.store(finished, Ordering::SeqCst);
                async {}.boxed()
            },
        )
        .await;

    assert!(parent.join().await.is_completed());
    assert!(child_done_at_hook.load(Ordering::SeqCst));
    let child = slot.lock().unwrap().take().unwrap();
    assert!(child.is_finished());
    assert!(child.is_cancelled());

    for _ in 0..20 {
        if sup.active_count().await == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(sup.active().await.is_empty());
    sup.shutdown().await.unwrap();
}

/// `Supervisor::cancel` targets one task by id and leaves the others running.
#[tokio::test]
async fn cancel_by_id() {
    let sup = supervisor();
    let a = sup.spawn(forever("a")).await;
    let b = sup.spawn(forever("b")).await;
    let a_id = a.id();

    assert!(sup.cancel(a_id).await);
    assert!(a.join().await.is_cancelled());
    assert!(!b.is_finished());

    sup.shutdown().await.unwrap();
    assert!(b.join().await.is_cancelled());
}

/// A caller-side timer layered on cancellation.
#[tokio::test(start_paused = true)]
async fn cancel_after_acts_as_timeout() {
    let sup = supervisor();
    let handle = sup.spawn(forever("slow")).await;
    handle.canceller().cancel_after(Duration::from_secs(5));

    assert!(handle.join().await.is_cancelled());
    sup.shutdown().await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHUTDOWN
// ═══════════════════════════════════════════════════════════════════════════════

/// Shutdown with K never-ending tasks returns only after all K are `Cancelled`.
#[tokio::test]
async fn shutdown_reclaims_never_ending_tasks() {
    let sup = supervisor();
    let mut events = sup.subscribe();

    let mut handles = Vec::new();
    for _ in 0..5 {
        handles.push(sup.spawn(forever("stuck-forever")).await);
    }
    tokio::task::yield_now().await;
    assert_eq!(sup.active_count().await, 5);

    sup.shutdown().await.unwrap();

    for h in &handles {
        assert!(h.is_finished());
    }
    for h in handles {
        assert!(h.join().await.is_cancelled());
    }

    let mut cancelled = 0;
    let mut stopped = false;
    while let Ok(ev) = events.try_recv() {
        match ev.kind {
            EventKind::TaskCancelled => cancelled += 1,
            EventKind::AllStoppedWithin => stopped = true,
            _ => {}
        }
    }
    assert_eq!(cancelled, 5);
    assert!(stopped);
}

/// Spawning into a closed scope resolves `Cancelled` and still runs the hook once.
#[tokio::test]
async fn spawn_after_shutdown_is_cancelled() {
    let sup = supervisor();
    sup.shutdown().await.unwrap();
    assert!(sup.is_shutting_down());

    let hooks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hooks);
    let handle = sup
        .spawn_with_completion(
            TaskFn::new("late", |_ctx: TaskContext| async { Ok::<_, TaskError>(1) }),
            move |outcome: &Outcome<i32>| {
                assert!(outcome.is_cancelled());
                counter.fetch_add(1, Ordering::SeqCst);
                async {}.boxed()
            },
        )
        .await;

    assert!(handle.join().await.is_cancelled());
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
}

/// A second shutdown returns `Ok` immediately.
#[tokio::test]
async fn shutdown_is_idempotent() {
    let sup = supervisor();
    sup.spawn(forever("x")).await;
    sup.shutdown().await.unwrap();
    sup.shutdown().await.unwrap();
}

/// A completion hook that never finishes is aborted after the grace period.
#[tokio::test]
async fn grace_exceeded_aborts_stuck_tasks() {
    let sup = Supervisor::builder(SupervisorConfig {
        grace: Duration::from_millis(50),
        ..SupervisorConfig::default()
    })
    .build();

    let handle = sup
        .spawn_with_completion(forever("wedged"), |_outcome: &Outcome<()>| {
            std::future::pending::<()>().boxed()
        })
        .await;

    match sup.shutdown().await {
        Err(RuntimeError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, ["wedged"]),
        other => panic!("expected grace exceeded, got {other:?}"),
    }
    assert!(handle.join().await.is_cancelled());
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// A panic in one task is a `Failed(Panicked)` outcome and does not disturb others.
#[tokio::test]
async fn panic_is_isolated_failure() {
    let sup = supervisor();
    let other = sup.spawn(forever("bystander")).await;

    let handle = sup
        .spawn(TaskFn::new("explodes", |_ctx: TaskContext| async move {
            if true {
                panic!("boom");
            }
            Ok::<(), TaskError>(())
        }))
        .await;

    match handle.join().await {
        Outcome::Failed(TaskError::Panicked { message }) => assert_eq!(message, "boom"),
        other => panic!("expected panic failure, got {other:?}"),
    }
    assert!(!other.is_finished());
    sup.shutdown().await.unwrap();
}

/// A route-level error is `Failed`; returning `Canceled` is `Cancelled`.
#[tokio::test]
async fn error_classification() {
    let sup = supervisor();
    let failed = sup
        .spawn(TaskFn::new("fails", |_ctx: TaskContext| async {
            Err::<(), _>(TaskError::fail("nope"))
        }))
        .await;
    let canceled = sup
        .spawn(TaskFn::new("gives-up", |_ctx: TaskContext| async {
            Err::<(), _>(TaskError::Canceled)
        }))
        .await;

    assert!(failed.join().await.is_failed());
    assert!(canceled.join().await.is_cancelled());
    sup.shutdown().await.unwrap();
}

/// `max_concurrent` bounds how many bodies run at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_cap_is_respected() {
    let sup = Supervisor::builder(SupervisorConfig {
        max_concurrent: 2,
        ..SupervisorConfig::default()
    })
    .build();

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        handles.push(
            sup.spawn(TaskFn::new("capped", move |_ctx: TaskContext| async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, TaskError>(())
            }))
            .await,
        );
    }
    for h in handles {
        assert!(h.join().await.is_completed());
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
    sup.shutdown().await.unwrap();
}

/// Lifecycle events for one task arrive in order on the bus.
#[tokio::test]
async fn lifecycle_events_in_order() {
    let sup = supervisor();
    let mut events = sup.subscribe();

    let handle = sup
        .spawn(TaskFn::new("hello", |ctx: TaskContext| async move {
            ctx.checkpoint()?;
            Ok::<_, TaskError>("hi")
        }))
        .await;
    let id = handle.id();
    match handle.join().await {
        Outcome::Completed(v) => assert_eq!(v, "hi"),
        other => panic!("unexpected {other:?}"),
    }

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.task_id == Some(id) {
            kinds.push(ev.kind);
        }
    }
    assert_eq!(kinds, [EventKind::TaskStarting, EventKind::TaskCompleted]);
    sup.shutdown().await.unwrap();
}
