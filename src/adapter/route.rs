//! # Route logic supplied to the adapter.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::adapter::RequestContext;
use crate::error::TaskError;
use crate::tasks::TaskContext;

/// # Per-endpoint business logic run as a request task.
///
/// `S` is the application state shared by all requests (a [`Store`](crate::Store),
/// clients, settings). The [`TaskContext`] carries the request's cancellation
/// token; route logic checks it between resource operations.
///
/// Any `Fn(Arc<S>, RequestContext, TaskContext) -> impl Future<Output = Result<(), TaskError>>`
/// is a route.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use reqvisor::{RequestContext, Route, TaskContext, TaskError};
///
/// async fn health(_: Arc<()>, req: RequestContext, ctx: TaskContext) -> Result<(), TaskError> {
///     ctx.checkpoint()?;
///     req.response().write_status(200).await.map_err(TaskError::fail)?;
///     Ok(())
/// }
///
/// fn assert_route<R: Route<()>>(_: R) {}
/// assert_route(health);
/// ```
pub trait Route<S>: Send + Sync + 'static {
    /// Runs the logic for one request.
    fn call(
        &self,
        state: Arc<S>,
        req: RequestContext,
        ctx: TaskContext,
    ) -> BoxFuture<'static, Result<(), TaskError>>;
}

impl<S, F, Fut> Route<S> for F
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, RequestContext, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn call(
        &self,
        state: Arc<S>,
        req: RequestContext,
        ctx: TaskContext,
    ) -> BoxFuture<'static, Result<(), TaskError>> {
        (self)(state, req, ctx).boxed()
    }
}
